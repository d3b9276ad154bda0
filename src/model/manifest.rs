/*!
[Manifest](https://iceberg.apache.org/spec/#manifests) entries.

A manifest is an immutable Avro file listing data files or delete files along
with each file's partition tuple, column metrics and tracking information.
One [ManifestEntry] describes one file.
*/
use serde::{Deserialize, Deserializer, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use serde_with::serde_as;
use serde_with::Bytes;
use serde_with::DefaultOnNull;
use serde_with::{DeserializeAs, SerializeAs};

use crate::model::snapshot::INITIAL_SEQUENCE_NUMBER;
use crate::model::values::Struct;

#[derive(Debug, Serialize_repr, Deserialize_repr, PartialEq, Eq, Clone)]
#[repr(u8)]
/// Tracks additions and deletions of files in a manifest.
pub enum Status {
    /// Carried over from an earlier snapshot.
    Existing = 0,
    /// Added in the snapshot that wrote the manifest.
    Added = 1,
    /// Deleted in the snapshot that wrote the manifest.
    Deleted = 2,
}

#[derive(Debug, Serialize_repr, Deserialize_repr, PartialEq, Eq, Clone)]
#[repr(u8)]
/// Type of content stored by a file.
pub enum Content {
    /// Data rows.
    Data = 0,
    /// Deletes by file path and row position.
    PositionDeletes = 1,
    /// Deletes by column equality.
    EqualityDeletes = 2,
    /// A content kind this crate does not know.
    #[serde(other)]
    Unknown = 255,
}

impl Default for Content {
    fn default() -> Self {
        Content::Data
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "UPPERCASE")]
/// File format of a data or delete file.
pub enum FileFormat {
    /// Avro file
    Avro,
    /// Orc file
    Orc,
    /// Parquet file
    Parquet,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
/// helper to read the Avro `array<k_v>` maps keyed by column id
struct NumPair {
    key: i32,
    value: i64,
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
struct BytesPair {
    key: i32,
    #[serde_as(as = "Bytes")]
    value: Vec<u8>,
}

impl SerializeAs<(i32, i64)> for NumPair {
    fn serialize_as<S>(source: &(i32, i64), serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        NumPair {
            key: source.0,
            value: source.1,
        }
        .serialize(serializer)
    }
}

impl<'de> DeserializeAs<'de, (i32, i64)> for NumPair {
    fn deserialize_as<D>(deserializer: D) -> Result<(i32, i64), D::Error>
    where
        D: Deserializer<'de>,
    {
        let pair = NumPair::deserialize(deserializer)?;
        Ok((pair.key, pair.value))
    }
}

impl SerializeAs<(i32, Vec<u8>)> for BytesPair {
    fn serialize_as<S>(source: &(i32, Vec<u8>), serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        BytesPair {
            key: source.0,
            value: source.1.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> DeserializeAs<'de, (i32, Vec<u8>)> for BytesPair {
    fn deserialize_as<D>(deserializer: D) -> Result<(i32, Vec<u8>), D::Error>
    where
        D: Deserializer<'de>,
    {
        let pair = BytesPair::deserialize(deserializer)?;
        Ok((pair.key, pair.value))
    }
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
/// A data or delete file tracked by a manifest, with the column metrics
/// the scan planner prunes on.
pub struct DataFile {
    /// Type of content in the file.
    #[serde(default)]
    pub content: Content,
    /// Full URI for the file with an FS scheme.
    pub file_path: String,
    /// File format.
    pub file_format: FileFormat,
    /// Partition tuple, typed by the partition spec the file was
    /// written under.
    pub partition: Struct,
    /// Number of records in this file
    pub record_count: i64,
    /// Total file size in bytes
    pub file_size_in_bytes: i64,
    /// Map from column id to total size on disk
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<Vec<NumPair>>")]
    pub column_sizes: Vec<(i32, i64)>,
    /// Map from column id to number of values, nulls and NaNs included
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<Vec<NumPair>>")]
    pub value_counts: Vec<(i32, i64)>,
    /// Map from column id to number of null values
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<Vec<NumPair>>")]
    pub null_value_counts: Vec<(i32, i64)>,
    /// Map from column id to number of NaN values
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<Vec<NumPair>>")]
    pub nan_value_counts: Vec<(i32, i64)>,
    /// Map from column id to number of distinct values
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<Vec<NumPair>>")]
    pub distinct_counts: Vec<(i32, i64)>,
    /// Map from column id to lower bound of the column
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<Vec<BytesPair>>")]
    pub lower_bounds: Vec<(i32, Vec<u8>)>,
    /// Map from column id to upper bound of the column
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull<Vec<BytesPair>>")]
    pub upper_bounds: Vec<(i32, Vec<u8>)>,
    /// Implementation specific key metadata for encryption
    #[serde(default)]
    pub key_metadata: Option<serde_bytes::ByteBuf>,
    /// Split offsets for the data file.
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull")]
    pub split_offsets: Vec<i64>,
    /// Field ids used to determine row equality in equality delete files.
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull")]
    pub equality_ids: Vec<i32>,
    /// ID of the sort order the file is sorted by.
    #[serde(default)]
    pub sort_order_id: Option<i32>,
}

impl DataFile {
    /// Lower bound bytes recorded for the column.
    pub fn lower_bound(&self, field_id: i32) -> Option<&[u8]> {
        self.lower_bounds
            .iter()
            .find(|(id, _)| *id == field_id)
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// Upper bound bytes recorded for the column.
    pub fn upper_bound(&self, field_id: i32) -> Option<&[u8]> {
        self.upper_bounds
            .iter()
            .find(|(id, _)| *id == field_id)
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// Number of nulls recorded for the column.
    pub fn null_count(&self, field_id: i32) -> Option<i64> {
        lookup(&self.null_value_counts, field_id)
    }

    /// Number of NaNs recorded for the column.
    pub fn nan_count(&self, field_id: i32) -> Option<i64> {
        lookup(&self.nan_value_counts, field_id)
    }

    /// Number of values recorded for the column.
    pub fn value_count(&self, field_id: i32) -> Option<i64> {
        lookup(&self.value_counts, field_id)
    }
}

fn lookup(pairs: &[(i32, i64)], field_id: i32) -> Option<i64> {
    pairs
        .iter()
        .find(|(id, _)| *id == field_id)
        .map(|(_, count)| *count)
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
/// One row of a manifest, describing one file and its status.
pub struct ManifestEntry {
    /// Tracks additions and deletions.
    pub status: Status,
    /// Snapshot id where the file was added, or deleted if status is
    /// Deleted. Inherited when null.
    #[serde(default)]
    pub snapshot_id: Option<i64>,
    /// Sequence number of the snapshot that added the file. Inherited
    /// from the manifest when null.
    #[serde(default, alias = "data_sequence_number")]
    pub sequence_number: Option<i64>,
    /// Sequence number of the snapshot that first wrote the file.
    #[serde(default)]
    pub file_sequence_number: Option<i64>,
    /// The file this entry tracks.
    pub data_file: DataFile,
}

impl ManifestEntry {
    /// The sequence number ordering data and deletes, falling back to
    /// the initial sequence number when none was recorded or inherited.
    pub fn data_sequence_number(&self) -> i64 {
        self.sequence_number.unwrap_or(INITIAL_SEQUENCE_NUMBER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::values::Value;

    fn entry_json() -> &'static str {
        r#"
        {
            "status": 1,
            "snapshot_id": 3051729675574597004,
            "sequence_number": 5,
            "file_sequence_number": 5,
            "data_file": {
                "content": 0,
                "file_path": "s3://b/wh/data.db/table/data/a/1.parquet",
                "file_format": "PARQUET",
                "partition": { "ts_day": 12 },
                "record_count": 100,
                "file_size_in_bytes": 4096,
                "null_value_counts": [ { "key": 1, "value": 0 } ],
                "lower_bounds": [ { "key": 1, "value": [0, 0, 0, 0] } ],
                "upper_bounds": [ { "key": 1, "value": [2, 0, 0, 0] } ]
            }
        }
        "#
    }

    #[test]
    fn test_manifest_entry_deserialize() {
        let entry: ManifestEntry = serde_json::from_str(entry_json()).unwrap();
        assert_eq!(entry.status, Status::Added);
        assert_eq!(entry.data_sequence_number(), 5);
        assert_eq!(entry.data_file.content, Content::Data);
        assert_eq!(
            entry.data_file.partition.get_by_name("ts_day"),
            Some(&Some(Value::Long(12)))
        );
        assert_eq!(entry.data_file.null_count(1), Some(0));
        assert_eq!(entry.data_file.nan_count(1), None);
        assert_eq!(entry.data_file.lower_bound(1), Some(&[0u8, 0, 0, 0][..]));
    }

    #[test]
    fn test_sequence_number_defaults_to_initial() {
        let mut entry: ManifestEntry = serde_json::from_str(entry_json()).unwrap();
        entry.sequence_number = None;
        assert_eq!(entry.data_sequence_number(), INITIAL_SEQUENCE_NUMBER);
    }

    #[test]
    fn test_unknown_content_kind() {
        let content: Content = serde_json::from_str("4").unwrap();
        assert_eq!(content, Content::Unknown);
    }

    #[test]
    fn test_data_file_round_trip() {
        let entry: ManifestEntry = serde_json::from_str(entry_json()).unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        let back: ManifestEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }
}
