/*!
 [Manifest lists](https://iceberg.apache.org/spec/#manifest-lists).

A manifest list names every manifest of a snapshot and carries the summary
metadata used to avoid opening manifests when planning a scan: per partition
field lower/upper bounds and null/NaN flags, plus the sequence numbers the
delete discipline is built on.
*/

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::snapshot::INITIAL_SEQUENCE_NUMBER;

#[derive(Debug, Serialize_repr, Deserialize_repr, PartialEq, Eq, Clone)]
#[repr(u8)]
/// The type of files tracked by a manifest.
pub enum ManifestContent {
    /// Data files.
    Data = 0,
    /// Delete files.
    Deletes = 1,
}

impl Default for ManifestContent {
    fn default() -> Self {
        ManifestContent::Data
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
/// Value summary for one partition field across all files of a manifest.
pub struct FieldSummary {
    /// Whether the manifest contains at least one partition with a null
    /// value for the field.
    pub contains_null: bool,
    /// Whether the manifest contains at least one partition with a NaN
    /// value for the field.
    #[serde(default)]
    pub contains_nan: Option<bool>,
    /// Lower bound for the non-null, non-NaN values in the partition
    /// field, or null if all values are null or NaN.
    #[serde(default)]
    pub lower_bound: Option<ByteBuf>,
    /// Upper bound for the non-null, non-NaN values in the partition
    /// field, or null if all values are null or NaN.
    #[serde(default)]
    pub upper_bound: Option<ByteBuf>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
/// One manifest named by a manifest list.
pub struct ManifestFile {
    /// Location of the manifest file
    pub manifest_path: String,
    /// Length of the manifest file in bytes
    pub manifest_length: i64,
    /// ID of the partition spec used to write the manifest; must be
    /// listed in the table metadata partition-specs.
    pub partition_spec_id: i32,
    /// The type of files tracked by the manifest; data for all v1 manifests.
    #[serde(default)]
    pub content: ManifestContent,
    /// The sequence number when the manifest was added to the table; 0
    /// when reading v1 manifest lists.
    #[serde(default)]
    pub sequence_number: i64,
    /// The minimum data sequence number of all files in the manifest; 0
    /// when reading v1 manifest lists.
    #[serde(default)]
    pub min_sequence_number: i64,
    /// ID of the snapshot where the manifest file was added
    pub added_snapshot_id: i64,
    /// Number of entries with status ADDED.
    #[serde(default)]
    pub added_files_count: Option<i32>,
    /// Number of entries with status EXISTING.
    #[serde(default)]
    pub existing_files_count: Option<i32>,
    /// Number of entries with status DELETED.
    #[serde(default)]
    pub deleted_files_count: Option<i32>,
    /// Number of rows in files with status ADDED.
    #[serde(default)]
    pub added_rows_count: Option<i64>,
    /// Number of rows in files with status EXISTING.
    #[serde(default)]
    pub existing_rows_count: Option<i64>,
    /// Number of rows in files with status DELETED.
    #[serde(default)]
    pub deleted_rows_count: Option<i64>,
    /// A summary for each field of the manifest's partition spec, in
    /// spec field order.
    #[serde(default)]
    pub partitions: Option<Vec<FieldSummary>>,
    /// Implementation-specific key metadata for encryption
    #[serde(default)]
    pub key_metadata: Option<ByteBuf>,
}

impl ManifestFile {
    /// The minimum data sequence number, falling back to the initial
    /// sequence number for v1 manifest lists.
    pub fn min_data_sequence_number(&self) -> i64 {
        if self.min_sequence_number == 0 {
            INITIAL_SEQUENCE_NUMBER
        } else {
            self.min_sequence_number
        }
    }
}
