/*!
Defines the [table metadata](https://iceberg.apache.org/spec/#table-metadata).

[TableMetadata] is the single durably-mutated object of a table; every change
goes through the catalog as a new metadata document. Both format version 1 and
version 2 documents are read; version 1 is upgraded to the in-memory v2 form.
*/
use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::partition::{PartitionField, PartitionSpec};
use crate::model::schema::Schema;
use crate::model::snapshot::{Reference, Snapshot, MAIN_BRANCH};
use crate::model::sort::SortOrder;

#[derive(Debug, PartialEq, Clone)]
/// Metadata of a table, in the version 2 shape.
pub struct TableMetadata {
    /// The format version the document was read from, 1 or 2.
    pub format_version: u8,
    /// A UUID that identifies the table.
    pub table_uuid: Uuid,
    /// The table's base location.
    pub location: String,
    /// The table's highest assigned sequence number.
    pub last_sequence_number: i64,
    /// Timestamp in milliseconds from the unix epoch when the table was last updated.
    pub last_updated_ms: i64,
    /// The highest assigned column ID for the table.
    pub last_column_id: i32,
    /// A list of schemas, stored as objects with schema-id.
    pub schemas: Vec<Schema>,
    /// ID of the table's current schema.
    pub current_schema_id: i32,
    /// A list of partition specs.
    pub partition_specs: Vec<PartitionSpec>,
    /// ID of the spec that writers should use by default.
    pub default_spec_id: i32,
    /// The highest assigned partition field ID across all partition specs.
    pub last_partition_id: i32,
    /// A string to string map of table properties.
    pub properties: Option<HashMap<String, String>>,
    /// ID of the current table snapshot; must match the main branch in refs.
    pub current_snapshot_id: Option<i64>,
    /// A list of valid snapshots.
    pub snapshots: Option<Vec<Snapshot>>,
    /// A list of timestamp and snapshot ID pairs encoding changes to
    /// the current snapshot.
    pub snapshot_log: Option<Vec<SnapshotLog>>,
    /// A list of timestamp and metadata file location pairs encoding
    /// the previous metadata files of the table.
    pub metadata_log: Option<Vec<MetadataLog>>,
    /// A list of sort orders.
    pub sort_orders: Vec<SortOrder>,
    /// Default sort order id of the table.
    pub default_sort_order_id: i64,
    /// Named snapshot references. There is always a main branch
    /// reference pointing to the current snapshot, even when the map is
    /// absent.
    pub refs: Option<HashMap<String, Reference>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
struct TableMetadataV2 {
    table_uuid: Uuid,
    location: String,
    last_sequence_number: i64,
    last_updated_ms: i64,
    last_column_id: i32,
    schemas: Vec<Schema>,
    current_schema_id: i32,
    partition_specs: Vec<PartitionSpec>,
    default_spec_id: i32,
    last_partition_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_snapshot_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshots: Option<Vec<Snapshot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_log: Option<Vec<SnapshotLog>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata_log: Option<Vec<MetadataLog>>,
    sort_orders: Vec<SortOrder>,
    default_sort_order_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    refs: Option<HashMap<String, Reference>>,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
/// The subset of a version 1 document needed to upgrade it on read.
struct TableMetadataV1 {
    table_uuid: Uuid,
    location: String,
    last_updated_ms: i64,
    last_column_id: i32,
    schema: Schema,
    schemas: Option<Vec<Schema>>,
    current_schema_id: Option<i32>,
    #[serde(default)]
    partition_spec: Vec<PartitionField>,
    partition_specs: Option<Vec<PartitionSpec>>,
    default_spec_id: Option<i32>,
    last_partition_id: Option<i32>,
    properties: Option<HashMap<String, String>>,
    current_snapshot_id: Option<i64>,
    snapshots: Option<Vec<Snapshot>>,
    snapshot_log: Option<Vec<SnapshotLog>>,
    metadata_log: Option<Vec<MetadataLog>>,
    sort_orders: Option<Vec<SortOrder>>,
    default_sort_order_id: Option<i64>,
}

impl Serialize for TableMetadata {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        #[serde(rename_all = "kebab-case")]
        struct Tagged {
            format_version: u8,
            #[serde(flatten)]
            metadata: TableMetadataV2,
        }
        Tagged {
            format_version: 2,
            metadata: TableMetadataV2 {
                table_uuid: self.table_uuid,
                location: self.location.clone(),
                last_sequence_number: self.last_sequence_number,
                last_updated_ms: self.last_updated_ms,
                last_column_id: self.last_column_id,
                schemas: self.schemas.clone(),
                current_schema_id: self.current_schema_id,
                partition_specs: self.partition_specs.clone(),
                default_spec_id: self.default_spec_id,
                last_partition_id: self.last_partition_id,
                properties: self.properties.clone(),
                current_snapshot_id: self.current_snapshot_id,
                snapshots: self.snapshots.clone(),
                snapshot_log: self.snapshot_log.clone(),
                metadata_log: self.metadata_log.clone(),
                sort_orders: self.sort_orders.clone(),
                default_sort_order_id: self.default_sort_order_id,
                refs: self.refs.clone(),
            },
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TableMetadata {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as _;
        let value = serde_json::Value::deserialize(deserializer)?;
        let version = value
            .get("format-version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| D::Error::custom("expected integer field \"format-version\""))?;
        match version {
            1 => TableMetadataV1::deserialize(value)
                .map(TableMetadata::from)
                .map_err(D::Error::custom),
            2 => TableMetadataV2::deserialize(value)
                .map(TableMetadata::from)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!(
                "unsupported format version: {other}"
            ))),
        }
    }
}

impl From<TableMetadataV2> for TableMetadata {
    fn from(value: TableMetadataV2) -> Self {
        TableMetadata {
            format_version: 2,
            table_uuid: value.table_uuid,
            location: value.location,
            last_sequence_number: value.last_sequence_number,
            last_updated_ms: value.last_updated_ms,
            last_column_id: value.last_column_id,
            schemas: value.schemas,
            current_schema_id: value.current_schema_id,
            partition_specs: value.partition_specs,
            default_spec_id: value.default_spec_id,
            last_partition_id: value.last_partition_id,
            properties: value.properties,
            current_snapshot_id: value.current_snapshot_id,
            snapshots: value.snapshots,
            snapshot_log: value.snapshot_log,
            metadata_log: value.metadata_log,
            sort_orders: value.sort_orders,
            default_sort_order_id: value.default_sort_order_id,
            refs: value.refs,
        }
    }
}

impl From<TableMetadataV1> for TableMetadata {
    fn from(value: TableMetadataV1) -> Self {
        let (current_schema_id, schemas) = match (value.current_schema_id, value.schemas) {
            (Some(current), Some(schemas)) => (current, schemas),
            _ => (value.schema.schema_id, vec![value.schema]),
        };
        let (default_spec_id, partition_specs) =
            match (value.default_spec_id, value.partition_specs) {
                (Some(default), Some(specs)) => (default, specs),
                _ => (
                    0,
                    vec![PartitionSpec {
                        spec_id: 0,
                        fields: value.partition_spec,
                    }],
                ),
            };
        let (default_sort_order_id, sort_orders) =
            match (value.default_sort_order_id, value.sort_orders) {
                (Some(default), Some(orders)) => (default, orders),
                _ => (0, vec![SortOrder::unsorted()]),
            };
        let last_partition_id = value.last_partition_id.unwrap_or_else(|| {
            partition_specs
                .iter()
                .flat_map(|spec| spec.fields.iter().map(|field| field.field_id))
                .max()
                .unwrap_or(0)
        });
        TableMetadata {
            format_version: 1,
            table_uuid: value.table_uuid,
            location: value.location,
            last_sequence_number: 0,
            last_updated_ms: value.last_updated_ms,
            last_column_id: value.last_column_id,
            schemas,
            current_schema_id,
            partition_specs,
            default_spec_id,
            last_partition_id,
            properties: value.properties,
            current_snapshot_id: value.current_snapshot_id.filter(|id| *id != -1),
            snapshots: value.snapshots,
            snapshot_log: value.snapshot_log,
            metadata_log: value.metadata_log,
            sort_orders,
            default_sort_order_id,
            refs: None,
        }
    }
}

impl TableMetadata {
    /// The schema currently in effect.
    pub fn current_schema(&self) -> Result<&Schema> {
        self.schema_by_id(self.current_schema_id).ok_or_else(|| {
            Error::NotFound("schema".to_string(), self.current_schema_id.to_string())
        })
    }

    /// The schema with the given id.
    pub fn schema_by_id(&self, schema_id: i32) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|schema| schema.schema_id == schema_id)
    }

    /// The partition spec with the given id.
    pub fn spec_by_id(&self, spec_id: i32) -> Option<&PartitionSpec> {
        self.partition_specs
            .iter()
            .find(|spec| spec.spec_id == spec_id)
    }

    /// The default partition spec for new writes.
    pub fn default_spec(&self) -> Result<&PartitionSpec> {
        self.spec_by_id(self.default_spec_id).ok_or_else(|| {
            Error::NotFound(
                "partition spec".to_string(),
                self.default_spec_id.to_string(),
            )
        })
    }

    /// The snapshot with the given id.
    pub fn snapshot_by_id(&self, snapshot_id: i64) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .flatten()
            .find(|snapshot| snapshot.snapshot_id == snapshot_id)
    }

    /// Resolve a branch or tag name to its snapshot. The main branch
    /// falls back to the current snapshot when no ref is recorded.
    pub fn snapshot_by_ref(&self, ref_name: &str) -> Option<&Snapshot> {
        match self.refs.as_ref().and_then(|refs| refs.get(ref_name)) {
            Some(reference) => self.snapshot_by_id(reference.snapshot_id),
            None if ref_name == MAIN_BRANCH => self.current_snapshot(),
            None => None,
        }
    }

    /// The current snapshot, if the table has one.
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.current_snapshot_id
            .and_then(|snapshot_id| self.snapshot_by_id(snapshot_id))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// Encodes changes to the previous metadata files for the table
pub struct MetadataLog {
    /// The file for the log.
    pub metadata_file: String,
    /// Time new metadata was created
    pub timestamp_ms: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// A log of when each snapshot was made.
pub struct SnapshotLog {
    /// Id of the snapshot.
    pub snapshot_id: i64,
    /// Last updated timestamp
    pub timestamp_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_table_metadata_v2() {
        let data = r#"
            {
                "format-version" : 2,
                "table-uuid": "fb072c92-a02b-11e9-ae9c-1bb7bc9eca94",
                "location": "s3://b/wh/data.db/table",
                "last-sequence-number" : 1,
                "last-updated-ms": 1515100955770,
                "last-column-id": 1,
                "schemas": [
                    {
                        "schema-id" : 1,
                        "type" : "struct",
                        "fields" :[
                            {
                                "id": 1,
                                "name": "id",
                                "required": true,
                                "type": "long"
                            }
                        ]
                    }
                ],
                "current-schema-id" : 1,
                "partition-specs": [
                    {
                        "spec-id": 1,
                        "fields": [
                            {
                                "source-id": 1,
                                "field-id": 1000,
                                "name": "id_bucket",
                                "transform": "bucket[4]"
                            }
                        ]
                    }
                ],
                "default-spec-id": 1,
                "last-partition-id": 1000,
                "properties": {
                    "commit.retry.num-retries": "1"
                },
                "metadata-log": [
                    {
                        "metadata-file": "s3://bucket/.../v1.json",
                        "timestamp-ms": 1515100
                    }
                ],
                "sort-orders": [],
                "default-sort-order-id": 0
            }
        "#;
        let metadata = serde_json::from_str::<TableMetadata>(data).unwrap();
        assert_eq!(metadata.format_version, 2);
        assert_eq!(metadata.current_schema().unwrap().schema_id, 1);

        // round trip through the wire form
        let round: TableMetadata =
            serde_json::from_str(&serde_json::to_string(&metadata).unwrap()).unwrap();
        assert_eq!(metadata.table_uuid, round.table_uuid);
        assert_eq!(metadata.schemas, round.schemas);
        assert_eq!(metadata.partition_specs, round.partition_specs);
    }

    #[test]
    fn test_invalid_table_uuid() {
        let data = r#"
            {
                "format-version" : 2,
                "table-uuid": "xxxx"
            }
        "#;
        assert!(serde_json::from_str::<TableMetadata>(data).is_err());
    }

    #[test]
    fn test_read_compatible_v1() {
        let data = r#"
        {
          "format-version" : 1,
          "table-uuid" : "bf530b84-8e0a-4949-b2c4-b50f02a1334f",
          "location" : "s3://testbucket/iceberg_data/iceberg_ctl/iceberg_db/iceberg_tbl",
          "last-updated-ms" : 1672980637554,
          "last-column-id" : 2,
          "schema" : {
            "type" : "struct",
            "schema-id" : 0,
            "fields" : [
                { "id" : 1, "name" : "id", "required" : false, "type" : "int" },
                { "id" : 2, "name" : "data", "required" : false, "type" : "string" }
            ]
          },
          "partition-spec" : [ ],
          "default-sort-order-id" : 0,
          "sort-orders" : [ { "order-id" : 0, "fields" : [ ] } ],
          "properties" : { "owner" : "root" },
          "current-snapshot-id" : -1,
          "snapshots" : [ ]
        }
        "#;
        let metadata = serde_json::from_str::<TableMetadata>(data).unwrap();
        assert_eq!(metadata.format_version, 1);
        assert_eq!(metadata.last_sequence_number, 0);
        assert_eq!(metadata.current_snapshot_id, None);
        assert_eq!(metadata.current_schema().unwrap().schema_id, 0);
        assert_eq!(metadata.default_spec().unwrap().spec_id, 0);
    }

    #[test]
    fn test_snapshot_by_ref() {
        let data = r#"
            {
                "format-version" : 2,
                "table-uuid": "fb072c92-a02b-11e9-ae9c-1bb7bc9eca94",
                "location": "s3://b/wh/data.db/table",
                "last-sequence-number" : 2,
                "last-updated-ms": 1515100955770,
                "last-column-id": 1,
                "schemas": [
                    {
                        "schema-id" : 0,
                        "type" : "struct",
                        "fields" :[
                            { "id": 1, "name": "id", "required": true, "type": "long" }
                        ]
                    }
                ],
                "current-schema-id" : 0,
                "partition-specs": [ { "spec-id": 0, "fields": [] } ],
                "default-spec-id": 0,
                "last-partition-id": 999,
                "sort-orders": [],
                "default-sort-order-id": 0,
                "current-snapshot-id": 42,
                "snapshots": [
                    {
                        "snapshot-id": 42,
                        "sequence-number": 2,
                        "timestamp-ms": 1515100955770,
                        "summary": { "operation": "append" },
                        "manifest-list": "s3://b/wh/.../s42.avro"
                    },
                    {
                        "snapshot-id": 17,
                        "sequence-number": 1,
                        "timestamp-ms": 1515100955000,
                        "summary": { "operation": "append" },
                        "manifest-list": "s3://b/wh/.../s17.avro"
                    }
                ],
                "refs": {
                    "main": { "snapshot-id": 42, "type": "branch" },
                    "stage": { "snapshot-id": 17, "type": "tag" }
                }
            }
        "#;
        let metadata = serde_json::from_str::<TableMetadata>(data).unwrap();
        assert_eq!(metadata.snapshot_by_ref("stage").unwrap().snapshot_id, 17);
        assert_eq!(metadata.snapshot_by_ref("main").unwrap().snapshot_id, 42);
        assert!(metadata.snapshot_by_ref("missing").is_none());
    }
}
