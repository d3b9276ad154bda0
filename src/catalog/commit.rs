/*!
Commit payloads exchanged with a catalog.

A commit is a table identifier, a list of [TableRequirement] preconditions
and a list of [TableUpdate] mutations. The catalog applies the updates only
when every requirement holds against the table state it knows; a failed
requirement surfaces as a conflict and the caller re-stages against fresh
metadata. Within one request each update kind and each requirement kind may
appear at most once.
*/

use std::collections::HashMap;
use std::mem::discriminant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::identifier::TableIdentifier;
use crate::error::{Error, Result};
use crate::model::partition::PartitionSpec;
use crate::model::schema::Schema;
use crate::model::snapshot::{Reference, Snapshot};
use crate::model::sort::SortOrder;
use crate::model::table_metadata::TableMetadata;

/// Value of `SetCurrentSchema.schema_id` meaning "the schema added in
/// this same commit".
pub const LAST_ADDED_SCHEMA_ID: i32 = -1;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "action", rename_all = "kebab-case")]
/// One staged mutation of table metadata.
pub enum TableUpdate {
    /// Upgrade the format version of the table.
    #[serde(rename_all = "kebab-case")]
    UpgradeFormatVersion {
        /// The target format version.
        format_version: u8,
    },
    /// Append a schema to the metadata.
    #[serde(rename_all = "kebab-case")]
    AddSchema {
        /// The new schema.
        schema: Schema,
        /// The highest field id of the table after the addition.
        #[serde(skip_serializing_if = "Option::is_none")]
        last_column_id: Option<i32>,
    },
    /// Make a schema the current one.
    #[serde(rename_all = "kebab-case")]
    SetCurrentSchema {
        /// Schema id to make current, or [LAST_ADDED_SCHEMA_ID].
        schema_id: i32,
    },
    /// Append a partition spec.
    #[serde(rename = "add-spec", rename_all = "kebab-case")]
    AddPartitionSpec {
        /// The new spec.
        spec: PartitionSpec,
    },
    /// Make a partition spec the default for writers.
    #[serde(rename_all = "kebab-case")]
    SetDefaultSpec {
        /// Spec id to make default, -1 for the spec added in this commit.
        spec_id: i32,
    },
    /// Append a sort order.
    #[serde(rename_all = "kebab-case")]
    AddSortOrder {
        /// The new sort order.
        sort_order: SortOrder,
    },
    /// Make a sort order the default.
    #[serde(rename_all = "kebab-case")]
    SetDefaultSortOrder {
        /// Order id to make default, -1 for the order added in this commit.
        sort_order_id: i64,
    },
    /// Append a snapshot.
    #[serde(rename_all = "kebab-case")]
    AddSnapshot {
        /// The new snapshot.
        snapshot: Snapshot,
    },
    /// Create or move a named ref to a snapshot.
    #[serde(rename_all = "kebab-case")]
    SetSnapshotRef {
        /// Name of the branch or tag.
        ref_name: String,
        /// The snapshot and retention of the ref.
        #[serde(flatten)]
        reference: Reference,
    },
    /// Remove snapshots from the metadata.
    #[serde(rename_all = "kebab-case")]
    RemoveSnapshots {
        /// Ids of the snapshots to remove.
        snapshot_ids: Vec<i64>,
    },
    /// Remove a named ref.
    #[serde(rename_all = "kebab-case")]
    RemoveSnapshotRef {
        /// Name of the branch or tag.
        ref_name: String,
    },
    /// Set the table's base location.
    #[serde(rename_all = "kebab-case")]
    SetLocation {
        /// The new location.
        location: String,
    },
    /// Set table properties. Properties not named stay untouched.
    #[serde(rename_all = "kebab-case")]
    SetProperties {
        /// Key-value pairs to set.
        updates: HashMap<String, String>,
    },
    /// Remove table properties.
    #[serde(rename_all = "kebab-case")]
    RemoveProperties {
        /// Keys to remove.
        removals: Vec<String>,
    },
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
/// A precondition the catalog asserts before applying updates.
pub enum TableRequirement {
    /// The table must not exist yet.
    AssertCreate,
    /// The table UUID must match.
    #[serde(rename_all = "kebab-case")]
    AssertTableUuid {
        /// Expected UUID.
        uuid: Uuid,
    },
    /// A ref must point at the given snapshot; a null id asserts the
    /// ref does not exist.
    #[serde(rename_all = "kebab-case")]
    AssertRefSnapshotId {
        /// Name of the branch or tag.
        r#ref: String,
        /// Expected snapshot id.
        snapshot_id: Option<i64>,
    },
    /// The highest assigned field id must match.
    #[serde(rename_all = "kebab-case")]
    AssertLastAssignedFieldId {
        /// Expected highest field id.
        last_assigned_field_id: i32,
    },
    /// The current schema id must match.
    #[serde(rename_all = "kebab-case")]
    AssertCurrentSchemaId {
        /// Expected current schema id.
        current_schema_id: i32,
    },
    /// The highest assigned partition field id must match.
    #[serde(rename_all = "kebab-case")]
    AssertLastAssignedPartitionId {
        /// Expected highest partition field id.
        last_assigned_partition_id: i32,
    },
    /// The default spec id must match.
    #[serde(rename_all = "kebab-case")]
    AssertDefaultSpecId {
        /// Expected default spec id.
        default_spec_id: i32,
    },
    /// The default sort order id must match.
    #[serde(rename_all = "kebab-case")]
    AssertDefaultSortOrderId {
        /// Expected default sort order id.
        default_sort_order_id: i64,
    },
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
/// The request body of a table commit.
pub struct CommitTableRequest {
    /// The table being committed to, without any catalog prefix.
    pub identifier: TableIdentifier,
    /// Preconditions that must hold.
    pub requirements: Vec<TableRequirement>,
    /// Mutations to apply.
    pub updates: Vec<TableUpdate>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
/// The response of a successful table commit.
pub struct CommitTableResponse {
    /// Location of the new metadata document.
    pub metadata_location: String,
    /// The new table metadata.
    pub metadata: TableMetadata,
}

/// Push an update, rejecting a second update of the same kind.
pub fn append_unique_update(updates: &mut Vec<TableUpdate>, update: TableUpdate) -> Result<()> {
    if updates
        .iter()
        .any(|staged| discriminant(staged) == discriminant(&update))
    {
        return Err(Error::Invalid(format!(
            "update of the same kind already staged: {update:?}"
        )));
    }
    updates.push(update);
    Ok(())
}

/// Push a requirement, rejecting a second requirement of the same kind.
pub fn append_unique_requirement(
    requirements: &mut Vec<TableRequirement>,
    requirement: TableRequirement,
) -> Result<()> {
    if requirements
        .iter()
        .any(|staged| discriminant(staged) == discriminant(&requirement))
    {
        return Err(Error::Invalid(format!(
            "requirement of the same kind already staged: {requirement:?}"
        )));
    }
    requirements.push(requirement);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_wire_names() {
        let update = TableUpdate::SetCurrentSchema {
            schema_id: LAST_ADDED_SCHEMA_ID,
        };
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"action":"set-current-schema","schema-id":-1}"#
        );

        let update = TableUpdate::AddPartitionSpec {
            spec: PartitionSpec {
                spec_id: 1,
                fields: vec![],
            },
        };
        assert!(serde_json::to_string(&update)
            .unwrap()
            .starts_with(r#"{"action":"add-spec""#));
    }

    #[test]
    fn test_requirement_wire_names() {
        let requirement = TableRequirement::AssertCurrentSchemaId {
            current_schema_id: 3,
        };
        assert_eq!(
            serde_json::to_string(&requirement).unwrap(),
            r#"{"type":"assert-current-schema-id","current-schema-id":3}"#
        );
    }

    #[test]
    fn test_request_round_trip() {
        let request = CommitTableRequest {
            identifier: TableIdentifier::parse("db.table").unwrap(),
            requirements: vec![
                TableRequirement::AssertTableUuid {
                    uuid: Uuid::new_v4(),
                },
                TableRequirement::AssertCurrentSchemaId {
                    current_schema_id: 0,
                },
            ],
            updates: vec![
                TableUpdate::SetProperties {
                    updates: HashMap::from([("owner".to_string(), "root".to_string())]),
                },
                TableUpdate::SetLocation {
                    location: "s3://bucket/table".to_string(),
                },
            ],
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: CommitTableRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request, back);
    }

    #[test]
    fn test_duplicate_kinds_rejected() {
        let mut updates = vec![];
        append_unique_update(
            &mut updates,
            TableUpdate::SetLocation {
                location: "a".to_string(),
            },
        )
        .unwrap();
        assert!(append_unique_update(
            &mut updates,
            TableUpdate::SetLocation {
                location: "b".to_string(),
            },
        )
        .is_err());

        let mut requirements = vec![];
        append_unique_requirement(&mut requirements, TableRequirement::AssertCreate).unwrap();
        assert!(
            append_unique_requirement(&mut requirements, TableRequirement::AssertCreate)
                .is_err()
        );
    }
}
