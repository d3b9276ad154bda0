/*!
 * Defines the [Transaction] type that stages several table changes into a
 * single atomic catalog commit.
*/

use std::collections::HashMap;

use crate::catalog::commit::{
    append_unique_requirement, append_unique_update, TableRequirement, TableUpdate,
};
use crate::error::Result;
use crate::table::update_schema::{SchemaSink, UpdateSchema};
use crate::table::Table;

/// Stages updates and requirements against a table. Each update kind
/// and each requirement kind may be staged at most once. Committing a
/// transaction with nothing staged returns the table unchanged without
/// talking to the catalog.
pub struct Transaction<'table> {
    table: &'table mut Table,
    updates: Vec<TableUpdate>,
    requirements: Vec<TableRequirement>,
}

impl<'table> Transaction<'table> {
    /// Create a transaction for the given table.
    pub fn new(table: &'table mut Table) -> Self {
        Transaction {
            table,
            updates: vec![],
            requirements: vec![],
        }
    }

    /// Stage setting table properties.
    pub fn set_properties(mut self, updates: HashMap<String, String>) -> Result<Self> {
        append_unique_update(&mut self.updates, TableUpdate::SetProperties { updates })?;
        Ok(self)
    }

    /// Stage removing table properties.
    pub fn remove_properties(mut self, removals: Vec<String>) -> Result<Self> {
        append_unique_update(&mut self.updates, TableUpdate::RemoveProperties { removals })?;
        Ok(self)
    }

    /// Stage moving the table's base location.
    pub fn set_location(mut self, location: impl Into<String>) -> Result<Self> {
        append_unique_update(
            &mut self.updates,
            TableUpdate::SetLocation {
                location: location.into(),
            },
        )?;
        Ok(self)
    }

    /// Stage upgrading the format version.
    pub fn upgrade_format_version(mut self, format_version: u8) -> Result<Self> {
        append_unique_update(
            &mut self.updates,
            TableUpdate::UpgradeFormatVersion { format_version },
        )?;
        Ok(self)
    }

    /// Stage an explicit requirement.
    pub fn assert_requirement(mut self, requirement: TableRequirement) -> Result<Self> {
        append_unique_requirement(&mut self.requirements, requirement)?;
        Ok(self)
    }

    /// Stage schema changes. The returned builder appends its updates
    /// and requirements to this transaction on
    /// [commit](UpdateSchema::commit).
    pub fn update_schema(&mut self) -> Result<UpdateSchema<'_>> {
        let schema = self.table.metadata().current_schema()?.clone();
        Ok(UpdateSchema::new(
            schema,
            SchemaSink::Staged {
                updates: &mut self.updates,
                requirements: &mut self.requirements,
            },
        ))
    }

    /// Commit everything staged in one catalog round trip and adopt the
    /// returned table state. With nothing staged this is a no-op that
    /// never reaches the catalog.
    pub async fn commit(self) -> Result<()> {
        let Transaction {
            table,
            updates,
            mut requirements,
        } = self;
        if updates.is_empty() {
            return Ok(());
        }
        // every real commit is guarded against a table swap
        let uuid_assert = TableRequirement::AssertTableUuid {
            uuid: table.metadata().table_uuid,
        };
        if append_unique_requirement(&mut requirements, uuid_assert).is_ok() {
            requirements.rotate_right(1);
        }
        table.do_commit(updates, requirements).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::commit::{CommitTableRequest, CommitTableResponse};
    use crate::catalog::identifier::TableIdentifier;
    use crate::catalog::Catalog;
    use crate::error::Error;
    use crate::io::ObjectStoreFileIO;
    use crate::model::schema::{PrimitiveType, Type};
    use crate::model::table_metadata::TableMetadata;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    const METADATA: &str = r#"
        {
            "format-version": 2,
            "table-uuid": "fb072c92-a02b-11e9-ae9c-1bb7bc9eca94",
            "location": "s3://bucket/table",
            "last-sequence-number": 0,
            "last-updated-ms": 1515100955770,
            "last-column-id": 2,
            "schemas": [
                {
                    "schema-id": 0,
                    "type": "struct",
                    "fields": [
                        { "id": 1, "name": "id", "required": false, "type": "int" },
                        { "id": 2, "name": "data", "required": false, "type": "string" }
                    ]
                }
            ],
            "current-schema-id": 0,
            "partition-specs": [ { "spec-id": 0, "fields": [] } ],
            "default-spec-id": 0,
            "last-partition-id": 999,
            "sort-orders": [],
            "default-sort-order-id": 0
        }
    "#;

    #[derive(Debug, Default)]
    struct RecordingCatalog {
        seen: Mutex<Vec<CommitTableRequest>>,
    }

    #[async_trait]
    impl Catalog for RecordingCatalog {
        async fn commit_table(
            &self,
            request: CommitTableRequest,
        ) -> Result<CommitTableResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(CommitTableResponse {
                metadata_location: "s3://bucket/table/metadata/v3.metadata.json".to_string(),
                metadata: serde_json::from_str(METADATA).unwrap(),
            })
        }
    }

    fn table(catalog: Arc<RecordingCatalog>) -> Table {
        Table::new(
            TableIdentifier::parse("db.table").unwrap(),
            catalog,
            Arc::new(ObjectStoreFileIO::new(Default::default()).unwrap()),
            serde_json::from_str::<TableMetadata>(METADATA).unwrap(),
            "s3://bucket/table/metadata/v2.metadata.json",
        )
    }

    #[tokio::test]
    async fn test_empty_transaction_skips_the_catalog() {
        let catalog = Arc::new(RecordingCatalog::default());
        let mut table = table(catalog.clone());
        let before = table.metadata().clone();
        table.new_transaction().commit().await.unwrap();
        assert!(catalog.seen.lock().unwrap().is_empty());
        assert_eq!(table.metadata(), &before);
        assert_eq!(
            table.metadata_location(),
            "s3://bucket/table/metadata/v2.metadata.json"
        );
    }

    #[tokio::test]
    async fn test_commit_adopts_the_response() {
        let catalog = Arc::new(RecordingCatalog::default());
        let mut table = table(catalog.clone());
        table
            .new_transaction()
            .set_properties(HashMap::from([(
                "owner".to_string(),
                "root".to_string(),
            )]))
            .unwrap()
            .commit()
            .await
            .unwrap();

        let seen = catalog.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].updates.len(), 1);
        // the uuid guard is always sent first
        assert!(matches!(
            seen[0].requirements[0],
            TableRequirement::AssertTableUuid { .. }
        ));
        drop(seen);
        assert_eq!(
            table.metadata_location(),
            "s3://bucket/table/metadata/v3.metadata.json"
        );
    }

    #[tokio::test]
    async fn test_duplicate_update_kind_is_rejected() {
        let catalog = Arc::new(RecordingCatalog::default());
        let mut table = table(catalog);
        let transaction = table
            .new_transaction()
            .set_location("s3://bucket/a")
            .unwrap();
        assert!(matches!(
            transaction.set_location("s3://bucket/b"),
            Err(Error::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_schema_update_stages_into_transaction() {
        let catalog = Arc::new(RecordingCatalog::default());
        let mut table = table(catalog.clone());
        let mut transaction = table.new_transaction();
        transaction
            .update_schema()
            .unwrap()
            .rename_column("data", "payload")
            .unwrap()
            .add_column("extra", Type::Primitive(PrimitiveType::Long), None, false)
            .unwrap()
            .commit()
            .await
            .unwrap();
        transaction.commit().await.unwrap();

        let seen = catalog.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let request = &seen[0];
        match &request.updates[0] {
            TableUpdate::AddSchema {
                schema,
                last_column_id,
            } => {
                assert_eq!(*last_column_id, Some(3));
                assert_eq!(schema.find_field("payload", true).unwrap().id, 2);
                assert_eq!(schema.find_field("extra", true).unwrap().id, 3);
            }
            other => panic!("expected add-schema, got {other:?}"),
        }
        assert!(matches!(
            request.updates[1],
            TableUpdate::SetCurrentSchema { schema_id: -1 }
        ));
        assert!(request.requirements.iter().any(|requirement| matches!(
            requirement,
            TableRequirement::AssertCurrentSchemaId {
                current_schema_id: 0
            }
        )));
    }

    #[tokio::test]
    async fn test_conflict_surfaces_unchanged() {
        #[derive(Debug)]
        struct ConflictCatalog;

        #[async_trait]
        impl Catalog for ConflictCatalog {
            async fn commit_table(
                &self,
                _request: CommitTableRequest,
            ) -> Result<CommitTableResponse> {
                Err(Error::Conflict(
                    "requirement failed: current schema changed".to_string(),
                ))
            }
        }

        let mut table = Table::new(
            TableIdentifier::parse("db.table").unwrap(),
            Arc::new(ConflictCatalog),
            Arc::new(ObjectStoreFileIO::new(Default::default()).unwrap()),
            serde_json::from_str::<TableMetadata>(METADATA).unwrap(),
            "s3://bucket/table/metadata/v2.metadata.json",
        );
        let err = table
            .new_transaction()
            .set_location("s3://bucket/moved")
            .unwrap()
            .commit()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        // the cached state was not touched
        assert_eq!(
            table.metadata_location(),
            "s3://bucket/table/metadata/v2.metadata.json"
        );
    }
}
