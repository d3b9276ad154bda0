/*!
Defining the [Table] struct that represents a catalog table.
*/

use std::sync::Arc;

use crate::catalog::commit::{CommitTableRequest, TableRequirement, TableUpdate};
use crate::catalog::identifier::TableIdentifier;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::io::FileIO;
use crate::model::schema::Schema;
use crate::model::table_metadata::TableMetadata;
use crate::table::scan::TableScan;
use crate::table::update_schema::{SchemaSink, UpdateSchema};
use crate::transaction::Transaction;

pub mod manifest;
pub mod scan;
pub mod update_schema;

/// A table loaded from a catalog.
///
/// The metadata is immutable for the lifetime of a scan; committing
/// replaces it atomically with the state returned by the catalog.
#[derive(Debug, Clone)]
pub struct Table {
    identifier: TableIdentifier,
    catalog: Arc<dyn Catalog>,
    io: Arc<dyn FileIO>,
    metadata: TableMetadata,
    metadata_location: String,
}

impl Table {
    /// Create a table handle from the state a catalog returned.
    pub fn new(
        identifier: TableIdentifier,
        catalog: Arc<dyn Catalog>,
        io: Arc<dyn FileIO>,
        metadata: TableMetadata,
        metadata_location: impl Into<String>,
    ) -> Self {
        Table {
            identifier,
            catalog,
            io,
            metadata,
            metadata_location: metadata_location.into(),
        }
    }

    /// The identifier of the table in its catalog.
    pub fn identifier(&self) -> &TableIdentifier {
        &self.identifier
    }

    /// The catalog the table belongs to.
    pub fn catalog(&self) -> Arc<dyn Catalog> {
        self.catalog.clone()
    }

    /// The file io the table reads and writes through.
    pub fn io(&self) -> Arc<dyn FileIO> {
        self.io.clone()
    }

    /// The table metadata.
    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    /// Location of the metadata document the table was loaded from.
    pub fn metadata_location(&self) -> &str {
        &self.metadata_location
    }

    /// The current schema of the table.
    pub fn current_schema(&self) -> Result<&Schema> {
        self.metadata.current_schema()
    }

    /// Start configuring a scan of this table.
    pub fn scan(&self) -> TableScan<'_> {
        TableScan::new(self)
    }

    /// Start staging schema changes against the current schema. The
    /// returned builder commits through the catalog on its own.
    pub fn update_schema(&mut self) -> Result<UpdateSchema<'_>> {
        let schema = self.metadata.current_schema()?.clone();
        Ok(UpdateSchema::new(schema, SchemaSink::Table(self)))
    }

    /// Start a transaction staging several changes into one commit.
    pub fn new_transaction(&mut self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Send staged updates to the catalog and adopt the returned state.
    /// A commit without updates never reaches the catalog.
    pub(crate) async fn do_commit(
        &mut self,
        updates: Vec<TableUpdate>,
        requirements: Vec<TableRequirement>,
    ) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let request = CommitTableRequest {
            identifier: self.identifier.clone(),
            requirements,
            updates,
        };
        let response = self.catalog.commit_table(request).await?;
        self.metadata = response.metadata;
        self.metadata_location = response.metadata_location;
        Ok(())
    }
}
