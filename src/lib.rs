#![deny(missing_docs)]
/*!
# Floe

Floe is a client library for the [Apache Iceberg](https://iceberg.apache.org/)
table format: a versioned, snapshot-isolated columnar table layout over an
object store, mutated through an external catalog service.

The [model] package holds the data structures of the format. On top of it the
crate provides:

* Scan planning: [`Table::scan`](table::Table::scan) prunes manifests and data
  files with partition summaries, partition tuples and column metrics, and
  pairs every surviving data file with the positional delete files that apply
  to it.
* Schema evolution: [`Table::update_schema`](table::Table::update_schema)
  stages add/rename/retype/move operations over the nested schema with stable
  field ids and commits them through the catalog under optimistic
  concurrency.
* Transactions: [`Table::new_transaction`](table::Table::new_transaction)
  bundles several changes into one commit with preconditions.

Reading data files and the catalog protocol itself are out of scope; the
planner emits [FileScanTask](table::scan::FileScanTask)s for a columnar
reader, and catalogs implement the [Catalog](catalog::Catalog) trait.
*/
pub mod catalog;
pub mod error;
pub mod expr;
pub mod io;
pub mod model;
pub mod table;
pub mod transaction;

pub use object_store;
