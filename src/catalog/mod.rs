/*!
Defines the trait to communicate with a catalog.
*/

pub mod commit;
pub mod identifier;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::catalog::commit::{CommitTableRequest, CommitTableResponse};
use crate::error::Result;

/// A catalog applies table commits under optimistic concurrency.
///
/// Implementations check every requirement of the request against the
/// table state they hold and apply the updates atomically. A failed
/// requirement is reported as [Conflict](crate::error::Error::Conflict)
/// and must reach the caller unchanged; the caller refreshes the table
/// and stages its changes again.
#[async_trait]
pub trait Catalog: Send + Sync + Debug {
    /// Commit updates to a table, guarded by the request's requirements.
    async fn commit_table(&self, request: CommitTableRequest) -> Result<CommitTableResponse>;
}
