/*!
Details of [snapshots](https://iceberg.apache.org/spec/#snapshots) for a table.

A [Snapshot] is an immutable pointer to the manifest list naming every live
data and delete file at a point in time. A [Reference] is a named pointer to a
snapshot stored in the refs map of the table metadata; it can be a
[Tag](Retention::Tag) or a [Branch](Retention::Branch).
*/
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Sequence number given to files written before the first snapshot of
/// a table, and used in place of a missing manifest sequence number.
pub const INITIAL_SEQUENCE_NUMBER: i64 = 0;

/// The name of the main branch.
pub const MAIN_BRANCH: &str = "main";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "lowercase")]
/// The kind of change a snapshot contains, used to skip snapshots
/// during some operations.
pub enum Operation {
    /// Only data files were added and no files were removed.
    Append,
    /// Data and delete files were added and removed without changing
    /// table data, for example compaction or file format changes.
    Replace,
    /// Data and delete files were added and removed in a logical
    /// overwrite operation.
    Overwrite,
    /// Data files were removed and their contents logically deleted
    /// and/or delete files were added to delete rows.
    Delete,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
/// Summarises the changes in the snapshot.
pub struct Summary {
    /// The type of operation in the snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    /// Other summary data.
    #[serde(flatten)]
    pub other: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// A point-in-time state of the table.
pub struct Snapshot {
    /// A unique long ID
    pub snapshot_id: i64,
    /// The snapshot ID of the snapshot's parent. Omitted for any
    /// snapshot with no parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_snapshot_id: Option<i64>,
    /// A monotonically increasing long that tracks the order of changes
    /// to the table. Data and delete files carry the sequence number of
    /// the snapshot that created them.
    #[serde(default)]
    pub sequence_number: i64,
    /// A timestamp when the snapshot was created, used for garbage
    /// collection and table inspection
    pub timestamp_ms: i64,
    /// The location of the manifest list for this snapshot that tracks
    /// manifest files with additional metadata.
    pub manifest_list: String,
    /// A string map that summarizes the snapshot changes, including operation.
    pub summary: Summary,
    /// ID of the table's current schema when the snapshot was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// A named reference to a snapshot, either a branch or a tag.
pub struct Reference {
    /// The tagged snapshot or the latest snapshot of a branch.
    pub snapshot_id: i64,
    #[serde(flatten)]
    /// The retention policy for the reference.
    pub retention: Retention,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "lowercase", tag = "type")]
/// Retention policy fields, which differ between branches and tags.
pub enum Retention {
    #[serde(rename_all = "kebab-case")]
    /// A branch reference
    Branch {
        /// A positive number for the minimum number of snapshots to
        /// keep in the branch while expiring snapshots.
        #[serde(skip_serializing_if = "Option::is_none")]
        min_snapshots_to_keep: Option<i32>,
        /// A positive number for the max age of snapshots to keep when
        /// expiring, including the latest snapshot.
        #[serde(skip_serializing_if = "Option::is_none")]
        max_snapshot_age_ms: Option<i64>,
        /// A positive number for the max age of the reference to keep
        /// while expiring snapshots.
        #[serde(skip_serializing_if = "Option::is_none")]
        max_ref_age_ms: Option<i64>,
    },
    #[serde(rename_all = "kebab-case")]
    /// A tag reference.
    Tag {
        /// A positive number for the max age of the reference to keep
        /// while expiring snapshots.
        #[serde(skip_serializing_if = "Option::is_none")]
        max_ref_age_ms: Option<i64>,
    },
}
