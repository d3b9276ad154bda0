/*!
Reading manifest lists and manifest files.

The scan planner only depends on the [ManifestSource] contract; the Avro
decoding lives behind it in [AvroManifestSource].
*/

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::io::FileIO;
use crate::model::manifest::{ManifestEntry, Status};
use crate::model::manifest_list::ManifestFile;

/// Access to the manifests of a snapshot.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Read the manifest list at the URI.
    async fn manifest_list(&self, uri: &str) -> Result<Vec<ManifestFile>>;

    /// Read the entries of a manifest. With `discard_deleted`, rows
    /// with deleted status are dropped. Entries without a recorded
    /// sequence number inherit the manifest's.
    async fn manifest(
        &self,
        manifest: &ManifestFile,
        discard_deleted: bool,
    ) -> Result<Vec<ManifestEntry>>;
}

/// [ManifestSource] decoding Avro manifests through a [FileIO].
#[derive(Debug)]
pub struct AvroManifestSource {
    io: Arc<dyn FileIO>,
}

impl AvroManifestSource {
    /// Create a source reading through the given file io.
    pub fn new(io: Arc<dyn FileIO>) -> Self {
        AvroManifestSource { io }
    }
}

fn decode_error(uri: &str, err: apache_avro::Error) -> Error {
    Error::InvariantViolation(format!("malformed manifest data at {uri}: {err}"))
}

#[async_trait]
impl ManifestSource for AvroManifestSource {
    async fn manifest_list(&self, uri: &str) -> Result<Vec<ManifestFile>> {
        let bytes = self.io.new_input(uri)?.read().await?;
        let reader =
            apache_avro::Reader::new(&bytes[..]).map_err(|err| decode_error(uri, err))?;
        reader
            .map(|value| {
                value
                    .and_then(|value| apache_avro::from_value::<ManifestFile>(&value))
                    .map_err(|err| decode_error(uri, err))
            })
            .collect()
    }

    async fn manifest(
        &self,
        manifest: &ManifestFile,
        discard_deleted: bool,
    ) -> Result<Vec<ManifestEntry>> {
        let uri = &manifest.manifest_path;
        let bytes = self.io.new_input(uri)?.read().await?;
        let reader =
            apache_avro::Reader::new(&bytes[..]).map_err(|err| decode_error(uri, err))?;
        let mut entries = Vec::new();
        for value in reader {
            let mut entry = value
                .and_then(|value| apache_avro::from_value::<ManifestEntry>(&value))
                .map_err(|err| decode_error(uri, err))?;
            if discard_deleted && entry.status == Status::Deleted {
                continue;
            }
            if entry.snapshot_id.is_none() {
                entry.snapshot_id = Some(manifest.added_snapshot_id);
            }
            if entry.sequence_number.is_none() {
                entry.sequence_number = Some(manifest.sequence_number);
            }
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Avro schema for manifest entries used by the test writers. Bounds
/// maps are arrays of key/value records, partition tuples a nested
/// record of optional primitive fields.
#[cfg(test)]
pub(crate) fn manifest_entry_test_schema(partition_fields: &[(&str, &str)]) -> String {
    let partition_fields = partition_fields
        .iter()
        .map(|(name, avro_type)| {
            format!(
                r#"{{"name": "{name}", "type": ["null", "{avro_type}"], "default": null}}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"
    {{
        "type": "record",
        "name": "manifest_entry",
        "fields": [
            {{"name": "status", "type": "int"}},
            {{"name": "snapshot_id", "type": ["null", "long"], "default": null}},
            {{"name": "sequence_number", "type": ["null", "long"], "default": null}},
            {{"name": "file_sequence_number", "type": ["null", "long"], "default": null}},
            {{"name": "data_file", "type": {{
                "type": "record",
                "name": "r2",
                "fields": [
                    {{"name": "content", "type": "int"}},
                    {{"name": "file_path", "type": "string"}},
                    {{"name": "file_format", "type": "string"}},
                    {{"name": "partition", "type": {{
                        "type": "record",
                        "name": "r102",
                        "fields": [{partition_fields}]
                    }}}},
                    {{"name": "record_count", "type": "long"}},
                    {{"name": "file_size_in_bytes", "type": "long"}},
                    {{"name": "column_sizes", "type": ["null", {{"type": "array", "items": {{
                        "type": "record", "name": "k117_v118",
                        "fields": [
                            {{"name": "key", "type": "int"}},
                            {{"name": "value", "type": "long"}}
                        ]
                    }}}}], "default": null}},
                    {{"name": "value_counts", "type": ["null", {{"type": "array", "items": {{
                        "type": "record", "name": "k119_v120",
                        "fields": [
                            {{"name": "key", "type": "int"}},
                            {{"name": "value", "type": "long"}}
                        ]
                    }}}}], "default": null}},
                    {{"name": "null_value_counts", "type": ["null", {{"type": "array", "items": {{
                        "type": "record", "name": "k121_v122",
                        "fields": [
                            {{"name": "key", "type": "int"}},
                            {{"name": "value", "type": "long"}}
                        ]
                    }}}}], "default": null}},
                    {{"name": "nan_value_counts", "type": ["null", {{"type": "array", "items": {{
                        "type": "record", "name": "k138_v139",
                        "fields": [
                            {{"name": "key", "type": "int"}},
                            {{"name": "value", "type": "long"}}
                        ]
                    }}}}], "default": null}},
                    {{"name": "distinct_counts", "type": ["null", {{"type": "array", "items": {{
                        "type": "record", "name": "k123_v124",
                        "fields": [
                            {{"name": "key", "type": "int"}},
                            {{"name": "value", "type": "long"}}
                        ]
                    }}}}], "default": null}},
                    {{"name": "lower_bounds", "type": ["null", {{"type": "array", "items": {{
                        "type": "record", "name": "k126_v127",
                        "fields": [
                            {{"name": "key", "type": "int"}},
                            {{"name": "value", "type": "bytes"}}
                        ]
                    }}}}], "default": null}},
                    {{"name": "upper_bounds", "type": ["null", {{"type": "array", "items": {{
                        "type": "record", "name": "k129_v130",
                        "fields": [
                            {{"name": "key", "type": "int"}},
                            {{"name": "value", "type": "bytes"}}
                        ]
                    }}}}], "default": null}},
                    {{"name": "key_metadata", "type": ["null", "bytes"], "default": null}},
                    {{"name": "split_offsets", "type": ["null", {{"type": "array", "items": "long"}}], "default": null}},
                    {{"name": "equality_ids", "type": ["null", {{"type": "array", "items": "int"}}], "default": null}},
                    {{"name": "sort_order_id", "type": ["null", "int"], "default": null}}
                ]
            }}}}
        ]
    }}
    "#
    )
}
