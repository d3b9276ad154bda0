/*!
Scan planning: turning a predicate and a snapshot into the exact set of data
files to read, each paired with the positional delete files that can affect it.

Planning prunes three times before it ever opens a data file: manifests are
dropped with partition summaries, entries with the partition tuple, and files
with their column metrics. Manifests that survive are decoded and filtered on
a bounded worker pool; the output order is deterministic regardless of worker
scheduling.
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{stream, StreamExt};
use itertools::Itertools;
use lazy_static::lazy_static;

use crate::error::{Error, Result};
use crate::expr::evaluators::{
    InclusiveMetricsEvaluator, ManifestEvaluator, PartitionEvaluator,
};
use crate::expr::projection::inclusive_projection;
use crate::expr::{parser, Expr};
use crate::model::manifest::{Content, DataFile, ManifestEntry};
use crate::model::manifest_list::ManifestContent;
use crate::model::schema::{PrimitiveType, Schema, StructField, StructType, Type};
use crate::model::snapshot::{Snapshot, INITIAL_SEQUENCE_NUMBER};
use crate::model::values::Value;
use crate::table::manifest::{AvroManifestSource, ManifestSource};
use crate::table::Table;

/// Reserved field id of the `file_path` column in positional delete files.
pub const POSITIONAL_DELETE_FILE_PATH_ID: i32 = 2147483546;
/// Reserved field id of the `pos` column in positional delete files.
pub const POSITIONAL_DELETE_POS_ID: i32 = 2147483545;

lazy_static! {
    /// Schema of positional delete files, used to evaluate their
    /// `file_path` column bounds at plan time.
    static ref POSITIONAL_DELETE_SCHEMA: Schema = Schema {
        schema_id: 0,
        identifier_field_ids: None,
        struct_fields: StructType {
            fields: vec![
                StructField {
                    id: POSITIONAL_DELETE_FILE_PATH_ID,
                    name: "file_path".to_string(),
                    required: false,
                    field_type: Type::Primitive(PrimitiveType::String),
                    doc: None,
                },
                StructField {
                    id: POSITIONAL_DELETE_POS_ID,
                    name: "pos".to_string(),
                    required: false,
                    field_type: Type::Primitive(PrimitiveType::Long),
                    doc: None,
                },
            ],
        },
    };
}

#[derive(Debug, Clone)]
/// Knobs of a single plan.
pub struct ScanOptions {
    /// Keep files with zero records instead of pruning them.
    pub include_empty_files: bool,
    /// Number of manifests decoded and filtered concurrently.
    pub concurrency: usize,
    /// Time budget for the whole plan; breaching it aborts with a
    /// timeout and no tasks.
    pub deadline: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            include_empty_files: false,
            concurrency: 8,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// One unit of read work: a data file and the positional delete files
/// that apply to it.
pub struct FileScanTask {
    /// The data file to read.
    pub data_file: DataFile,
    /// Positional delete files whose rows must be dropped from the
    /// data file.
    pub delete_files: Vec<DataFile>,
    /// Byte offset to start reading at.
    pub start: u64,
    /// Number of bytes to read.
    pub length: u64,
}

impl FileScanTask {
    fn new(data_file: DataFile, delete_files: Vec<DataFile>) -> Self {
        let length = data_file.file_size_in_bytes as u64;
        FileScanTask {
            data_file,
            delete_files,
            start: 0,
            length,
        }
    }
}

/// A configurable scan over a table snapshot.
pub struct TableScan<'a> {
    table: &'a Table,
    manifest_source: Option<Arc<dyn ManifestSource>>,
    row_filter: Expr,
    selected_fields: Vec<String>,
    case_sensitive: bool,
    snapshot_id: Option<i64>,
    options: ScanOptions,
    limit: Option<usize>,
}

impl<'a> TableScan<'a> {
    pub(crate) fn new(table: &'a Table) -> Self {
        TableScan {
            table,
            manifest_source: None,
            row_filter: Expr::AlwaysTrue,
            selected_fields: vec!["*".to_string()],
            case_sensitive: true,
            snapshot_id: None,
            options: ScanOptions::default(),
            limit: None,
        }
    }

    /// And-combine a predicate with the scan's filter.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.row_filter = match self.row_filter {
            Expr::AlwaysTrue => expr,
            staged => staged.and(expr),
        };
        self
    }

    /// Parse and and-combine a predicate in its string form.
    pub fn filter_dsl(self, expr: &str) -> Result<Self> {
        let parsed = parser::parse(expr)?;
        Ok(self.filter(parsed))
    }

    /// Restrict the projection to the given dotted paths. A second
    /// selection intersects with the first.
    pub fn select(mut self, field_names: &[&str]) -> Self {
        if self.selected_fields.iter().any(|name| name == "*") {
            self.selected_fields = field_names.iter().map(ToString::to_string).collect();
        } else {
            self.selected_fields
                .retain(|name| field_names.contains(&name.as_str()));
        }
        self
    }

    /// Scan the snapshot with the given id.
    pub fn use_snapshot(mut self, snapshot_id: i64) -> Result<Self> {
        if self.table.metadata().snapshot_by_id(snapshot_id).is_none() {
            return Err(Error::NotFound(
                "snapshot".to_string(),
                snapshot_id.to_string(),
            ));
        }
        self.snapshot_id = Some(snapshot_id);
        Ok(self)
    }

    /// Scan the snapshot a branch or tag points at.
    pub fn use_ref(self, ref_name: &str) -> Result<Self> {
        if let Some(snapshot_id) = self.snapshot_id {
            return Err(Error::Invalid(format!(
                "cannot override ref, snapshot id {snapshot_id} already set"
            )));
        }
        let snapshot_id = self
            .table
            .metadata()
            .snapshot_by_ref(ref_name)
            .map(|snapshot| snapshot.snapshot_id)
            .ok_or_else(|| Error::NotFound("ref".to_string(), ref_name.to_string()))?;
        self.use_snapshot(snapshot_id)
    }

    /// Choose whether column names resolve case-sensitively.
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Replace the scan options.
    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Cap the number of rows a consumer of the tasks should produce.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Read manifests through the given source instead of the default
    /// Avro decoding over the table's file io.
    pub fn with_manifest_source(mut self, source: Arc<dyn ManifestSource>) -> Self {
        self.manifest_source = Some(source);
        self
    }

    /// The row-count cap for downstream readers, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// The snapshot this scan reads, if the table has one.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self.snapshot_id {
            Some(snapshot_id) => self.table.metadata().snapshot_by_id(snapshot_id),
            None => self.table.metadata().current_snapshot(),
        }
    }

    /// The schema the scan projects to: the snapshot's schema reduced
    /// to the selected fields by field-id intersection.
    pub fn projection(&self) -> Result<Schema> {
        let schema = self.snapshot_schema()?;
        if self.selected_fields.iter().any(|name| name == "*") {
            return Ok(schema.clone());
        }
        let paths: Vec<&str> = self.selected_fields.iter().map(String::as_str).collect();
        schema.select(&paths, self.case_sensitive)
    }

    fn snapshot_schema(&self) -> Result<&Schema> {
        let metadata = self.table.metadata();
        if let Some(schema) = self
            .snapshot()
            .and_then(|snapshot| snapshot.schema_id)
            .and_then(|schema_id| metadata.schema_by_id(schema_id))
        {
            return Ok(schema);
        }
        metadata.current_schema()
    }

    /// Plan the files to read. All-or-nothing: any failure aborts the
    /// whole plan and no tasks are emitted.
    pub async fn plan_files(&self) -> Result<Vec<FileScanTask>> {
        let Some(snapshot) = self.snapshot() else {
            return Ok(vec![]);
        };
        let deadline = self.options.deadline.map(|budget| Instant::now() + budget);
        let metadata = self.table.metadata();
        let schema = self.snapshot_schema()?;
        let bound_filter = self.row_filter.bind(schema, self.case_sensitive)?;

        let source = self
            .manifest_source
            .clone()
            .unwrap_or_else(|| Arc::new(AvroManifestSource::new(self.table.io())));

        check_deadline(deadline, "reading the manifest list")?;
        let manifest_list = source.manifest_list(&snapshot.manifest_list).await?;

        // per-spec evaluators, built once per spec id and shared
        // read-only by every worker
        let mut filters: HashMap<i32, Arc<SpecFilters>> = HashMap::new();
        for manifest in &manifest_list {
            let spec_id = manifest.partition_spec_id;
            if !filters.contains_key(&spec_id) {
                let spec = metadata.spec_by_id(spec_id).ok_or_else(|| {
                    Error::InvariantViolation(format!(
                        "manifest {} references unknown partition spec {spec_id}",
                        manifest.manifest_path
                    ))
                })?;
                let partition_schema = Schema {
                    schema_id: spec.spec_id,
                    identifier_field_ids: None,
                    struct_fields: spec.partition_type(schema)?,
                };
                let partition_filter = inclusive_projection(spec, &bound_filter)?;
                filters.insert(
                    spec_id,
                    Arc::new(SpecFilters {
                        manifest_evaluator: ManifestEvaluator::new(
                            &partition_schema,
                            &partition_filter,
                            true,
                        )?,
                        partition_evaluator: PartitionEvaluator::new(
                            &partition_schema,
                            &partition_filter,
                            true,
                        )?,
                    }),
                );
            }
        }

        // prune manifests on partition summaries
        let mut manifests = Vec::with_capacity(manifest_list.len());
        for manifest in &manifest_list {
            if filters[&manifest.partition_spec_id]
                .manifest_evaluator
                .eval(manifest)?
            {
                manifests.push(manifest);
            }
        }

        // no delete manifest older than any surviving data may be read
        let min_data_sequence_number = manifests
            .iter()
            .filter(|manifest| manifest.content == ManifestContent::Data)
            .map(|manifest| manifest.min_data_sequence_number())
            .min()
            .unwrap_or(INITIAL_SEQUENCE_NUMBER);
        manifests.retain(|manifest| {
            manifest.content == ManifestContent::Data
                || manifest.sequence_number >= min_data_sequence_number
        });

        let metrics_evaluator = Arc::new(InclusiveMetricsEvaluator::from_bound(
            bound_filter,
            self.options.include_empty_files,
        ));

        // decode and filter the surviving manifests concurrently
        let concurrency = self.options.concurrency.max(1);
        let mut entry_stream = stream::iter(manifests.into_iter().map(|manifest| {
            let source = source.clone();
            let filters = filters[&manifest.partition_spec_id].clone();
            let metrics_evaluator = metrics_evaluator.clone();
            async move {
                check_deadline(deadline, "opening a manifest")?;
                let entries = source.manifest(manifest, true).await?;
                let mut kept = Vec::with_capacity(entries.len());
                for entry in entries {
                    if filters.partition_evaluator.eval(&entry.data_file.partition)?
                        && metrics_evaluator.eval(&entry.data_file)?
                    {
                        kept.push(entry);
                    }
                }
                Ok::<_, Error>((manifest.partition_spec_id, kept))
            }
        }))
        .buffer_unordered(concurrency);

        // entries keep the spec id of the manifest they came from; the
        // final order is keyed on it
        let mut data_entries: Vec<(i32, ManifestEntry)> = Vec::new();
        let mut positional_delete_entries: Vec<ManifestEntry> = Vec::new();
        while let Some(filtered) = entry_stream.next().await {
            check_deadline(deadline, "filtering manifest entries")?;
            let (spec_id, entries) = filtered?;
            for entry in entries {
                match entry.data_file.content {
                    Content::Data => data_entries.push((spec_id, entry)),
                    Content::PositionDeletes => positional_delete_entries.push(entry),
                    Content::EqualityDeletes => {
                        return Err(Error::UnsupportedFeature(
                            "equality delete files".to_string(),
                        ))
                    }
                    Content::Unknown => {
                        return Err(Error::InvariantViolation(format!(
                            "unknown content kind on {}",
                            entry.data_file.file_path
                        )))
                    }
                }
            }
        }
        drop(entry_stream);

        // workers complete in any order; settle on a stable order over
        // (spec id, partition tuple, file path)
        let data_entries = data_entries
            .into_iter()
            .sorted_by(|(left_spec, left), (right_spec, right)| {
                left_spec.cmp(right_spec).then_with(|| {
                    left.data_file
                        .partition
                        .compare(&right.data_file.partition)
                        .then_with(|| {
                            left.data_file.file_path.cmp(&right.data_file.file_path)
                        })
                })
            });
        positional_delete_entries.sort_by_key(ManifestEntry::data_sequence_number);

        let mut tasks = Vec::new();
        for (_, data_entry) in data_entries {
            let delete_files =
                match_deletes_to_data_file(&data_entry, &positional_delete_entries)?;
            tasks.push(FileScanTask::new(data_entry.data_file, delete_files));
        }
        Ok(tasks)
    }
}

struct SpecFilters {
    manifest_evaluator: ManifestEvaluator,
    partition_evaluator: PartitionEvaluator,
}

fn check_deadline(deadline: Option<Instant>, stage: &str) -> Result<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            Err(Error::Timeout(stage.to_string()))
        }
        _ => Ok(()),
    }
}

/// Positional deletes apply to a data file when they are newer than it
/// and their recorded `file_path` bounds contain the file's path. The
/// candidate list must be sorted by data sequence number.
fn match_deletes_to_data_file(
    data_entry: &ManifestEntry,
    positional_delete_entries: &[ManifestEntry],
) -> Result<Vec<DataFile>> {
    let first_newer = positional_delete_entries
        .partition_point(|entry| entry.data_sequence_number() <= data_entry.data_sequence_number());
    let candidates = &positional_delete_entries[first_newer..];
    if candidates.is_empty() {
        return Ok(vec![]);
    }
    let evaluator = InclusiveMetricsEvaluator::new(
        &POSITIONAL_DELETE_SCHEMA,
        &Expr::equal(
            "file_path",
            Value::String(data_entry.data_file.file_path.clone()),
        ),
        true,
        // a delete file with no recorded rows still counts
        true,
    )?;
    let mut matched = Vec::new();
    for candidate in candidates {
        if evaluator.eval(&candidate.data_file)? {
            matched.push(candidate.data_file.clone());
        }
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::commit::{CommitTableRequest, CommitTableResponse};
    use crate::catalog::identifier::TableIdentifier;
    use crate::catalog::Catalog;
    use crate::io::{FileIO, ObjectStoreFileIO};
    use crate::model::manifest::{FileFormat, Status};
    use crate::model::manifest_list::{FieldSummary, ManifestFile};
    use crate::model::table_metadata::TableMetadata;
    use crate::model::values::Struct;
    use crate::table::manifest::manifest_entry_test_schema;
    use async_trait::async_trait;
    use object_store::memory::InMemory;
    use serde_bytes::ByteBuf;
    use std::collections::HashMap;

    #[derive(Debug)]
    struct NoCommitCatalog;

    #[async_trait]
    impl Catalog for NoCommitCatalog {
        async fn commit_table(
            &self,
            _request: CommitTableRequest,
        ) -> Result<CommitTableResponse> {
            Err(Error::Invalid("catalog not expected in this test".to_string()))
        }
    }

    const MANIFEST_LIST_SCHEMA: &str = r#"
    {
        "type": "record",
        "name": "manifest_file",
        "fields": [
            {"name": "manifest_path", "type": "string"},
            {"name": "manifest_length", "type": "long"},
            {"name": "partition_spec_id", "type": "int"},
            {"name": "content", "type": "int"},
            {"name": "sequence_number", "type": "long"},
            {"name": "min_sequence_number", "type": "long"},
            {"name": "added_snapshot_id", "type": "long"},
            {"name": "added_files_count", "type": ["null", "int"], "default": null},
            {"name": "existing_files_count", "type": ["null", "int"], "default": null},
            {"name": "deleted_files_count", "type": ["null", "int"], "default": null},
            {"name": "added_rows_count", "type": ["null", "long"], "default": null},
            {"name": "existing_rows_count", "type": ["null", "long"], "default": null},
            {"name": "deleted_rows_count", "type": ["null", "long"], "default": null},
            {"name": "partitions", "type": ["null", {
                "type": "array",
                "items": {
                    "type": "record",
                    "name": "field_summary",
                    "fields": [
                        {"name": "contains_null", "type": "boolean"},
                        {"name": "contains_nan", "type": ["null", "boolean"], "default": null},
                        {"name": "lower_bound", "type": ["null", "bytes"], "default": null},
                        {"name": "upper_bound", "type": ["null", "bytes"], "default": null}
                    ]
                }
            }], "default": null},
            {"name": "key_metadata", "type": ["null", "bytes"], "default": null}
        ]
    }
    "#;

    fn test_io() -> Arc<dyn FileIO> {
        Arc::new(
            ObjectStoreFileIO::new(HashMap::new())
                .unwrap()
                .with_store("s3", Arc::new(InMemory::new())),
        )
    }

    fn metadata_json(current_snapshot: Option<i64>) -> String {
        let snapshots = r#"
            [
                {
                    "snapshot-id": 42,
                    "sequence-number": 2,
                    "timestamp-ms": 1515100955770,
                    "summary": { "operation": "append" },
                    "manifest-list": "s3://bucket/metadata/snap-42.avro",
                    "schema-id": 0
                },
                {
                    "snapshot-id": 17,
                    "sequence-number": 1,
                    "timestamp-ms": 1515100955000,
                    "summary": { "operation": "append" },
                    "manifest-list": "s3://bucket/metadata/snap-17.avro",
                    "schema-id": 0
                }
            ]
        "#;
        let current = current_snapshot
            .map(|id| format!(r#""current-snapshot-id": {id},"#))
            .unwrap_or_default();
        format!(
            r#"
            {{
                "format-version": 2,
                "table-uuid": "fb072c92-a02b-11e9-ae9c-1bb7bc9eca94",
                "location": "s3://bucket/table",
                "last-sequence-number": 2,
                "last-updated-ms": 1515100955770,
                "last-column-id": 2,
                "schemas": [
                    {{
                        "schema-id": 0,
                        "type": "struct",
                        "fields": [
                            {{ "id": 1, "name": "id", "required": false, "type": "long" }},
                            {{ "id": 2, "name": "data", "required": false, "type": "string" }}
                        ]
                    }}
                ],
                "current-schema-id": 0,
                "partition-specs": [ {{ "spec-id": 0, "fields": [] }} ],
                "default-spec-id": 0,
                "last-partition-id": 999,
                "sort-orders": [],
                "default-sort-order-id": 0,
                {current}
                "snapshots": {snapshots},
                "refs": {{
                    "main": {{ "snapshot-id": 42, "type": "branch" }},
                    "stage": {{ "snapshot-id": 17, "type": "tag" }}
                }}
            }}
            "#
        )
    }

    fn table(io: Arc<dyn FileIO>, current_snapshot: Option<i64>) -> Table {
        let metadata: TableMetadata =
            serde_json::from_str(&metadata_json(current_snapshot)).unwrap();
        Table::new(
            TableIdentifier::parse("db.table").unwrap(),
            Arc::new(NoCommitCatalog),
            io,
            metadata,
            "s3://bucket/table/metadata/v2.metadata.json",
        )
    }

    fn data_file(path: &str, content: Content, lower: i64, upper: i64) -> DataFile {
        DataFile {
            content,
            file_path: path.to_string(),
            file_format: FileFormat::Parquet,
            partition: Struct::default(),
            record_count: 10,
            file_size_in_bytes: 1200,
            column_sizes: vec![],
            value_counts: vec![(1, 10)],
            null_value_counts: vec![(1, 0)],
            nan_value_counts: vec![],
            distinct_counts: vec![],
            lower_bounds: vec![(1, Value::Long(lower).to_bytes())],
            upper_bounds: vec![(1, Value::Long(upper).to_bytes())],
            key_metadata: None,
            split_offsets: vec![],
            equality_ids: vec![],
            sort_order_id: None,
        }
    }

    fn delete_file(lower_path: &str, upper_path: &str) -> DataFile {
        DataFile {
            content: Content::PositionDeletes,
            file_path: "s3://bucket/data/deletes.parquet".to_string(),
            file_format: FileFormat::Parquet,
            partition: Struct::default(),
            record_count: 4,
            file_size_in_bytes: 600,
            column_sizes: vec![],
            value_counts: vec![],
            null_value_counts: vec![],
            nan_value_counts: vec![],
            distinct_counts: vec![],
            lower_bounds: vec![(
                POSITIONAL_DELETE_FILE_PATH_ID,
                Value::String(lower_path.to_string()).to_bytes(),
            )],
            upper_bounds: vec![(
                POSITIONAL_DELETE_FILE_PATH_ID,
                Value::String(upper_path.to_string()).to_bytes(),
            )],
            key_metadata: None,
            split_offsets: vec![],
            equality_ids: vec![],
            sort_order_id: None,
        }
    }

    fn entry(sequence_number: i64, file: DataFile) -> ManifestEntry {
        ManifestEntry {
            status: Status::Added,
            snapshot_id: Some(42),
            sequence_number: Some(sequence_number),
            file_sequence_number: Some(sequence_number),
            data_file: file,
        }
    }

    async fn write_manifest(io: &Arc<dyn FileIO>, uri: &str, entries: &[ManifestEntry]) {
        let schema =
            apache_avro::Schema::parse_str(&manifest_entry_test_schema(&[])).unwrap();
        let mut writer = apache_avro::Writer::new(&schema, Vec::new());
        for entry in entries {
            writer.append_ser(entry).unwrap();
        }
        io.new_output(uri)
            .unwrap()
            .write(writer.into_inner().unwrap())
            .await
            .unwrap();
    }

    fn manifest_file(
        uri: &str,
        content: ManifestContent,
        sequence_number: i64,
        min_sequence_number: i64,
        partitions: Option<Vec<FieldSummary>>,
    ) -> ManifestFile {
        ManifestFile {
            manifest_path: uri.to_string(),
            manifest_length: 100,
            partition_spec_id: 0,
            content,
            sequence_number,
            min_sequence_number,
            added_snapshot_id: 42,
            added_files_count: None,
            existing_files_count: None,
            deleted_files_count: None,
            added_rows_count: None,
            existing_rows_count: None,
            deleted_rows_count: None,
            partitions,
            key_metadata: None,
        }
    }

    async fn write_manifest_list(io: &Arc<dyn FileIO>, uri: &str, files: &[ManifestFile]) {
        let schema = apache_avro::Schema::parse_str(MANIFEST_LIST_SCHEMA).unwrap();
        let mut writer = apache_avro::Writer::new(&schema, Vec::new());
        for file in files {
            writer.append_ser(file).unwrap();
        }
        io.new_output(uri)
            .unwrap()
            .write(writer.into_inner().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_plan_prunes_on_column_metrics() {
        let io = test_io();
        write_manifest(
            &io,
            "s3://bucket/metadata/m0.avro",
            &[
                entry(2, data_file("s3://bucket/data/a.parquet", Content::Data, 0, 2)),
                entry(2, data_file("s3://bucket/data/b.parquet", Content::Data, 5, 7)),
            ],
        )
        .await;
        write_manifest_list(
            &io,
            "s3://bucket/metadata/snap-42.avro",
            &[manifest_file(
                "s3://bucket/metadata/m0.avro",
                ManifestContent::Data,
                2,
                2,
                None,
            )],
        )
        .await;

        let table = table(io, Some(42));
        let tasks = table
            .scan()
            .filter_dsl("id > 4")
            .unwrap()
            .plan_files()
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].data_file.file_path, "s3://bucket/data/b.parquet");
        assert!(tasks[0].delete_files.is_empty());
        assert_eq!(tasks[0].start, 0);
        assert_eq!(tasks[0].length, 1200);
    }

    #[tokio::test]
    async fn test_plan_pairs_positional_deletes_by_sequence_and_path() {
        let io = test_io();
        write_manifest(
            &io,
            "s3://bucket/metadata/m-data.avro",
            &[entry(
                5,
                data_file("a/1.parquet", Content::Data, 0, 9),
            )],
        )
        .await;
        write_manifest(
            &io,
            "s3://bucket/metadata/m-deletes-new.avro",
            &[entry(7, delete_file("a/0.parquet", "a/2.parquet"))],
        )
        .await;
        write_manifest(
            &io,
            "s3://bucket/metadata/m-deletes-old.avro",
            &[entry(4, delete_file("a/0.parquet", "a/2.parquet"))],
        )
        .await;
        write_manifest_list(
            &io,
            "s3://bucket/metadata/snap-42.avro",
            &[
                manifest_file(
                    "s3://bucket/metadata/m-data.avro",
                    ManifestContent::Data,
                    5,
                    5,
                    None,
                ),
                manifest_file(
                    "s3://bucket/metadata/m-deletes-new.avro",
                    ManifestContent::Deletes,
                    7,
                    7,
                    None,
                ),
                manifest_file(
                    "s3://bucket/metadata/m-deletes-old.avro",
                    ManifestContent::Deletes,
                    4,
                    4,
                    None,
                ),
            ],
        )
        .await;

        let table = table(io, Some(42));
        let tasks = table.scan().plan_files().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].data_file.file_path, "a/1.parquet");
        // only the newer delete whose path bounds contain a/1.parquet applies
        assert_eq!(tasks[0].delete_files.len(), 1);
        assert_eq!(
            tasks[0].delete_files[0].file_path,
            "s3://bucket/data/deletes.parquet"
        );
    }

    #[tokio::test]
    async fn test_delete_outside_path_bounds_is_not_paired() {
        let io = test_io();
        write_manifest(
            &io,
            "s3://bucket/metadata/m-data.avro",
            &[entry(5, data_file("b/9.parquet", Content::Data, 0, 9))],
        )
        .await;
        write_manifest(
            &io,
            "s3://bucket/metadata/m-deletes.avro",
            &[entry(7, delete_file("a/0.parquet", "a/2.parquet"))],
        )
        .await;
        write_manifest_list(
            &io,
            "s3://bucket/metadata/snap-42.avro",
            &[
                manifest_file(
                    "s3://bucket/metadata/m-data.avro",
                    ManifestContent::Data,
                    5,
                    5,
                    None,
                ),
                manifest_file(
                    "s3://bucket/metadata/m-deletes.avro",
                    ManifestContent::Deletes,
                    7,
                    7,
                    None,
                ),
            ],
        )
        .await;

        let table = table(io, Some(42));
        let tasks = table.scan().plan_files().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].delete_files.is_empty());
    }

    #[tokio::test]
    async fn test_old_delete_manifests_are_dropped() {
        let io = test_io();
        write_manifest(
            &io,
            "s3://bucket/metadata/m-data.avro",
            &[entry(5, data_file("a/1.parquet", Content::Data, 0, 9))],
        )
        .await;
        write_manifest_list(
            &io,
            "s3://bucket/metadata/snap-42.avro",
            &[
                manifest_file(
                    "s3://bucket/metadata/m-data.avro",
                    ManifestContent::Data,
                    5,
                    5,
                    None,
                ),
                // older than every data file; never opened (it does not
                // even exist in the store)
                manifest_file(
                    "s3://bucket/metadata/m-deletes-stale.avro",
                    ManifestContent::Deletes,
                    3,
                    3,
                    None,
                ),
            ],
        )
        .await;

        let table = table(io, Some(42));
        let tasks = table.scan().plan_files().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].delete_files.is_empty());
    }

    #[tokio::test]
    async fn test_manifest_pruned_by_partition_summaries() {
        // partitioned metadata: spec on id with identity
        let io = test_io();
        let metadata_json = r#"
            {
                "format-version": 2,
                "table-uuid": "fb072c92-a02b-11e9-ae9c-1bb7bc9eca94",
                "location": "s3://bucket/table",
                "last-sequence-number": 2,
                "last-updated-ms": 1515100955770,
                "last-column-id": 2,
                "schemas": [
                    {
                        "schema-id": 0,
                        "type": "struct",
                        "fields": [
                            { "id": 1, "name": "id", "required": false, "type": "long" }
                        ]
                    }
                ],
                "current-schema-id": 0,
                "partition-specs": [ { "spec-id": 0, "fields": [
                    { "source-id": 1, "field-id": 1000, "name": "id", "transform": "identity" }
                ] } ],
                "default-spec-id": 0,
                "last-partition-id": 1000,
                "sort-orders": [],
                "default-sort-order-id": 0,
                "current-snapshot-id": 42,
                "snapshots": [
                    {
                        "snapshot-id": 42,
                        "sequence-number": 2,
                        "timestamp-ms": 1515100955770,
                        "summary": { "operation": "append" },
                        "manifest-list": "s3://bucket/metadata/snap-42.avro",
                        "schema-id": 0
                    }
                ]
            }
        "#;
        // the matching manifest exists, the pruned one was never written
        let mut high = data_file("s3://bucket/data/high.parquet", Content::Data, 5, 9);
        high.partition = vec![("id".to_string(), Some(Value::Long(7)))]
            .into_iter()
            .collect();
        {
            let schema = apache_avro::Schema::parse_str(&manifest_entry_test_schema(&[(
                "id", "long",
            )]))
            .unwrap();
            let mut writer = apache_avro::Writer::new(&schema, Vec::new());
            writer.append_ser(entry(2, high)).unwrap();
            io.new_output("s3://bucket/metadata/m-high.avro")
                .unwrap()
                .write(writer.into_inner().unwrap())
                .await
                .unwrap();
        }
        let summaries = |lower: i64, upper: i64| {
            Some(vec![FieldSummary {
                contains_null: false,
                contains_nan: Some(false),
                lower_bound: Some(ByteBuf::from(Value::Long(lower).to_bytes())),
                upper_bound: Some(ByteBuf::from(Value::Long(upper).to_bytes())),
            }])
        };
        write_manifest_list(
            &io,
            "s3://bucket/metadata/snap-42.avro",
            &[
                manifest_file(
                    "s3://bucket/metadata/m-low.avro",
                    ManifestContent::Data,
                    2,
                    2,
                    summaries(0, 2),
                ),
                manifest_file(
                    "s3://bucket/metadata/m-high.avro",
                    ManifestContent::Data,
                    2,
                    2,
                    summaries(5, 9),
                ),
            ],
        )
        .await;

        let metadata: TableMetadata = serde_json::from_str(metadata_json).unwrap();
        let table = Table::new(
            TableIdentifier::parse("db.table").unwrap(),
            Arc::new(NoCommitCatalog),
            io,
            metadata,
            "s3://bucket/table/metadata/v2.metadata.json",
        );
        let tasks = table
            .scan()
            .filter_dsl("id > 4")
            .unwrap()
            .plan_files()
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].data_file.file_path, "s3://bucket/data/high.parquet");
    }

    #[tokio::test]
    async fn test_tasks_order_by_spec_partition_and_path() {
        // two specs live at once, as after a partition evolution
        let io = test_io();
        let metadata_json = r#"
            {
                "format-version": 2,
                "table-uuid": "fb072c92-a02b-11e9-ae9c-1bb7bc9eca94",
                "location": "s3://bucket/table",
                "last-sequence-number": 2,
                "last-updated-ms": 1515100955770,
                "last-column-id": 1,
                "schemas": [
                    {
                        "schema-id": 0,
                        "type": "struct",
                        "fields": [
                            { "id": 1, "name": "id", "required": false, "type": "long" }
                        ]
                    }
                ],
                "current-schema-id": 0,
                "partition-specs": [
                    { "spec-id": 0, "fields": [] },
                    { "spec-id": 1, "fields": [
                        { "source-id": 1, "field-id": 1000, "name": "id", "transform": "identity" }
                    ] }
                ],
                "default-spec-id": 1,
                "last-partition-id": 1000,
                "sort-orders": [],
                "default-sort-order-id": 0,
                "current-snapshot-id": 42,
                "snapshots": [
                    {
                        "snapshot-id": 42,
                        "sequence-number": 2,
                        "timestamp-ms": 1515100955770,
                        "summary": { "operation": "append" },
                        "manifest-list": "s3://bucket/metadata/snap-42.avro",
                        "schema-id": 0
                    }
                ]
            }
        "#;

        write_manifest(
            &io,
            "s3://bucket/metadata/m-spec0.avro",
            &[entry(2, data_file("s3://bucket/data/z.parquet", Content::Data, 0, 9))],
        )
        .await;
        {
            let partitioned = |path: &str, id: i64| {
                let mut file = data_file(path, Content::Data, 0, 9);
                file.partition = vec![("id".to_string(), Some(Value::Long(id)))]
                    .into_iter()
                    .collect();
                entry(2, file)
            };
            let schema = apache_avro::Schema::parse_str(&manifest_entry_test_schema(&[(
                "id", "long",
            )]))
            .unwrap();
            let mut writer = apache_avro::Writer::new(&schema, Vec::new());
            // path order and partition order disagree on purpose
            writer
                .append_ser(partitioned("s3://bucket/data/x.parquet", 2))
                .unwrap();
            writer
                .append_ser(partitioned("s3://bucket/data/y.parquet", 1))
                .unwrap();
            io.new_output("s3://bucket/metadata/m-spec1.avro")
                .unwrap()
                .write(writer.into_inner().unwrap())
                .await
                .unwrap();
        }
        let mut spec1_manifest = manifest_file(
            "s3://bucket/metadata/m-spec1.avro",
            ManifestContent::Data,
            2,
            2,
            None,
        );
        spec1_manifest.partition_spec_id = 1;
        write_manifest_list(
            &io,
            "s3://bucket/metadata/snap-42.avro",
            &[
                spec1_manifest,
                manifest_file(
                    "s3://bucket/metadata/m-spec0.avro",
                    ManifestContent::Data,
                    2,
                    2,
                    None,
                ),
            ],
        )
        .await;

        let metadata: TableMetadata = serde_json::from_str(metadata_json).unwrap();
        let table = Table::new(
            TableIdentifier::parse("db.table").unwrap(),
            Arc::new(NoCommitCatalog),
            io,
            metadata,
            "s3://bucket/table/metadata/v2.metadata.json",
        );
        let tasks = table.scan().plan_files().await.unwrap();
        let paths: Vec<&str> = tasks
            .iter()
            .map(|task| task.data_file.file_path.as_str())
            .collect();
        // spec 0 first, then spec 1 ordered by partition tuple, not path
        assert_eq!(
            paths,
            vec![
                "s3://bucket/data/z.parquet",
                "s3://bucket/data/y.parquet",
                "s3://bucket/data/x.parquet",
            ]
        );
    }

    #[tokio::test]
    async fn test_equality_deletes_abort_planning() {
        let io = test_io();
        write_manifest(
            &io,
            "s3://bucket/metadata/m0.avro",
            &[entry(
                2,
                data_file("s3://bucket/data/eq.parquet", Content::EqualityDeletes, 0, 9),
            )],
        )
        .await;
        write_manifest_list(
            &io,
            "s3://bucket/metadata/snap-42.avro",
            &[manifest_file(
                "s3://bucket/metadata/m0.avro",
                ManifestContent::Deletes,
                2,
                2,
                None,
            )],
        )
        .await;

        let table = table(io, Some(42));
        let err = table.scan().plan_files().await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));
    }

    #[tokio::test]
    async fn test_empty_table_plans_no_tasks() {
        let table = table(test_io(), None);
        let tasks = table.scan().plan_files().await.unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_all_entries_pruned_is_not_an_error() {
        let io = test_io();
        write_manifest(
            &io,
            "s3://bucket/metadata/m0.avro",
            &[entry(2, data_file("s3://bucket/data/a.parquet", Content::Data, 0, 2))],
        )
        .await;
        write_manifest_list(
            &io,
            "s3://bucket/metadata/snap-42.avro",
            &[manifest_file(
                "s3://bucket/metadata/m0.avro",
                ManifestContent::Data,
                2,
                2,
                None,
            )],
        )
        .await;

        let table = table(io, Some(42));
        let tasks = table
            .scan()
            .filter_dsl("id > 100")
            .unwrap()
            .plan_files()
            .await
            .unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_scan_resolves_ref() {
        let io = test_io();
        write_manifest(
            &io,
            "s3://bucket/metadata/m17.avro",
            &[entry(1, data_file("s3://bucket/data/old.parquet", Content::Data, 0, 9))],
        )
        .await;
        write_manifest_list(
            &io,
            "s3://bucket/metadata/snap-17.avro",
            &[manifest_file(
                "s3://bucket/metadata/m17.avro",
                ManifestContent::Data,
                1,
                1,
                None,
            )],
        )
        .await;

        let table = table(io, Some(42));
        let scan = table.scan().use_ref("stage").unwrap();
        assert_eq!(scan.snapshot().unwrap().snapshot_id, 17);
        let tasks = scan.plan_files().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].data_file.file_path, "s3://bucket/data/old.parquet");

        assert!(table.scan().use_ref("missing").is_err());
        assert!(table
            .scan()
            .use_snapshot(42)
            .unwrap()
            .use_ref("stage")
            .is_err());
    }

    #[tokio::test]
    async fn test_deadline_breach_times_out() {
        let io = test_io();
        write_manifest_list(&io, "s3://bucket/metadata/snap-42.avro", &[]).await;
        let table = table(io, Some(42));
        let err = table
            .scan()
            .with_options(ScanOptions {
                deadline: Some(Duration::from_secs(0)),
                ..ScanOptions::default()
            })
            .plan_files()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_projection_selects_by_field_id() {
        let table = table(test_io(), Some(42));
        let scan = table.scan().select(&["data"]);
        let projected = scan.projection().unwrap();
        assert_eq!(projected.fields().len(), 1);
        assert_eq!(projected.fields()[0].id, 2);

        let all = table.scan().projection().unwrap();
        assert_eq!(all.fields().len(), 2);
    }
}
