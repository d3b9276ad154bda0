/*!
Staged schema evolution.

An [UpdateSchema] collects add/rename/retype/requirement/move operations
against a snapshot of the current schema, validates them as they are staged,
and applies them in one bottom-up pass producing a new schema. Field ids
never change for surviving fields, and deleted ids are never reused.

Committing emits the add-schema / set-current-schema updates together with
the current-schema-id assertion, either into an enclosing transaction or as
a standalone catalog commit.
*/

use std::collections::{HashMap, HashSet};

use crate::catalog::commit::{
    append_unique_requirement, append_unique_update, TableRequirement, TableUpdate,
    LAST_ADDED_SCHEMA_ID,
};
use crate::error::{Error, Result};
use crate::model::schema::{
    assign_fresh_ids, List, Map, PrimitiveType, Schema, StructField, StructType, Type,
    TABLE_ROOT_ID,
};
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveOperation {
    First,
    Before(i32),
    After(i32),
}

#[derive(Debug, Clone, Copy)]
struct Move {
    field_id: i32,
    op: MoveOperation,
}

/// Where a finished schema update is committed to.
#[derive(Debug)]
pub enum SchemaSink<'a> {
    /// Commit standalone through the table's catalog.
    Table(&'a mut Table),
    /// Stage into an enclosing transaction.
    Staged {
        /// The transaction's update list.
        updates: &'a mut Vec<TableUpdate>,
        /// The transaction's requirement list.
        requirements: &'a mut Vec<TableRequirement>,
    },
    /// No destination; only [UpdateSchema::apply] is available.
    Detached,
}

/// Builder staging schema changes against a snapshot of a schema.
#[derive(Debug)]
pub struct UpdateSchema<'a> {
    schema: Schema,
    sink: SchemaSink<'a>,
    adds: HashMap<i32, Vec<StructField>>,
    updates: HashMap<i32, StructField>,
    deletes: HashSet<i32>,
    moves: HashMap<i32, Vec<Move>>,
    added_name_to_id: HashMap<String, i32>,
    id_to_parent: HashMap<i32, String>,
    identifier_field_names: Vec<String>,
    last_column_id: i32,
    case_sensitive: bool,
    allow_incompatible_changes: bool,
}

impl<'a> UpdateSchema<'a> {
    pub(crate) fn new(schema: Schema, sink: SchemaSink<'a>) -> UpdateSchema<'a> {
        let id_to_parent = schema.index_parents();
        let identifier_field_names = schema.identifier_field_names();
        let last_column_id = schema.highest_field_id();
        UpdateSchema {
            schema,
            sink,
            adds: HashMap::new(),
            updates: HashMap::new(),
            deletes: HashSet::new(),
            moves: HashMap::new(),
            added_name_to_id: HashMap::new(),
            id_to_parent,
            identifier_field_names,
            last_column_id,
            case_sensitive: true,
            allow_incompatible_changes: false,
        }
    }

    /// Stage changes against a schema without a table. Only
    /// [UpdateSchema::apply] is available on the result.
    pub fn for_schema(schema: Schema) -> UpdateSchema<'static> {
        UpdateSchema::new(schema, SchemaSink::Detached)
    }

    /// Choose whether column names resolve case-sensitively.
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Allow changes that can break readers or writers of existing data.
    pub fn allow_incompatible_changes(mut self) -> Self {
        self.allow_incompatible_changes = true;
        self
    }

    fn assign_new_column_id(&mut self) -> i32 {
        self.last_column_id += 1;
        self.last_column_id
    }

    /// Add a column at the dotted path. Intermediate parents must exist
    /// and be structs (or list elements / map values that are structs).
    /// The new column and any nested fields receive fresh ids.
    pub fn add_column(
        mut self,
        path: &str,
        field_type: Type,
        doc: Option<&str>,
        required: bool,
    ) -> Result<Self> {
        if required && !self.allow_incompatible_changes {
            // existing rows have no value to give the new column
            return Err(Error::Incompatible(format!(
                "cannot add required column {path}"
            )));
        }

        let (parent, name) = match path.rsplit_once('.') {
            Some((parent, name)) => (Some(parent), name),
            None => (None, path),
        };
        if name.is_empty() {
            return Err(Error::Invalid("column name cannot be empty".to_string()));
        }

        let parent_id = match parent {
            None => TABLE_ROOT_ID,
            Some(parent) => {
                let parent_field = self.schema.find_field(parent, self.case_sensitive)?;
                self.container_id(parent_field).ok_or_else(|| {
                    Error::Invalid(format!(
                        "cannot add column {name} to non-struct type {parent}"
                    ))
                })?
            }
        };

        let exists = self.schema.find_field(path, self.case_sensitive).is_ok()
            || self.added_name_to_id.contains_key(path)
            || self
                .adds
                .get(&parent_id)
                .is_some_and(|siblings| siblings.iter().any(|sibling| sibling.name == name));
        if exists {
            return Err(Error::AlreadyExists(format!("column {path}")));
        }

        let new_id = self.assign_new_column_id();
        self.added_name_to_id.insert(path.to_string(), new_id);
        if let Some(parent) = parent {
            self.id_to_parent.insert(new_id, parent.to_string());
        }

        let mut counter = self.last_column_id;
        let fresh_type = assign_fresh_ids(&field_type, &mut || {
            counter += 1;
            counter
        });
        self.last_column_id = counter;

        let field = StructField {
            id: new_id,
            name: name.to_string(),
            required,
            field_type: fresh_type,
            doc: doc.map(ToString::to_string),
        };
        self.adds.entry(parent_id).or_default().push(field);
        Ok(self)
    }

    /// Delete the column at the dotted path. The id is tombstoned and
    /// never returns to the free pool.
    pub fn delete_column(mut self, path: &str) -> Result<Self> {
        let field_id = self.schema.find_field(path, self.case_sensitive)?.id;
        if self.adds.contains_key(&field_id) {
            return Err(Error::Invalid(format!(
                "cannot delete column {path} that has additions"
            )));
        }
        if self.updates.contains_key(&field_id) {
            return Err(Error::Invalid(format!(
                "cannot delete column {path} that has updates"
            )));
        }
        self.deletes.insert(field_id);
        Ok(self)
    }

    /// Rename the column at the dotted path, keeping its id, type, doc
    /// and requirement. Identifier fields follow the rename.
    pub fn rename_column(mut self, path: &str, new_name: &str) -> Result<Self> {
        if new_name.contains('.') || new_name.is_empty() {
            return Err(Error::Invalid(format!("invalid column name {new_name}")));
        }
        let field = self.schema.find_field(path, self.case_sensitive)?.clone();
        if self.deletes.contains(&field.id) {
            return Err(Error::Invalid(format!(
                "cannot rename column {path} that will be deleted"
            )));
        }

        let staged = self.updates.entry(field.id).or_insert(field);
        staged.name = new_name.to_string();

        let new_path = match path.rsplit_once('.') {
            Some((parent, _)) => format!("{parent}.{new_name}"),
            None => new_name.to_string(),
        };
        for name in &mut self.identifier_field_names {
            if name.as_str() == path {
                *name = new_path.clone();
            }
        }
        Ok(self)
    }

    /// Change the type of the column at the dotted path. Only safe
    /// promotions are allowed without opting into incompatible changes:
    /// int to long, float to double, and decimal precision widening.
    pub fn update_column(mut self, path: &str, new_type: Type) -> Result<Self> {
        let field = self.schema.find_field(path, self.case_sensitive)?.clone();
        if self.deletes.contains(&field.id) {
            return Err(Error::Invalid(format!(
                "cannot update column {path} that will be deleted"
            )));
        }
        if field.field_type == new_type {
            return Ok(self);
        }
        if !self.allow_incompatible_changes && !is_safe_promotion(&field.field_type, &new_type)
        {
            return Err(Error::Incompatible(format!(
                "cannot change column {path} from {} to {new_type}",
                field.field_type
            )));
        }
        let staged = self.updates.entry(field.id).or_insert(field);
        staged.field_type = new_type;
        Ok(self)
    }

    /// Make the column required. Existing data may hold nulls, so this
    /// needs incompatible changes to be allowed.
    pub fn require_column(self, path: &str) -> Result<Self> {
        self.set_column_requirement(path, true)
    }

    /// Make the column optional. Always safe.
    pub fn make_column_optional(self, path: &str) -> Result<Self> {
        self.set_column_requirement(path, false)
    }

    fn set_column_requirement(mut self, path: &str, required: bool) -> Result<Self> {
        let field = self.schema.find_field(path, self.case_sensitive)?.clone();
        if field.required == required {
            // noop even when incompatible changes are not allowed
            return Ok(self);
        }
        if required && !self.allow_incompatible_changes {
            return Err(Error::Incompatible(format!(
                "cannot change column {path} from optional to required"
            )));
        }
        if self.deletes.contains(&field.id) {
            return Err(Error::Invalid(format!(
                "cannot update column {path} that will be deleted"
            )));
        }
        let staged = self.updates.entry(field.id).or_insert(field);
        staged.required = required;
        Ok(self)
    }

    /// Replace the doc string of the column at the dotted path.
    pub fn update_column_doc(mut self, path: &str, doc: &str) -> Result<Self> {
        let field = self.schema.find_field(path, self.case_sensitive)?.clone();
        if self.deletes.contains(&field.id) {
            return Err(Error::Invalid(format!(
                "cannot update column {path} that will be deleted"
            )));
        }
        if field.doc.as_deref() == Some(doc) {
            return Ok(self);
        }
        let staged = self.updates.entry(field.id).or_insert(field);
        staged.doc = Some(doc.to_string());
        Ok(self)
    }

    /// Replace the identifier fields of the schema.
    pub fn set_identifier_fields(mut self, names: &[&str]) -> Self {
        self.identifier_field_names = names.iter().map(ToString::to_string).collect();
        self
    }

    /// Move the column to the first position of its parent struct.
    pub fn move_first(mut self, path: &str) -> Result<Self> {
        let field_id = self.find_for_move(path)?;
        self.stage_move(
            path,
            Move {
                field_id,
                op: MoveOperation::First,
            },
        )?;
        Ok(self)
    }

    /// Move the column directly before another column of the same parent.
    pub fn move_before(mut self, path: &str, before_path: &str) -> Result<Self> {
        let field_id = self.find_for_move(path)?;
        let before_id = self.find_for_move(before_path)?;
        if field_id == before_id {
            return Err(Error::Invalid(format!("cannot move {path} before itself")));
        }
        self.check_same_parent(path, field_id, before_id)?;
        self.stage_move(
            path,
            Move {
                field_id,
                op: MoveOperation::Before(before_id),
            },
        )?;
        Ok(self)
    }

    /// Move the column directly after another column of the same parent.
    pub fn move_after(mut self, path: &str, after_path: &str) -> Result<Self> {
        let field_id = self.find_for_move(path)?;
        let after_id = self.find_for_move(after_path)?;
        if field_id == after_id {
            return Err(Error::Invalid(format!("cannot move {path} after itself")));
        }
        self.check_same_parent(path, field_id, after_id)?;
        self.stage_move(
            path,
            Move {
                field_id,
                op: MoveOperation::After(after_id),
            },
        )?;
        Ok(self)
    }

    fn find_for_move(&self, path: &str) -> Result<i32> {
        if let Ok(field) = self.schema.find_field(path, self.case_sensitive) {
            return Ok(field.id);
        }
        self.added_name_to_id
            .get(path)
            .copied()
            .ok_or_else(|| Error::NotFound("column".to_string(), path.to_string()))
    }

    fn check_same_parent(&self, path: &str, field_id: i32, other_id: i32) -> Result<()> {
        if self.id_to_parent.get(&field_id) != self.id_to_parent.get(&other_id) {
            return Err(Error::Invalid(format!(
                "cannot move {path} to a different struct"
            )));
        }
        Ok(())
    }

    fn stage_move(&mut self, path: &str, staged_move: Move) -> Result<()> {
        let container = match self.id_to_parent.get(&staged_move.field_id) {
            None => TABLE_ROOT_ID,
            Some(parent) => {
                let parent_field = self.schema.find_field(parent, self.case_sensitive)?;
                self.container_id(parent_field).ok_or_else(|| {
                    Error::Invalid(format!("cannot move fields in non-struct type {parent}"))
                })?
            }
        };
        self.moves.entry(container).or_default().push(staged_move);
        Ok(())
    }

    /// The id additions and moves under this field attach to: the field
    /// itself for structs, the element for lists of structs, the value
    /// for maps with struct values.
    fn container_id(&self, field: &StructField) -> Option<i32> {
        match &field.field_type {
            Type::Struct(_) => Some(field.id),
            Type::List(list) if list.element.is_struct() => Some(list.element_id),
            Type::Map(map) if map.value.is_struct() => Some(map.value_id),
            _ => None,
        }
    }

    /// Apply the staged changes to the original schema and return the
    /// resulting schema. Surviving fields keep their ids.
    pub fn apply(&self) -> Result<Schema> {
        let mut fields = self.rebuild_struct(TABLE_ROOT_ID, self.schema.as_struct())?;
        if let Some(moves) = self.moves.get(&TABLE_ROOT_ID) {
            apply_moves(&mut fields.fields, moves)?;
        }

        let mut schema = Schema {
            schema_id: self.schema.schema_id,
            identifier_field_ids: None,
            struct_fields: fields,
        };

        let mut identifier_field_ids = Vec::with_capacity(self.identifier_field_names.len());
        for name in &self.identifier_field_names {
            let field = schema.find_field(name, self.case_sensitive).map_err(|_| {
                Error::Invalid(format!(
                    "cannot use {name} as an identifier field: not found in the new schema"
                ))
            })?;
            identifier_field_ids.push(field.id);
        }
        if !identifier_field_ids.is_empty() {
            schema.identifier_field_ids = Some(identifier_field_ids);
        }

        schema.validate()?;
        Ok(schema)
    }

    fn rebuild_struct(&self, owner_id: i32, fields: &StructType) -> Result<StructType> {
        let mut new_fields = Vec::with_capacity(fields.fields.len());
        for field in &fields.fields {
            if self.deletes.contains(&field.id) {
                continue;
            }
            let mut new_field = StructField {
                id: field.id,
                name: field.name.clone(),
                required: field.required,
                field_type: self.rebuild_type(field)?,
                doc: field.doc.clone(),
            };
            if let Some(update) = self.updates.get(&field.id) {
                new_field.name = update.name.clone();
                new_field.required = update.required;
                new_field.doc = update.doc.clone();
                if update.field_type != field.field_type {
                    new_field.field_type = update.field_type.clone();
                }
            }
            new_fields.push(new_field);
        }
        if let Some(added) = self.adds.get(&owner_id) {
            new_fields.extend(added.iter().cloned());
        }
        if owner_id != TABLE_ROOT_ID {
            if let Some(moves) = self.moves.get(&owner_id) {
                apply_moves(&mut new_fields, moves)?;
            }
        }
        Ok(StructType { fields: new_fields })
    }

    fn rebuild_type(&self, field: &StructField) -> Result<Type> {
        match &field.field_type {
            Type::Primitive(primitive) => Ok(Type::Primitive(primitive.clone())),
            Type::Struct(nested) => {
                Ok(Type::Struct(self.rebuild_struct(field.id, nested)?))
            }
            Type::List(list) => {
                if self.deletes.contains(&list.element_id) {
                    return Err(Error::Invalid(format!(
                        "cannot delete the element type of list {}",
                        field.name
                    )));
                }
                let element = match list.element.as_ref() {
                    Type::Struct(nested) => {
                        Type::Struct(self.rebuild_struct(list.element_id, nested)?)
                    }
                    other => other.clone(),
                };
                Ok(Type::List(List {
                    element_id: list.element_id,
                    element_required: list.element_required,
                    element: Box::new(element),
                }))
            }
            Type::Map(map) => {
                if self.adds.contains_key(&map.key_id) {
                    return Err(Error::Invalid(format!(
                        "cannot add fields to the key of map {}",
                        field.name
                    )));
                }
                if self.deletes.contains(&map.value_id) {
                    return Err(Error::Invalid(format!(
                        "cannot delete the value type of map {}",
                        field.name
                    )));
                }
                let value = match map.value.as_ref() {
                    Type::Struct(nested) => {
                        Type::Struct(self.rebuild_struct(map.value_id, nested)?)
                    }
                    other => other.clone(),
                };
                Ok(Type::Map(Map {
                    key_id: map.key_id,
                    key: map.key.clone(),
                    value_id: map.value_id,
                    value_required: map.value_required,
                    value: Box::new(value),
                }))
            }
        }
    }

    /// Apply the staged changes and commit the new schema: into the
    /// enclosing transaction when there is one, otherwise as a
    /// standalone catalog commit.
    pub async fn commit(self) -> Result<()> {
        let new_schema = self.apply()?;
        let updates = vec![
            TableUpdate::AddSchema {
                last_column_id: Some(new_schema.highest_field_id()),
                schema: new_schema,
            },
            TableUpdate::SetCurrentSchema {
                schema_id: LAST_ADDED_SCHEMA_ID,
            },
        ];
        let requirements = vec![TableRequirement::AssertCurrentSchemaId {
            current_schema_id: self.schema.schema_id,
        }];
        match self.sink {
            SchemaSink::Table(table) => table.do_commit(updates, requirements).await,
            SchemaSink::Staged {
                updates: staged_updates,
                requirements: staged_requirements,
            } => {
                for update in updates {
                    append_unique_update(staged_updates, update)?;
                }
                for requirement in requirements {
                    append_unique_requirement(staged_requirements, requirement)?;
                }
                Ok(())
            }
            SchemaSink::Detached => Err(Error::Invalid(
                "schema update is not attached to a table".to_string(),
            )),
        }
    }
}

/// int to long, float to double, and decimal precision widening at the
/// same scale are readable by every consumer of old data.
fn is_safe_promotion(current: &Type, new: &Type) -> bool {
    match (current, new) {
        (Type::Primitive(current), Type::Primitive(new)) => matches!(
            (current, new),
            (PrimitiveType::Int, PrimitiveType::Long)
                | (PrimitiveType::Float, PrimitiveType::Double)
        ) || matches!(
            (current, new),
            (
                PrimitiveType::Decimal {
                    precision: current_precision,
                    scale: current_scale,
                },
                PrimitiveType::Decimal {
                    precision: new_precision,
                    scale: new_scale,
                },
            ) if new_precision >= current_precision && new_scale == current_scale
        ),
        _ => false,
    }
}

fn apply_moves(fields: &mut Vec<StructField>, moves: &[Move]) -> Result<()> {
    for staged_move in moves {
        let from = fields
            .iter()
            .position(|field| field.id == staged_move.field_id)
            .ok_or_else(|| {
                Error::NotFound("column".to_string(), staged_move.field_id.to_string())
            })?;
        let field = fields.remove(from);
        match staged_move.op {
            MoveOperation::First => fields.insert(0, field),
            MoveOperation::Before(other_id) => {
                let to = fields
                    .iter()
                    .position(|field| field.id == other_id)
                    .ok_or_else(|| {
                        Error::NotFound("column".to_string(), other_id.to_string())
                    })?;
                fields.insert(to, field);
            }
            MoveOperation::After(other_id) => {
                let to = fields
                    .iter()
                    .position(|field| field.id == other_id)
                    .ok_or_else(|| {
                        Error::NotFound("column".to_string(), other_id.to_string())
                    })?;
                fields.insert(to + 1, field);
            }
        }
    }
    Ok(())
}
