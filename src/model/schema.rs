/*!
A table's [schema](https://iceberg.apache.org/spec/#schemas-and-data-types) is a tree of named,
id-addressed fields, represented by [Schema]. All data types are either
[primitives](PrimitiveType) or nested types, which are [Map], [List], or [StructType].

Field ids are the stable identity of a column: they survive renames and reorders and are
the key used to match columns across file versions.
*/

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Parent id used for fields at the root of the schema.
pub const TABLE_ROOT_ID: i32 = -1;

#[derive(Debug, PartialEq, Eq, Clone)]
/// Primitive Types within a schema.
pub enum PrimitiveType {
    /// True or False
    Boolean,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit IEEE 754 floating point.
    Float,
    /// 64-bit IEEE 754 floating point.
    Double,
    /// Fixed point decimal
    Decimal {
        /// The total number of digits in the number.
        precision: i32,
        /// The number of digits to the right of the decimal point.
        scale: u8,
    },
    /// Calendar date without timezone or time.
    Date,
    /// Time of day without date or timezone, microsecond precision.
    Time,
    /// Timestamp without timezone, microsecond precision.
    Timestamp,
    /// Timestamp with timezone, microsecond precision.
    Timestamptz,
    /// Arbitrary-length character sequences
    String,
    /// Universally Unique Identifiers
    Uuid,
    /// Fixed length byte array
    Fixed(u64),
    /// Arbitrary-length byte array.
    Binary,
}

/// The wire form of a primitive type is its display form; the two
/// parameterized types render as `decimal(p,s)` and `fixed[n]`.
impl Serialize for PrimitiveType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PrimitiveType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl FromStr for PrimitiveType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Invalid(format!("type {s} is not a primitive type"));
        Ok(match s {
            "boolean" => PrimitiveType::Boolean,
            "int" => PrimitiveType::Int,
            "long" => PrimitiveType::Long,
            "float" => PrimitiveType::Float,
            "double" => PrimitiveType::Double,
            "date" => PrimitiveType::Date,
            "time" => PrimitiveType::Time,
            "timestamp" => PrimitiveType::Timestamp,
            "timestamptz" => PrimitiveType::Timestamptz,
            "string" => PrimitiveType::String,
            "uuid" => PrimitiveType::Uuid,
            "binary" => PrimitiveType::Binary,
            parameterized => {
                if let Some(arguments) = parameterized
                    .strip_prefix("decimal(")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    let (precision, scale) =
                        arguments.split_once(',').ok_or_else(invalid)?;
                    PrimitiveType::Decimal {
                        precision: precision.trim().parse().map_err(|_| invalid())?,
                        scale: scale.trim().parse().map_err(|_| invalid())?,
                    }
                } else if let Some(length) = parameterized
                    .strip_prefix("fixed[")
                    .and_then(|rest| rest.strip_suffix(']'))
                {
                    PrimitiveType::Fixed(length.parse().map_err(|_| invalid())?)
                } else {
                    return Err(invalid());
                }
            }
        })
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrimitiveType::Boolean => write!(f, "boolean"),
            PrimitiveType::Int => write!(f, "int"),
            PrimitiveType::Long => write!(f, "long"),
            PrimitiveType::Float => write!(f, "float"),
            PrimitiveType::Double => write!(f, "double"),
            PrimitiveType::Decimal { precision, scale } => {
                write!(f, "decimal({precision},{scale})")
            }
            PrimitiveType::Date => write!(f, "date"),
            PrimitiveType::Time => write!(f, "time"),
            PrimitiveType::Timestamp => write!(f, "timestamp"),
            PrimitiveType::Timestamptz => write!(f, "timestamptz"),
            PrimitiveType::String => write!(f, "string"),
            PrimitiveType::Uuid => write!(f, "uuid"),
            PrimitiveType::Fixed(l) => write!(f, "fixed[{l}]"),
            PrimitiveType::Binary => write!(f, "binary"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(untagged)]
/// A union of all allowed schema types.
pub enum Type {
    /// All the primitive types
    Primitive(PrimitiveType),
    /// A Struct type
    Struct(StructType),
    /// A List type.
    List(List),
    /// A Map type
    Map(Map),
}

impl Type {
    /// True if the type is a struct.
    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }
    /// The primitive type, if this is one.
    pub fn as_primitive(&self) -> Option<&PrimitiveType> {
        match self {
            Type::Primitive(primitive) => Some(primitive),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Primitive(primitive) => write!(f, "{}", primitive),
            Type::Struct(_) => write!(f, "struct"),
            Type::List(_) => write!(f, "list"),
            Type::Map(_) => write!(f, "map"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(tag = "type", rename = "struct")]
/// A struct is a tuple of typed values. Each field in the tuple is
/// named and has an integer id that is unique in the table schema.
/// Each field can be either optional or required, meaning that values can (or cannot) be null.
pub struct StructType {
    /// The fields of the struct.
    pub fields: Vec<StructField>,
}

impl StructType {
    /// Get the field with the given name.
    pub fn field_by_name(&self, name: &str, case_sensitive: bool) -> Option<&StructField> {
        self.fields.iter().find(|field| {
            if case_sensitive {
                field.name == name
            } else {
                field.name.eq_ignore_ascii_case(name)
            }
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
/// A named field within a struct.
pub struct StructField {
    /// Unique Id
    pub id: i32,
    /// Field Name
    pub name: String,
    /// Optional or required, meaning that values can (or can not be null)
    pub required: bool,
    /// Field can have any type
    #[serde(rename = "type")]
    pub field_type: Type,
    /// Fields can have an optional comment or doc string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case", tag = "type", rename = "list")]
/// A schema type that contains repeated elements.
pub struct List {
    /// Unique identifier for the element
    pub element_id: i32,

    /// If the element is mandatory.
    pub element_required: bool,

    /// The type of the element.
    pub element: Box<Type>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case", tag = "type", rename = "map")]
/// A map is a collection of key-value pairs with a key type and a value type.
/// Both the key field and value field each have an integer id that is unique
/// in the table schema. Map keys are required and map values can be either
/// optional or required.
pub struct Map {
    /// Unique key field id
    pub key_id: i32,
    /// Type of the map key
    pub key: Box<Type>,
    /// Unique id for the value field
    pub value_id: i32,
    /// Indicates if the value is required.
    pub value_required: bool,
    /// Type of the value.
    pub value: Box<Type>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// Names and types of fields in a table, together with their stable ids.
pub struct Schema {
    /// Identifier of the schema, assigned when the schema is installed
    /// into table metadata.
    pub schema_id: i32,
    /// Set of primitive fields that identify rows in a table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_field_ids: Option<Vec<i32>>,

    #[serde(flatten)]
    /// The struct fields
    pub struct_fields: StructType,
}

impl Schema {
    /// The root struct of the schema.
    pub fn as_struct(&self) -> &StructType {
        &self.struct_fields
    }

    /// All top-level fields.
    pub fn fields(&self) -> &[StructField] {
        &self.struct_fields.fields
    }

    /// Resolve a dotted path to a field. The path descends structs by
    /// name; a segment naming a list field continues into the element
    /// type, a segment naming a map field continues into the value type.
    /// Map keys are not addressable.
    pub fn find_field(&self, path: &str, case_sensitive: bool) -> Result<&StructField> {
        let mut current = &self.struct_fields;
        let mut segments = path.split('.').peekable();
        loop {
            let segment = segments
                .next()
                .ok_or_else(|| Error::NotFound("field".to_string(), path.to_string()))?;
            let field = current
                .field_by_name(segment, case_sensitive)
                .ok_or_else(|| Error::NotFound("field".to_string(), path.to_string()))?;
            if segments.peek().is_none() {
                return Ok(field);
            }
            current = nested_struct(&field.field_type)
                .ok_or_else(|| Error::NotFound("field".to_string(), path.to_string()))?;
        }
    }

    /// Look up a field anywhere in the tree by its id.
    pub fn field_by_id(&self, field_id: i32) -> Option<&StructField> {
        field_by_id_in_struct(&self.struct_fields, field_id)
    }

    /// The highest field id assigned anywhere in the schema, including
    /// list element and map key/value ids. Fresh ids are allocated above it.
    pub fn highest_field_id(&self) -> i32 {
        self.struct_fields
            .fields
            .iter()
            .map(highest_in_field)
            .max()
            .unwrap_or(0)
    }

    /// Position path of a field for tuple access, descending structs
    /// only. Fields nested inside lists or maps have no flat accessor.
    pub fn accessor_for_field(&self, field_id: i32) -> Option<Vec<usize>> {
        accessor_in_struct(&self.struct_fields, field_id)
    }

    /// Full dotted path for every field id in the schema.
    pub fn index_names(&self) -> HashMap<i32, String> {
        let mut index = HashMap::new();
        index_names_in_struct(&self.struct_fields, None, &mut index);
        index
    }

    /// Dotted path of the parent for every nested field id. Fields
    /// under a list element or map value struct report the list or map
    /// field as their parent.
    pub fn index_parents(&self) -> HashMap<i32, String> {
        let mut index = HashMap::new();
        index_parents_in_struct(&self.struct_fields, None, &mut index);
        index
    }

    /// The dotted names of the identifier fields.
    pub fn identifier_field_names(&self) -> Vec<String> {
        let names = self.index_names();
        self.identifier_field_ids
            .iter()
            .flatten()
            .filter_map(|id| names.get(id).cloned())
            .collect()
    }

    /// Project the schema down to the selected dotted paths by field-id
    /// intersection. Selecting a field keeps its whole subtree; parents
    /// of a selected field are kept to preserve the path to it.
    pub fn select(&self, paths: &[&str], case_sensitive: bool) -> Result<Schema> {
        let mut selected = Vec::with_capacity(paths.len());
        for path in paths {
            selected.push(self.find_field(path, case_sensitive)?.id);
        }
        let fields = prune_struct(&self.struct_fields, &selected)
            .map(|s| s.fields)
            .unwrap_or_default();
        Ok(Schema {
            schema_id: self.schema_id,
            identifier_field_ids: self.identifier_field_ids.clone(),
            struct_fields: StructType { fields },
        })
    }

    /// Check that all field ids in the tree are unique and that the
    /// identifier field ids resolve.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashMap::new();
        validate_struct(&self.struct_fields, &mut seen)?;
        for id in self.identifier_field_ids.iter().flatten() {
            if self.field_by_id(*id).is_none() {
                return Err(Error::Invalid(format!(
                    "identifier field id {id} not found in schema"
                )));
            }
        }
        Ok(())
    }
}

/// The struct a dotted path descends into for a given field type.
/// Lists descend into the element, maps into the value.
pub(crate) fn nested_struct(field_type: &Type) -> Option<&StructType> {
    match field_type {
        Type::Struct(nested) => Some(nested),
        Type::List(list) => nested_struct(&list.element),
        Type::Map(map) => nested_struct(&map.value),
        Type::Primitive(_) => None,
    }
}

fn field_by_id_in_struct(fields: &StructType, field_id: i32) -> Option<&StructField> {
    for field in &fields.fields {
        if field.id == field_id {
            return Some(field);
        }
        if let Some(found) = field_by_id_in_type(&field.field_type, field_id) {
            return Some(found);
        }
    }
    None
}

fn field_by_id_in_type(field_type: &Type, field_id: i32) -> Option<&StructField> {
    match field_type {
        Type::Primitive(_) => None,
        Type::Struct(fields) => field_by_id_in_struct(fields, field_id),
        Type::List(list) => field_by_id_in_type(&list.element, field_id),
        Type::Map(map) => field_by_id_in_type(&map.key, field_id)
            .or_else(|| field_by_id_in_type(&map.value, field_id)),
    }
}

fn highest_in_field(field: &StructField) -> i32 {
    field.id.max(highest_in_type(&field.field_type))
}

fn highest_in_type(field_type: &Type) -> i32 {
    match field_type {
        Type::Primitive(_) => 0,
        Type::Struct(fields) => fields.fields.iter().map(highest_in_field).max().unwrap_or(0),
        Type::List(list) => list.element_id.max(highest_in_type(&list.element)),
        Type::Map(map) => map
            .key_id
            .max(map.value_id)
            .max(highest_in_type(&map.key))
            .max(highest_in_type(&map.value)),
    }
}

fn accessor_in_struct(fields: &StructType, field_id: i32) -> Option<Vec<usize>> {
    for (position, field) in fields.fields.iter().enumerate() {
        if field.id == field_id {
            return Some(vec![position]);
        }
        if let Type::Struct(nested) = &field.field_type {
            if let Some(mut path) = accessor_in_struct(nested, field_id) {
                path.insert(0, position);
                return Some(path);
            }
        }
    }
    None
}

fn index_names_in_struct(
    fields: &StructType,
    prefix: Option<&str>,
    index: &mut HashMap<i32, String>,
) {
    for field in &fields.fields {
        let full_name = match prefix {
            Some(prefix) => format!("{prefix}.{}", field.name),
            None => field.name.clone(),
        };
        if let Some(nested) = nested_struct(&field.field_type) {
            index_names_in_struct(nested, Some(&full_name), index);
        }
        index.insert(field.id, full_name);
    }
}

fn index_parents_in_struct(
    fields: &StructType,
    parent: Option<&str>,
    index: &mut HashMap<i32, String>,
) {
    for field in &fields.fields {
        if let Some(parent) = parent {
            index.insert(field.id, parent.to_string());
        }
        let full_name = match parent {
            Some(parent) => format!("{parent}.{}", field.name),
            None => field.name.clone(),
        };
        if let Some(nested) = nested_struct(&field.field_type) {
            index_parents_in_struct(nested, Some(&full_name), index);
        }
    }
}

fn prune_struct(fields: &StructType, selected: &[i32]) -> Option<StructType> {
    let mut kept = Vec::new();
    for field in &fields.fields {
        if selected.contains(&field.id) {
            kept.push(field.clone());
        } else if let Some(pruned) = prune_type(&field.field_type, selected) {
            kept.push(StructField {
                field_type: pruned,
                ..field.clone()
            });
        }
    }
    if kept.is_empty() {
        None
    } else {
        Some(StructType { fields: kept })
    }
}

fn prune_type(field_type: &Type, selected: &[i32]) -> Option<Type> {
    match field_type {
        Type::Primitive(_) => None,
        Type::Struct(nested) => prune_struct(nested, selected).map(Type::Struct),
        Type::List(list) => prune_type(&list.element, selected).map(|element| {
            Type::List(List {
                element: Box::new(element),
                ..list.clone()
            })
        }),
        Type::Map(map) => prune_type(&map.value, selected).map(|value| {
            Type::Map(Map {
                value: Box::new(value),
                ..map.clone()
            })
        }),
    }
}

fn validate_struct(fields: &StructType, seen: &mut HashMap<i32, String>) -> Result<()> {
    for field in &fields.fields {
        record_id(field.id, &field.name, seen)?;
        validate_type(&field.field_type, seen)?;
    }
    Ok(())
}

fn validate_type(field_type: &Type, seen: &mut HashMap<i32, String>) -> Result<()> {
    match field_type {
        Type::Primitive(_) => Ok(()),
        Type::Struct(fields) => validate_struct(fields, seen),
        Type::List(list) => {
            record_id(list.element_id, "element", seen)?;
            validate_type(&list.element, seen)
        }
        Type::Map(map) => {
            record_id(map.key_id, "key", seen)?;
            record_id(map.value_id, "value", seen)?;
            validate_type(&map.key, seen)?;
            validate_type(&map.value, seen)
        }
    }
}

fn record_id(id: i32, name: &str, seen: &mut HashMap<i32, String>) -> Result<()> {
    if let Some(previous) = seen.insert(id, name.to_string()) {
        return Err(Error::Invalid(format!(
            "field id {id} used by both {previous} and {name}"
        )));
    }
    Ok(())
}

/// Produce a structurally identical type with all ids replaced by fresh
/// ones from the allocator. Used when grafting caller-provided types
/// into a schema. Sibling fields receive their ids before any of their
/// children do.
pub fn assign_fresh_ids(field_type: &Type, next_id: &mut impl FnMut() -> i32) -> Type {
    match field_type {
        Type::Primitive(primitive) => Type::Primitive(primitive.clone()),
        Type::Struct(fields) => {
            let ids: Vec<i32> = fields.fields.iter().map(|_| next_id()).collect();
            Type::Struct(StructType {
                fields: fields
                    .fields
                    .iter()
                    .zip(ids)
                    .map(|(field, id)| StructField {
                        id,
                        name: field.name.clone(),
                        required: field.required,
                        field_type: assign_fresh_ids(&field.field_type, next_id),
                        doc: field.doc.clone(),
                    })
                    .collect(),
            })
        }
        Type::List(list) => {
            let element_id = next_id();
            Type::List(List {
                element_id,
                element_required: list.element_required,
                element: Box::new(assign_fresh_ids(&list.element, next_id)),
            })
        }
        Type::Map(map) => {
            let key_id = next_id();
            let value_id = next_id();
            Type::Map(Map {
                key_id,
                key: Box::new(assign_fresh_ids(&map.key, next_id)),
                value_id,
                value_required: map.value_required,
                value: Box::new(assign_fresh_ids(&map.value, next_id)),
            })
        }
    }
}
