/*!
 Partition specs define how partition values are derived from the
source fields of a row.
*/
use lazy_static::lazy_static;
use regex::Regex;
use serde::{
    de::{self, IntoDeserializer},
    Deserialize, Deserializer, Serialize,
};

use crate::error::{Error, Result};
use crate::model::schema::{PrimitiveType, Schema, StructField, StructType, Type};
use crate::model::values::{days_since_epoch, Value};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "lowercase", remote = "Self")]
/// A Transformation applied to each source column to produce a partition value.
pub enum Transform {
    /// Always produces `null`
    Void,
    /// Source value, unmodified
    Identity,
    /// Extract a date or timestamp year as years from 1970
    Year,
    /// Extract a date or timestamp month as months from 1970-01-01
    Month,
    /// Extract a date or timestamp day as days from 1970-01-01
    Day,
    /// Extract a timestamp hour as hours from 1970-01-01 00:00:00
    Hour,
    /// Hash of value, mod N
    Bucket(u32),
    /// Value truncated to width
    Truncate(u32),
}

impl<'de> Deserialize<'de> for Transform {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.starts_with("bucket") {
            deserialize_bucket(s.into_deserializer())
        } else if s.starts_with("truncate") {
            deserialize_truncate(s.into_deserializer())
        } else {
            Transform::deserialize(s.into_deserializer())
        }
    }
}

impl Serialize for Transform {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use Transform::*;
        match self {
            Bucket(mod_n) => serializer.serialize_str(&format!("bucket[{mod_n}]")),
            Truncate(width) => serializer.serialize_str(&format!("truncate[{width}]")),
            _ => Transform::serialize(self, serializer),
        }
    }
}

fn deserialize_bucket<'de, D>(deserializer: D) -> std::result::Result<Transform, D::Error>
where
    D: Deserializer<'de>,
{
    let this = String::deserialize(deserializer)?;
    lazy_static! {
        static ref RE: Regex = Regex::new(r#"^bucket\[(?P<n>\d+)\]$"#).unwrap();
    }
    let err_msg = format!("Invalid bucket format {}", this);

    let caps = RE
        .captures(&this)
        .ok_or_else(|| de::Error::custom(&err_msg))?;
    let bucket: u32 = caps
        .name("n")
        .ok_or_else(|| de::Error::custom(&err_msg))
        .and_then(|p| {
            p.as_str()
                .parse()
                .map_err(|_| de::Error::custom("bucket not u32"))
        })?;
    Ok(Transform::Bucket(bucket))
}

fn deserialize_truncate<'de, D>(deserializer: D) -> std::result::Result<Transform, D::Error>
where
    D: Deserializer<'de>,
{
    let this = String::deserialize(deserializer)?;
    lazy_static! {
        static ref RE: Regex = Regex::new(r#"^truncate\[(?P<w>\d+)\]$"#).unwrap();
    }
    let err_msg = format!("Invalid truncate format {}", this);

    let caps = RE
        .captures(&this)
        .ok_or_else(|| de::Error::custom(&err_msg))?;
    let width: u32 = caps
        .name("w")
        .ok_or_else(|| de::Error::custom(&err_msg))
        .and_then(|p| {
            p.as_str()
                .parse()
                .map_err(|_| de::Error::custom("width not u32"))
        })?;
    Ok(Transform::Truncate(width))
}

impl Transform {
    /// The type a partition value of this transform has for the given
    /// source type.
    pub fn result_type(&self, source_type: &PrimitiveType) -> PrimitiveType {
        match self {
            Transform::Identity | Transform::Void | Transform::Truncate(_) => source_type.clone(),
            Transform::Bucket(_) => PrimitiveType::Int,
            Transform::Year | Transform::Month | Transform::Day => PrimitiveType::Int,
            Transform::Hour => PrimitiveType::Int,
        }
    }

    /// Apply the transform to a source value. Returns `None` when the
    /// transform cannot be computed here (bucket hashing); callers must
    /// then stay conservative.
    pub fn apply(&self, value: &Value) -> Result<Option<Value>> {
        let unsupported = || {
            Error::Invalid(format!(
                "transform {self:?} is not defined for value {value}"
            ))
        };
        match self {
            Transform::Void => Ok(None),
            Transform::Bucket(_) => Ok(None),
            Transform::Identity => Ok(Some(value.clone())),
            Transform::Truncate(width) => {
                let width = i64::from(*width);
                match value {
                    Value::Int(v) => Ok(Some(Value::Int(
                        v - (i64::from(*v).rem_euclid(width)) as i32,
                    ))),
                    Value::Long(v) => Ok(Some(Value::Long(v - v.rem_euclid(width)))),
                    Value::String(v) => Ok(Some(Value::String(
                        v.chars().take(width as usize).collect(),
                    ))),
                    Value::Decimal { unscaled, scale } => Ok(Some(Value::Decimal {
                        unscaled: unscaled - unscaled.rem_euclid(i128::from(width)),
                        scale: *scale,
                    })),
                    _ => Err(unsupported()),
                }
            }
            Transform::Year | Transform::Month | Transform::Day | Transform::Hour => {
                let date = match value {
                    Value::Date(days) => chrono::DateTime::from_timestamp(
                        i64::from(*days) * 24 * 60 * 60,
                        0,
                    )
                    .ok_or_else(unsupported)?
                    .naive_utc(),
                    Value::Timestamp(micros) | Value::Timestamptz(micros) => {
                        chrono::DateTime::from_timestamp_micros(*micros)
                            .ok_or_else(unsupported)?
                            .naive_utc()
                    }
                    _ => return Err(unsupported()),
                };
                use chrono::{Datelike, Timelike};
                let result = match self {
                    Transform::Year => date.year() - 1970,
                    Transform::Month => (date.year() - 1970) * 12 + date.month0() as i32,
                    Transform::Day => days_since_epoch(date.date()),
                    Transform::Hour => {
                        days_since_epoch(date.date()) * 24 + date.hour() as i32
                    }
                    _ => unreachable!(),
                };
                Ok(Some(Value::Int(result)))
            }
        }
    }

    /// True when ordered range predicates survive the transform
    /// unchanged, i.e. the transform is the identity.
    pub fn preserves_order(&self) -> bool {
        matches!(self, Transform::Identity)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// A single field of a partition spec.
pub struct PartitionField {
    /// A source column id from the table's schema
    pub source_id: i32,
    /// A partition field id that is unique within a partition spec. In
    /// v2 table metadata it is unique across all partition specs.
    pub field_id: i32,
    /// A partition name.
    pub name: String,
    /// A transform that is applied to the source column to produce a partition value.
    pub transform: Transform,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// A definition of how partition values are derived from data fields.
/// Specs are addressed by `spec_id` and never mutated; every data file
/// records the spec it was written under.
pub struct PartitionSpec {
    /// Identifier for the specification
    pub spec_id: i32,
    /// Fields for the specification
    pub fields: Vec<PartitionField>,
}

impl PartitionSpec {
    /// The struct type of partition tuples written under this spec,
    /// resolved against the given schema.
    pub fn partition_type(&self, schema: &Schema) -> Result<StructType> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for partition_field in &self.fields {
            let source = schema
                .field_by_id(partition_field.source_id)
                .ok_or_else(|| {
                    Error::NotFound(
                        "partition source field".to_string(),
                        partition_field.source_id.to_string(),
                    )
                })?;
            let source_type = source.field_type.as_primitive().ok_or_else(|| {
                Error::Invalid(format!(
                    "partition source {} is not a primitive column",
                    source.name
                ))
            })?;
            fields.push(StructField {
                id: partition_field.field_id,
                name: partition_field.name.clone(),
                required: false,
                field_type: Type::Primitive(
                    partition_field.transform.result_type(source_type),
                ),
                doc: None,
            });
        }
        Ok(StructType { fields })
    }

    /// The partition fields deriving from the given source column.
    pub fn fields_by_source_id(&self, source_id: i32) -> Vec<&PartitionField> {
        self.fields
            .iter()
            .filter(|field| field.source_id == source_id)
            .collect()
    }
}
