/*!
Typed single values for bounds and partition tuples.

Column bounds in manifests and partition summaries are stored with the
[single-value binary serialization](https://iceberg.apache.org/spec/#binary-single-value-serialization)
of the table format; [Value::try_from_bytes] decodes them against the field
type. A [Struct] is the typed partition tuple a data file was written under.
*/

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::schema::PrimitiveType;

#[derive(Debug, Clone, PartialEq)]
/// A single typed value.
pub enum Value {
    /// True or false
    Boolean(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// Days since 1970-01-01
    Date(i32),
    /// Microseconds since midnight
    Time(i64),
    /// Microseconds since 1970-01-01 00:00:00
    Timestamp(i64),
    /// Microseconds since 1970-01-01 00:00:00 UTC
    Timestamptz(i64),
    /// UTF-8 characters
    String(String),
    /// 128-bit UUID
    Uuid(Uuid),
    /// Fixed length byte array
    Fixed(Vec<u8>),
    /// Arbitrary length byte array
    Binary(Vec<u8>),
    /// Fixed point decimal as an unscaled integer
    Decimal {
        /// The unscaled value
        unscaled: i128,
        /// Digits to the right of the decimal point
        scale: u8,
    },
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Long(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::Date(value) => write!(f, "date({value})"),
            Value::Time(value) => write!(f, "time({value})"),
            Value::Timestamp(value) => write!(f, "timestamp({value})"),
            Value::Timestamptz(value) => write!(f, "timestamptz({value})"),
            Value::String(value) => write!(f, "\"{value}\""),
            Value::Uuid(value) => write!(f, "{value}"),
            Value::Fixed(value) => write!(f, "{value:?}"),
            Value::Binary(value) => write!(f, "{value:?}"),
            Value::Decimal { unscaled, scale } => write!(f, "decimal({unscaled}e-{scale})"),
        }
    }
}

impl Value {
    /// Decode a value from its binary single-value serialization.
    pub fn try_from_bytes(bytes: &[u8], field_type: &PrimitiveType) -> Result<Value> {
        match field_type {
            PrimitiveType::Boolean => Ok(Value::Boolean(bytes.first().is_some_and(|b| *b != 0))),
            PrimitiveType::Int => Ok(Value::Int(i32::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Long => Ok(Value::Long(i64::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Float => Ok(Value::Float(f32::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Double => Ok(Value::Double(f64::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Date => Ok(Value::Date(i32::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Time => Ok(Value::Time(i64::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Timestamp => Ok(Value::Timestamp(i64::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Timestamptz => {
                Ok(Value::Timestamptz(i64::from_le_bytes(bytes.try_into()?)))
            }
            PrimitiveType::String => Ok(Value::String(String::from_utf8(bytes.to_vec())?)),
            PrimitiveType::Uuid => Ok(Value::Uuid(Uuid::from_bytes(bytes.try_into().map_err(
                |_| Error::Invalid(format!("uuid value of {} bytes", bytes.len())),
            )?))),
            PrimitiveType::Fixed(_) => Ok(Value::Fixed(bytes.to_vec())),
            PrimitiveType::Binary => Ok(Value::Binary(bytes.to_vec())),
            PrimitiveType::Decimal { scale, .. } => {
                if bytes.len() > 16 {
                    return Err(Error::Invalid(format!(
                        "decimal value of {} bytes",
                        bytes.len()
                    )));
                }
                // big-endian two's complement, sign extended to 128 bits
                let mut buffer = if bytes.first().is_some_and(|b| *b & 0x80 != 0) {
                    [0xffu8; 16]
                } else {
                    [0u8; 16]
                };
                buffer[16 - bytes.len()..].copy_from_slice(bytes);
                Ok(Value::Decimal {
                    unscaled: i128::from_be_bytes(buffer),
                    scale: *scale,
                })
            }
        }
    }

    /// Encode a value to its binary single-value serialization.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::Boolean(value) => vec![u8::from(*value)],
            Value::Int(value) | Value::Date(value) => value.to_le_bytes().to_vec(),
            Value::Long(value)
            | Value::Time(value)
            | Value::Timestamp(value)
            | Value::Timestamptz(value) => value.to_le_bytes().to_vec(),
            Value::Float(value) => value.to_le_bytes().to_vec(),
            Value::Double(value) => value.to_le_bytes().to_vec(),
            Value::String(value) => value.as_bytes().to_vec(),
            Value::Uuid(value) => value.as_bytes().to_vec(),
            Value::Fixed(value) | Value::Binary(value) => value.clone(),
            Value::Decimal { unscaled, .. } => {
                // minimal big-endian two's complement, keeping the sign bit
                let bytes = unscaled.to_be_bytes();
                let (filler, sign_bit) = if *unscaled < 0 { (0xff, 0x80) } else { (0, 0) };
                let mut skip = 0;
                while skip < 15
                    && bytes[skip] == filler
                    && bytes[skip + 1] & 0x80 == sign_bit
                {
                    skip += 1;
                }
                bytes[skip..].to_vec()
            }
        }
    }

    /// Convert a parsed literal to the type of the field it is compared
    /// against. Fails when the conversion would lose information.
    pub fn to_type(&self, field_type: &PrimitiveType) -> Result<Value> {
        let error = || {
            Error::Invalid(format!(
                "literal {self} cannot be compared to a {field_type} column"
            ))
        };
        match (self, field_type) {
            (Value::Boolean(value), PrimitiveType::Boolean) => Ok(Value::Boolean(*value)),
            (Value::Long(value), PrimitiveType::Int) => Ok(Value::Int(
                i32::try_from(*value).map_err(|_| error())?,
            )),
            (Value::Long(value), PrimitiveType::Long) => Ok(Value::Long(*value)),
            (Value::Int(value), PrimitiveType::Int) => Ok(Value::Int(*value)),
            (Value::Int(value), PrimitiveType::Long) => Ok(Value::Long(i64::from(*value))),
            (Value::Long(value), PrimitiveType::Float) => Ok(Value::Float(*value as f32)),
            (Value::Long(value), PrimitiveType::Double) => Ok(Value::Double(*value as f64)),
            (Value::Long(value), PrimitiveType::Time) => Ok(Value::Time(*value)),
            (Value::Long(value), PrimitiveType::Timestamp) => Ok(Value::Timestamp(*value)),
            (Value::Long(value), PrimitiveType::Timestamptz) => Ok(Value::Timestamptz(*value)),
            (Value::Long(value), PrimitiveType::Date) => Ok(Value::Date(
                i32::try_from(*value).map_err(|_| error())?,
            )),
            (Value::Long(value), PrimitiveType::Decimal { scale, .. }) => Ok(Value::Decimal {
                unscaled: i128::from(*value) * 10i128.pow(u32::from(*scale)),
                scale: *scale,
            }),
            (Value::Double(value), PrimitiveType::Float) => Ok(Value::Float(*value as f32)),
            (Value::Double(value), PrimitiveType::Double) => Ok(Value::Double(*value)),
            (Value::Float(value), PrimitiveType::Float) => Ok(Value::Float(*value)),
            (Value::Float(value), PrimitiveType::Double) => Ok(Value::Double(f64::from(*value))),
            (Value::String(value), PrimitiveType::String) => Ok(Value::String(value.clone())),
            (Value::String(value), PrimitiveType::Uuid) => Ok(Value::Uuid(
                Uuid::parse_str(value).map_err(|_| error())?,
            )),
            (Value::String(value), PrimitiveType::Date) => {
                let date = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")?;
                Ok(Value::Date(days_since_epoch(date)))
            }
            (Value::String(value), PrimitiveType::Timestamp) => {
                let datetime =
                    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")?;
                Ok(Value::Timestamp(datetime.and_utc().timestamp_micros()))
            }
            (Value::String(value), PrimitiveType::Timestamptz) => {
                let datetime =
                    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")?;
                Ok(Value::Timestamptz(datetime.and_utc().timestamp_micros()))
            }
            (Value::String(value), PrimitiveType::Binary) => {
                Ok(Value::Binary(value.as_bytes().to_vec()))
            }
            (Value::Date(value), PrimitiveType::Date) => Ok(Value::Date(*value)),
            (Value::Time(value), PrimitiveType::Time) => Ok(Value::Time(*value)),
            (Value::Timestamp(value), PrimitiveType::Timestamp) => Ok(Value::Timestamp(*value)),
            (Value::Timestamptz(value), PrimitiveType::Timestamptz) => {
                Ok(Value::Timestamptz(*value))
            }
            (Value::Binary(value), PrimitiveType::Binary) => Ok(Value::Binary(value.clone())),
            (Value::Fixed(value), PrimitiveType::Fixed(_)) => Ok(Value::Fixed(value.clone())),
            (Value::Uuid(value), PrimitiveType::Uuid) => Ok(Value::Uuid(*value)),
            (
                Value::Decimal { unscaled, scale },
                PrimitiveType::Decimal {
                    scale: target_scale,
                    ..
                },
            ) if scale == target_scale => Ok(Value::Decimal {
                unscaled: *unscaled,
                scale: *scale,
            }),
            _ => Err(error()),
        }
    }

    /// True for a floating point NaN.
    pub fn is_nan(&self) -> bool {
        match self {
            Value::Float(value) => value.is_nan(),
            Value::Double(value) => value.is_nan(),
            _ => false,
        }
    }

    /// Ordered comparison, promoting between representations of the
    /// same logical family (int/long/date/time/timestamp, float/double).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => a.partial_cmp(b),
            (Value::Fixed(a), Value::Fixed(b)) | (Value::Binary(a), Value::Binary(b)) => {
                a.partial_cmp(b)
            }
            (
                Value::Decimal { unscaled: a, scale: sa },
                Value::Decimal { unscaled: b, scale: sb },
            ) if sa == sb => a.partial_cmp(b),
            (a, b) => match (a.as_long(), b.as_long()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => match (a.as_double(), b.as_double()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
            },
        }
    }

    fn as_long(&self) -> Option<i64> {
        match self {
            Value::Int(value) | Value::Date(value) => Some(i64::from(*value)),
            Value::Long(value)
            | Value::Time(value)
            | Value::Timestamp(value)
            | Value::Timestamptz(value) => Some(*value),
            _ => None,
        }
    }

    fn as_double(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(f64::from(*value)),
            Value::Double(value) => Some(*value),
            _ => None,
        }
    }
}

/// Days from the unix epoch to the given date.
pub(crate) fn days_since_epoch(date: chrono::NaiveDate) -> i32 {
    let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    i32::try_from((date - epoch).num_days()).unwrap_or(i32::MAX)
}

/// Self-describing deserialization used for partition tuples read from
/// Avro, where the writer schema determines the physical type.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a primitive partition value")
            }

            fn visit_bool<E>(self, v: bool) -> std::result::Result<Value, E> {
                Ok(Value::Boolean(v))
            }
            fn visit_i32<E>(self, v: i32) -> std::result::Result<Value, E> {
                Ok(Value::Int(v))
            }
            fn visit_i64<E>(self, v: i64) -> std::result::Result<Value, E> {
                Ok(Value::Long(v))
            }
            fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<Value, E> {
                i64::try_from(v)
                    .map(Value::Long)
                    .map_err(|_| E::custom("integer out of range"))
            }
            fn visit_f32<E>(self, v: f32) -> std::result::Result<Value, E> {
                Ok(Value::Float(v))
            }
            fn visit_f64<E>(self, v: f64) -> std::result::Result<Value, E> {
                Ok(Value::Double(v))
            }
            fn visit_str<E>(self, v: &str) -> std::result::Result<Value, E> {
                Ok(Value::String(v.to_string()))
            }
            fn visit_bytes<E>(self, v: &[u8]) -> std::result::Result<Value, E> {
                Ok(Value::Binary(v.to_vec()))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Int(value) | Value::Date(value) => serializer.serialize_i32(*value),
            Value::Long(value)
            | Value::Time(value)
            | Value::Timestamp(value)
            | Value::Timestamptz(value) => serializer.serialize_i64(*value),
            Value::Float(value) => serializer.serialize_f32(*value),
            Value::Double(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Uuid(value) => serializer.serialize_bytes(value.as_bytes()),
            Value::Fixed(value) | Value::Binary(value) => serializer.serialize_bytes(value),
            Value::Decimal { .. } => serializer.serialize_bytes(&self.to_bytes()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
/// The typed partition tuple of a data file, addressable by position
/// and by partition field name.
pub struct Struct {
    fields: Vec<Option<Value>>,
    lookup: HashMap<String, usize>,
}

impl Struct {
    /// Value at the given position.
    pub fn get(&self, position: usize) -> Option<&Option<Value>> {
        self.fields.get(position)
    }

    /// Value for the given partition field name.
    pub fn get_by_name(&self, name: &str) -> Option<&Option<Value>> {
        self.lookup.get(name).and_then(|pos| self.fields.get(*pos))
    }

    /// Number of partition fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the tuple has no partition fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position-wise total order over partition tuples, used to give
    /// scan output a stable order. Nulls sort before values; values of
    /// incomparable types tie.
    pub fn compare(&self, other: &Struct) -> Ordering {
        for (left, right) in self.fields.iter().zip(&other.fields) {
            let ordering = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(left), Some(right)) => {
                    left.compare(right).unwrap_or(Ordering::Equal)
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.fields.len().cmp(&other.fields.len())
    }
}

impl FromIterator<(String, Option<Value>)> for Struct {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        let mut fields = Vec::new();
        let mut lookup = HashMap::new();
        for (name, value) in iter {
            lookup.insert(name, fields.len());
            fields.push(value);
        }
        Struct { fields, lookup }
    }
}

impl Serialize for Struct {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut names: Vec<&String> = self.lookup.keys().collect();
        names.sort_by_key(|name| self.lookup[*name]);
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for name in names {
            map.serialize_entry(name, &self.fields[self.lookup[name]])?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Struct {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StructVisitor;

        impl<'de> Visitor<'de> for StructVisitor {
            type Value = Struct;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a partition tuple record")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Struct, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((name, value)) =
                    access.next_entry::<String, Option<Value>>()?
                {
                    entries.push((name, value));
                }
                Ok(entries.into_iter().collect())
            }
        }

        deserializer.deserialize_map(StructVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_round_trip() {
        let cases = vec![
            (Value::Boolean(true), PrimitiveType::Boolean),
            (Value::Int(93), PrimitiveType::Int),
            (Value::Long(-17), PrimitiveType::Long),
            (Value::Float(3.5), PrimitiveType::Float),
            (Value::Double(-0.25), PrimitiveType::Double),
            (Value::Date(19345), PrimitiveType::Date),
            (Value::Timestamp(1_672_531_200_000_000), PrimitiveType::Timestamp),
            (
                Value::String("a/1.parquet".to_string()),
                PrimitiveType::String,
            ),
            (Value::Binary(vec![1, 2, 3]), PrimitiveType::Binary),
            (
                Value::Decimal {
                    unscaled: -12345,
                    scale: 2,
                },
                PrimitiveType::Decimal {
                    precision: 9,
                    scale: 2,
                },
            ),
        ];
        for (value, field_type) in cases {
            let bytes = value.to_bytes();
            assert_eq!(Value::try_from_bytes(&bytes, &field_type).unwrap(), value);
        }
    }

    #[test]
    fn test_compare_promotes_within_family() {
        assert_eq!(
            Value::Int(4).compare(&Value::Long(5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Date(10).compare(&Value::Int(10)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Float(2.5).compare(&Value::Double(2.0)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int(1).compare(&Value::String("x".to_string())), None);
    }

    #[test]
    fn test_literal_conversion() {
        assert_eq!(
            Value::Long(4).to_type(&PrimitiveType::Int).unwrap(),
            Value::Int(4)
        );
        assert!(Value::Long(i64::MAX).to_type(&PrimitiveType::Int).is_err());
        assert_eq!(
            Value::String("2023-01-01".to_string())
                .to_type(&PrimitiveType::Date)
                .unwrap(),
            Value::Date(19358)
        );
        assert!(Value::String("x".to_string())
            .to_type(&PrimitiveType::Long)
            .is_err());
    }

    #[test]
    fn test_struct_lookup() {
        let tuple: Struct = vec![
            ("ts_day".to_string(), Some(Value::Int(12))),
            ("region".to_string(), None),
        ]
        .into_iter()
        .collect();
        assert_eq!(tuple.get(0), Some(&Some(Value::Int(12))));
        assert_eq!(tuple.get_by_name("region"), Some(&None));
        assert_eq!(tuple.get_by_name("missing"), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_long_bytes_round_trip(value in any::<i64>()) {
                let encoded = Value::Long(value).to_bytes();
                prop_assert_eq!(
                    Value::try_from_bytes(&encoded, &PrimitiveType::Long).unwrap(),
                    Value::Long(value)
                );
            }

            #[test]
            fn test_decimal_bytes_round_trip(unscaled in any::<i64>()) {
                let value = Value::Decimal { unscaled: i128::from(unscaled), scale: 2 };
                let encoded = value.to_bytes();
                prop_assert!(encoded.len() <= 16);
                prop_assert_eq!(
                    Value::try_from_bytes(
                        &encoded,
                        &PrimitiveType::Decimal { precision: 38, scale: 2 }
                    )
                    .unwrap(),
                    value
                );
            }
        }
    }

    #[test]
    fn test_struct_compare_is_positional() {
        let tuple = |value: Option<i32>| -> Struct {
            vec![("ts_day".to_string(), value.map(Value::Int))]
                .into_iter()
                .collect()
        };
        assert_eq!(tuple(Some(1)).compare(&tuple(Some(2))), Ordering::Less);
        assert_eq!(tuple(Some(2)).compare(&tuple(Some(2))), Ordering::Equal);
        // nulls sort first
        assert_eq!(tuple(None).compare(&tuple(Some(0))), Ordering::Less);
        // a longer tuple with an equal prefix sorts after
        assert_eq!(Struct::default().compare(&tuple(Some(1))), Ordering::Less);
    }

    #[test]
    fn test_struct_deserialize() {
        let tuple: Struct =
            serde_json::from_str(r#"{"ts_day": 12, "name": "a", "empty": null}"#).unwrap();
        assert_eq!(tuple.len(), 3);
        assert_eq!(tuple.get_by_name("ts_day"), Some(&Some(Value::Long(12))));
        assert_eq!(
            tuple.get_by_name("name"),
            Some(&Some(Value::String("a".to_string())))
        );
        assert_eq!(tuple.get_by_name("empty"), Some(&None));
    }
}
