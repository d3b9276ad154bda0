/*!
Definition of [sort orders](https://iceberg.apache.org/spec/#sorting) for a table.

A [SortOrder] is composed of a list of [SortField] where each field has a
[Transform], [SortDirection] and [NullOrder].
*/
use crate::model::partition::Transform;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
/// Defines the sort order for a field.
pub enum SortDirection {
    /// Sort the field ascending.
    #[serde(rename = "asc")]
    Ascending,
    /// Sort the field descending.
    #[serde(rename = "desc")]
    Descending,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
/// Defines the order of nulls in a sorted field.
pub enum NullOrder {
    #[serde(rename = "nulls-first")]
    /// Nulls sort before all other values.
    First,
    #[serde(rename = "nulls-last")]
    /// Nulls sort after all other values.
    Last,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// How a single field takes part in a sort.
pub struct SortField {
    /// A source column id from the table's schema
    pub source_id: i32,
    /// The transform producing the values to sort on.
    pub transform: Transform,
    /// Ascending or descending.
    pub direction: SortDirection,
    /// Where nulls are placed.
    pub null_order: NullOrder,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// A sort order is an id and a list of sort fields. The order of the
/// fields defines the order the sort is applied to the data.
pub struct SortOrder {
    /// Identifier for the order; `0` is the unsorted order.
    pub order_id: i64,
    /// Details of the sort
    pub fields: Vec<SortField>,
}

impl SortOrder {
    /// The unsorted order with id 0.
    pub fn unsorted() -> Self {
        SortOrder {
            order_id: 0,
            fields: vec![],
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_sort_field() {
        let data = r#"
            {
               "transform": "bucket[4]",
               "source-id": 3,
               "direction": "desc",
               "null-order": "nulls-last"
            }
        "#;

        let field: SortField = serde_json::from_str(data).unwrap();
        assert_eq!(3, field.source_id);
        assert_eq!(Transform::Bucket(4), field.transform);
        assert_eq!(SortDirection::Descending, field.direction);
        assert_eq!(NullOrder::Last, field.null_order);
    }

    #[test]
    fn test_sort_order() {
        let data = r#"
            {
                "order-id" : 1,
                "fields": [
                    {
                        "transform": "identity",
                        "source-id": 3,
                        "direction": "asc",
                        "null-order": "nulls-first"
                    }]
            }
        "#;

        let order: SortOrder = serde_json::from_str(data).unwrap();
        assert_eq!(1, order.order_id);
        assert_eq!(1, order.fields.len());
    }
}
