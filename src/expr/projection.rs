/*!
Inclusive projection of a row predicate through a partition spec.

The result is a predicate over partition values that is conservative: it may
only widen the matching set, never narrow it. Rows matching the original
predicate always live in partitions matching the projection.
*/

use crate::error::Result;
use crate::expr::{BoundExpr, BoundPredicate, Expr, Operator, Predicate};
use crate::model::partition::{PartitionField, PartitionSpec, Transform};
use crate::model::values::Value;

/// Project a bound row predicate through a partition spec, producing an
/// unbound predicate over the names of the spec's partition fields.
pub fn inclusive_projection(spec: &PartitionSpec, expr: &BoundExpr) -> Result<Expr> {
    Ok(match expr {
        BoundExpr::AlwaysTrue => Expr::AlwaysTrue,
        BoundExpr::AlwaysFalse => Expr::AlwaysFalse,
        BoundExpr::And(left, right) => inclusive_projection(spec, left)?
            .and(inclusive_projection(spec, right)?),
        BoundExpr::Or(left, right) => inclusive_projection(spec, left)?
            .or(inclusive_projection(spec, right)?),
        BoundExpr::Predicate(predicate) => {
            let mut projected = Expr::AlwaysTrue;
            for partition_field in spec.fields_by_source_id(predicate.field.id) {
                if let Some(part) = project_predicate(partition_field, predicate)? {
                    projected = match projected {
                        Expr::AlwaysTrue => part,
                        other => other.and(part),
                    };
                }
            }
            projected
        }
    })
}

/// Project one predicate through one partition field. `None` means the
/// transform gives this field no information about the predicate.
fn project_predicate(
    partition_field: &PartitionField,
    predicate: &BoundPredicate,
) -> Result<Option<Expr>> {
    let transform = &partition_field.transform;

    // a void transform erases the source entirely
    if matches!(transform, Transform::Void) {
        return Ok(None);
    }

    // every other transform maps null to null and only null to null
    if matches!(predicate.op, Operator::IsNull | Operator::NotNull) {
        return Ok(Some(Expr::Predicate(Predicate {
            term: partition_field.name.clone(),
            op: predicate.op,
            literals: vec![],
        })));
    }

    if transform.preserves_order() {
        // identity carries every comparison through unchanged
        return Ok(Some(Expr::Predicate(Predicate {
            term: partition_field.name.clone(),
            op: predicate.op,
            literals: predicate.literals.clone(),
        })));
    }

    match predicate.op {
        Operator::Eq => match apply_to_literal(transform, &predicate.literals[0])? {
            Some(value) => Ok(Some(Expr::Predicate(Predicate {
                term: partition_field.name.clone(),
                op: Operator::Eq,
                literals: vec![value],
            }))),
            None => Ok(None),
        },
        Operator::In => {
            let mut transformed = Vec::with_capacity(predicate.literals.len());
            for literal in &predicate.literals {
                match apply_to_literal(transform, literal)? {
                    Some(value) => transformed.push(value),
                    // one untransformable literal loses the whole set
                    None => return Ok(None),
                }
            }
            Ok(Some(Expr::Predicate(Predicate {
                term: partition_field.name.clone(),
                op: Operator::In,
                literals: transformed,
            })))
        }
        // ranges, inequalities and NaN checks do not survive a lossy
        // transform; stay conservative
        _ => Ok(None),
    }
}

fn apply_to_literal(transform: &Transform, literal: &Value) -> Result<Option<Value>> {
    transform.apply(literal)
}
