/*!
Evaluators that decide whether a file, a manifest, or a partition tuple can
contain rows matching a predicate.

[InclusiveMetricsEvaluator] and [ManifestEvaluator] are inclusive: they answer
"may match" and never produce a false negative. [PartitionEvaluator] is exact,
because a partition tuple is a concrete value, not a range.
*/

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::expr::{BoundExpr, BoundPredicate, Expr, Operator};
use crate::model::manifest::DataFile;
use crate::model::manifest_list::{FieldSummary, ManifestFile};
use crate::model::schema::{PrimitiveType, Schema};
use crate::model::values::{Struct, Value};

/// Decides from per-file column metrics whether a data file may contain
/// rows matching a row predicate.
#[derive(Debug, Clone)]
pub struct InclusiveMetricsEvaluator {
    expr: BoundExpr,
    include_empty_files: bool,
}

impl InclusiveMetricsEvaluator {
    /// Bind the row predicate against the table schema.
    pub fn new(
        schema: &Schema,
        row_filter: &Expr,
        case_sensitive: bool,
        include_empty_files: bool,
    ) -> Result<Self> {
        Ok(InclusiveMetricsEvaluator {
            expr: row_filter.bind(schema, case_sensitive)?,
            include_empty_files,
        })
    }

    /// Evaluate an already bound predicate.
    pub fn from_bound(expr: BoundExpr, include_empty_files: bool) -> Self {
        InclusiveMetricsEvaluator {
            expr,
            include_empty_files,
        }
    }

    /// True when the file may contain matching rows.
    pub fn eval(&self, file: &DataFile) -> Result<bool> {
        if !self.include_empty_files && file.record_count == 0 {
            return Ok(false);
        }
        self.eval_expr(&self.expr, file)
    }

    fn eval_expr(&self, expr: &BoundExpr, file: &DataFile) -> Result<bool> {
        match expr {
            BoundExpr::AlwaysTrue => Ok(true),
            BoundExpr::AlwaysFalse => Ok(false),
            BoundExpr::And(left, right) => {
                Ok(self.eval_expr(left, file)? && self.eval_expr(right, file)?)
            }
            BoundExpr::Or(left, right) => {
                Ok(self.eval_expr(left, file)? || self.eval_expr(right, file)?)
            }
            BoundExpr::Predicate(predicate) => self.eval_predicate(predicate, file),
        }
    }

    fn eval_predicate(&self, predicate: &BoundPredicate, file: &DataFile) -> Result<bool> {
        let field_id = predicate.field.id;
        let Some(primitive) = predicate.primitive_type() else {
            // no metrics for non-primitive columns
            return Ok(true);
        };

        let null_count = file.null_count(field_id);
        let value_count = file.value_count(field_id);
        let nan_count = file.nan_count(field_id);
        let nulls_only = matches!((null_count, value_count), (Some(n), Some(v)) if n == v);

        match predicate.op {
            Operator::IsNull => Ok(null_count.map_or(true, |count| count > 0)),
            Operator::NotNull => Ok(!nulls_only),
            Operator::IsNan => Ok(nan_count.map_or(true, |count| count > 0)),
            Operator::NotNan => {
                let nans_only =
                    matches!((nan_count, value_count), (Some(n), Some(v)) if n == v);
                Ok(!nans_only)
            }
            // an inclusive evaluator cannot exclude files for negated equality
            Operator::NotEq | Operator::NotIn => Ok(true),
            Operator::Eq | Operator::Lt | Operator::LtEq | Operator::Gt | Operator::GtEq => {
                if nulls_only {
                    return Ok(false);
                }
                let literal = &predicate.literals[0];
                let lower = decode_bound(file.lower_bound(field_id), primitive)?;
                let upper = decode_bound(file.upper_bound(field_id), primitive)?;
                Ok(range_may_contain(
                    predicate.op,
                    literal,
                    lower.as_ref(),
                    upper.as_ref(),
                ))
            }
            Operator::In => {
                if nulls_only {
                    return Ok(false);
                }
                let lower = decode_bound(file.lower_bound(field_id), primitive)?;
                let upper = decode_bound(file.upper_bound(field_id), primitive)?;
                Ok(predicate.literals.iter().any(|literal| {
                    range_may_contain(Operator::Eq, literal, lower.as_ref(), upper.as_ref())
                }))
            }
        }
    }
}

/// May the range `[lower, upper]` contain a value satisfying
/// `x <op> literal`? Missing bounds never exclude.
fn range_may_contain(
    op: Operator,
    literal: &Value,
    lower: Option<&Value>,
    upper: Option<&Value>,
) -> bool {
    match op {
        Operator::Eq => {
            if let Some(lower) = lower {
                if literal.compare(lower) == Some(Ordering::Less) {
                    return false;
                }
            }
            if let Some(upper) = upper {
                if literal.compare(upper) == Some(Ordering::Greater) {
                    return false;
                }
            }
            true
        }
        // exists x < literal  <=>  lower < literal
        Operator::Lt => lower.map_or(true, |lower| {
            lower.compare(literal) == Some(Ordering::Less)
        }),
        Operator::LtEq => lower.map_or(true, |lower| {
            matches!(
                lower.compare(literal),
                Some(Ordering::Less) | Some(Ordering::Equal)
            )
        }),
        // exists x > literal  <=>  upper > literal
        Operator::Gt => upper.map_or(true, |upper| {
            upper.compare(literal) == Some(Ordering::Greater)
        }),
        Operator::GtEq => upper.map_or(true, |upper| {
            matches!(
                upper.compare(literal),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            )
        }),
        _ => true,
    }
}

fn decode_bound(bytes: Option<&[u8]>, primitive: &PrimitiveType) -> Result<Option<Value>> {
    bytes
        .map(|bytes| Value::try_from_bytes(bytes, primitive))
        .transpose()
}

/// Decides from manifest-level partition summaries whether a manifest
/// may contain matching files. The predicate must be bound against the
/// spec's partition schema.
#[derive(Debug, Clone)]
pub struct ManifestEvaluator {
    expr: BoundExpr,
}

impl ManifestEvaluator {
    /// Bind the projected partition predicate against the partition schema.
    pub fn new(
        partition_schema: &Schema,
        partition_filter: &Expr,
        case_sensitive: bool,
    ) -> Result<Self> {
        Ok(ManifestEvaluator {
            expr: partition_filter.bind(partition_schema, case_sensitive)?,
        })
    }

    /// True when the manifest may contain matching files.
    pub fn eval(&self, manifest: &ManifestFile) -> Result<bool> {
        let Some(summaries) = &manifest.partitions else {
            // nothing to prune on
            return Ok(true);
        };
        self.eval_expr(&self.expr, summaries)
    }

    fn eval_expr(&self, expr: &BoundExpr, summaries: &[FieldSummary]) -> Result<bool> {
        match expr {
            BoundExpr::AlwaysTrue => Ok(true),
            BoundExpr::AlwaysFalse => Ok(false),
            BoundExpr::And(left, right) => {
                Ok(self.eval_expr(left, summaries)? && self.eval_expr(right, summaries)?)
            }
            BoundExpr::Or(left, right) => {
                Ok(self.eval_expr(left, summaries)? || self.eval_expr(right, summaries)?)
            }
            BoundExpr::Predicate(predicate) => self.eval_predicate(predicate, summaries),
        }
    }

    fn eval_predicate(
        &self,
        predicate: &BoundPredicate,
        summaries: &[FieldSummary],
    ) -> Result<bool> {
        let position = predicate
            .accessor
            .as_ref()
            .and_then(|accessor| accessor.first())
            .copied()
            .ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "partition field {} has no position",
                    predicate.field.name
                ))
            })?;
        let Some(summary) = summaries.get(position) else {
            // summary list shorter than the spec, cannot prune
            return Ok(true);
        };
        let Some(primitive) = predicate.primitive_type() else {
            return Ok(true);
        };

        let lower = decode_bound(
            summary.lower_bound.as_ref().map(|bytes| &bytes[..]),
            primitive,
        )?;
        let upper = decode_bound(
            summary.upper_bound.as_ref().map(|bytes| &bytes[..]),
            primitive,
        )?;
        // no non-null, non-NaN value anywhere in the manifest
        let no_plain_values = lower.is_none();

        match predicate.op {
            Operator::IsNull => Ok(summary.contains_null),
            Operator::NotNull => Ok(!no_plain_values || summary.contains_nan == Some(true)),
            Operator::IsNan => Ok(summary.contains_nan != Some(false)),
            Operator::NotNan => {
                let nans_only = summary.contains_nan == Some(true)
                    && no_plain_values
                    && !summary.contains_null;
                Ok(!nans_only)
            }
            Operator::NotEq | Operator::NotIn => Ok(true),
            Operator::Eq | Operator::Lt | Operator::LtEq | Operator::Gt | Operator::GtEq => {
                if no_plain_values {
                    return Ok(false);
                }
                Ok(range_may_contain(
                    predicate.op,
                    &predicate.literals[0],
                    lower.as_ref(),
                    upper.as_ref(),
                ))
            }
            Operator::In => {
                if no_plain_values {
                    return Ok(false);
                }
                Ok(predicate.literals.iter().any(|literal| {
                    range_may_contain(Operator::Eq, literal, lower.as_ref(), upper.as_ref())
                }))
            }
        }
    }
}

/// Evaluates the projected partition predicate against a concrete
/// partition tuple. Strict: a file is kept only when its tuple matches.
#[derive(Debug, Clone)]
pub struct PartitionEvaluator {
    expr: BoundExpr,
}

impl PartitionEvaluator {
    /// Bind the projected partition predicate against the partition schema.
    pub fn new(
        partition_schema: &Schema,
        partition_filter: &Expr,
        case_sensitive: bool,
    ) -> Result<Self> {
        Ok(PartitionEvaluator {
            expr: partition_filter.bind(partition_schema, case_sensitive)?,
        })
    }

    /// True when the partition tuple satisfies the predicate.
    pub fn eval(&self, partition: &Struct) -> Result<bool> {
        self.eval_expr(&self.expr, partition)
    }

    fn eval_expr(&self, expr: &BoundExpr, partition: &Struct) -> Result<bool> {
        match expr {
            BoundExpr::AlwaysTrue => Ok(true),
            BoundExpr::AlwaysFalse => Ok(false),
            BoundExpr::And(left, right) => {
                Ok(self.eval_expr(left, partition)? && self.eval_expr(right, partition)?)
            }
            BoundExpr::Or(left, right) => {
                Ok(self.eval_expr(left, partition)? || self.eval_expr(right, partition)?)
            }
            BoundExpr::Predicate(predicate) => self.eval_predicate(predicate, partition),
        }
    }

    fn eval_predicate(&self, predicate: &BoundPredicate, partition: &Struct) -> Result<bool> {
        let value = predicate
            .accessor
            .as_ref()
            .and_then(|accessor| accessor.first())
            .and_then(|position| partition.get(*position))
            .or_else(|| partition.get_by_name(&predicate.field.name))
            .ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "partition tuple is missing field {}",
                    predicate.field.name
                ))
            })?;

        let Some(value) = value else {
            // a null partition value satisfies only the null check
            return Ok(predicate.op == Operator::IsNull);
        };

        Ok(match predicate.op {
            Operator::IsNull => false,
            Operator::NotNull => true,
            Operator::IsNan => value.is_nan(),
            Operator::NotNan => !value.is_nan(),
            Operator::Eq => value.compare(&predicate.literals[0]) == Some(Ordering::Equal),
            Operator::NotEq => value.compare(&predicate.literals[0]) != Some(Ordering::Equal),
            Operator::Lt => value.compare(&predicate.literals[0]) == Some(Ordering::Less),
            Operator::LtEq => matches!(
                value.compare(&predicate.literals[0]),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
            Operator::Gt => value.compare(&predicate.literals[0]) == Some(Ordering::Greater),
            Operator::GtEq => matches!(
                value.compare(&predicate.literals[0]),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            Operator::In => predicate
                .literals
                .iter()
                .any(|literal| value.compare(literal) == Some(Ordering::Equal)),
            Operator::NotIn => !predicate
                .literals
                .iter()
                .any(|literal| value.compare(literal) == Some(Ordering::Equal)),
        })
    }
}
