/*!
Boolean predicate trees over table rows.

An [Expr] references columns by name and is what callers hand to a scan,
either directly or through the [parser]. Binding an expression against a
[Schema] resolves every reference to a `(field id, accessor)` pair, converts
the literals to the field type and pushes negations down to the leaves,
producing a [BoundExpr] that the [evaluators] consume.
*/

pub mod evaluators;
pub mod parser;
pub mod projection;

use std::fmt;

use crate::error::{Error, Result};
use crate::model::schema::{PrimitiveType, Schema, StructField};
use crate::model::values::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The atomic comparison operators.
pub enum Operator {
    /// The value is null.
    IsNull,
    /// The value is not null.
    NotNull,
    /// The value is a floating point NaN.
    IsNan,
    /// The value is not a floating point NaN.
    NotNan,
    /// Equal to a literal.
    Eq,
    /// Not equal to a literal.
    NotEq,
    /// Less than a literal.
    Lt,
    /// Less than or equal to a literal.
    LtEq,
    /// Greater than a literal.
    Gt,
    /// Greater than or equal to a literal.
    GtEq,
    /// Contained in a literal set.
    In,
    /// Not contained in a literal set.
    NotIn,
}

impl Operator {
    /// The operator with the opposite meaning, used to push `NOT` down
    /// to the leaves of a predicate tree.
    pub fn negate(&self) -> Operator {
        match self {
            Operator::IsNull => Operator::NotNull,
            Operator::NotNull => Operator::IsNull,
            Operator::IsNan => Operator::NotNan,
            Operator::NotNan => Operator::IsNan,
            Operator::Eq => Operator::NotEq,
            Operator::NotEq => Operator::Eq,
            Operator::Lt => Operator::GtEq,
            Operator::LtEq => Operator::Gt,
            Operator::Gt => Operator::LtEq,
            Operator::GtEq => Operator::Lt,
            Operator::In => Operator::NotIn,
            Operator::NotIn => Operator::In,
        }
    }

    /// True for the unary null and NaN checks.
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            Operator::IsNull | Operator::NotNull | Operator::IsNan | Operator::NotNan
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Operator::IsNull => "is null",
            Operator::NotNull => "is not null",
            Operator::IsNan => "is nan",
            Operator::NotNan => "is not nan",
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::In => "in",
            Operator::NotIn => "not in",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
/// An atomic comparison of a named column against literals.
pub struct Predicate {
    /// Dotted path of the referenced column.
    pub term: String,
    /// The comparison operator.
    pub op: Operator,
    /// Zero, one, or several literals depending on the operator.
    pub literals: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
/// A boolean expression over columns referenced by name.
pub enum Expr {
    /// Matches every row.
    AlwaysTrue,
    /// Matches no row.
    AlwaysFalse,
    /// Both sides must match.
    And(Box<Expr>, Box<Expr>),
    /// Either side must match.
    Or(Box<Expr>, Box<Expr>),
    /// The inner expression must not match.
    Not(Box<Expr>),
    /// An atomic comparison.
    Predicate(Predicate),
}

impl Expr {
    /// Conjunction of two expressions.
    pub fn and(self, other: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(other))
    }

    /// Disjunction of two expressions.
    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }

    /// Negation of an expression.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// The column is null.
    pub fn is_null(term: impl Into<String>) -> Expr {
        Expr::unary(term, Operator::IsNull)
    }

    /// The column is not null.
    pub fn not_null(term: impl Into<String>) -> Expr {
        Expr::unary(term, Operator::NotNull)
    }

    /// The column is NaN.
    pub fn is_nan(term: impl Into<String>) -> Expr {
        Expr::unary(term, Operator::IsNan)
    }

    /// The column equals the literal.
    pub fn equal(term: impl Into<String>, literal: Value) -> Expr {
        Expr::binary(term, Operator::Eq, literal)
    }

    /// The column does not equal the literal.
    pub fn not_equal(term: impl Into<String>, literal: Value) -> Expr {
        Expr::binary(term, Operator::NotEq, literal)
    }

    /// The column is less than the literal.
    pub fn less_than(term: impl Into<String>, literal: Value) -> Expr {
        Expr::binary(term, Operator::Lt, literal)
    }

    /// The column is less than or equal to the literal.
    pub fn less_than_or_equal(term: impl Into<String>, literal: Value) -> Expr {
        Expr::binary(term, Operator::LtEq, literal)
    }

    /// The column is greater than the literal.
    pub fn greater_than(term: impl Into<String>, literal: Value) -> Expr {
        Expr::binary(term, Operator::Gt, literal)
    }

    /// The column is greater than or equal to the literal.
    pub fn greater_than_or_equal(term: impl Into<String>, literal: Value) -> Expr {
        Expr::binary(term, Operator::GtEq, literal)
    }

    /// The column is one of the literals.
    pub fn is_in(term: impl Into<String>, literals: Vec<Value>) -> Expr {
        Expr::Predicate(Predicate {
            term: term.into(),
            op: Operator::In,
            literals,
        })
    }

    fn unary(term: impl Into<String>, op: Operator) -> Expr {
        Expr::Predicate(Predicate {
            term: term.into(),
            op,
            literals: vec![],
        })
    }

    fn binary(term: impl Into<String>, op: Operator, literal: Value) -> Expr {
        Expr::Predicate(Predicate {
            term: term.into(),
            op,
            literals: vec![literal],
        })
    }

    /// Bind the expression against a schema. Column references resolve
    /// to fields, literals are converted to the field type, and `NOT`
    /// is rewritten into the leaves so evaluators never see it.
    pub fn bind(&self, schema: &Schema, case_sensitive: bool) -> Result<BoundExpr> {
        bind_expr(self, schema, case_sensitive, false)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A comparison bound to a field of a schema.
pub struct BoundPredicate {
    /// The resolved field.
    pub field: StructField,
    /// Position path of the field for tuple access, when the field is
    /// reachable through structs only.
    pub accessor: Option<Vec<usize>>,
    /// The comparison operator.
    pub op: Operator,
    /// Literals converted to the field type.
    pub literals: Vec<Value>,
}

impl BoundPredicate {
    /// The primitive type of the bound field.
    pub fn primitive_type(&self) -> Option<&PrimitiveType> {
        self.field.field_type.as_primitive()
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A boolean expression with every column reference resolved.
pub enum BoundExpr {
    /// Matches every row.
    AlwaysTrue,
    /// Matches no row.
    AlwaysFalse,
    /// Both sides must match.
    And(Box<BoundExpr>, Box<BoundExpr>),
    /// Either side must match.
    Or(Box<BoundExpr>, Box<BoundExpr>),
    /// An atomic comparison.
    Predicate(BoundPredicate),
}

fn bind_expr(
    expr: &Expr,
    schema: &Schema,
    case_sensitive: bool,
    negated: bool,
) -> Result<BoundExpr> {
    Ok(match expr {
        Expr::AlwaysTrue => {
            if negated {
                BoundExpr::AlwaysFalse
            } else {
                BoundExpr::AlwaysTrue
            }
        }
        Expr::AlwaysFalse => {
            if negated {
                BoundExpr::AlwaysTrue
            } else {
                BoundExpr::AlwaysFalse
            }
        }
        Expr::Not(inner) => bind_expr(inner, schema, case_sensitive, !negated)?,
        Expr::And(left, right) => {
            let left = bind_expr(left, schema, case_sensitive, negated)?;
            let right = bind_expr(right, schema, case_sensitive, negated)?;
            if negated {
                BoundExpr::Or(Box::new(left), Box::new(right))
            } else {
                BoundExpr::And(Box::new(left), Box::new(right))
            }
        }
        Expr::Or(left, right) => {
            let left = bind_expr(left, schema, case_sensitive, negated)?;
            let right = bind_expr(right, schema, case_sensitive, negated)?;
            if negated {
                BoundExpr::And(Box::new(left), Box::new(right))
            } else {
                BoundExpr::Or(Box::new(left), Box::new(right))
            }
        }
        Expr::Predicate(predicate) => {
            bind_predicate(predicate, schema, case_sensitive, negated)?
        }
    })
}

fn bind_predicate(
    predicate: &Predicate,
    schema: &Schema,
    case_sensitive: bool,
    negated: bool,
) -> Result<BoundExpr> {
    let field = schema.find_field(&predicate.term, case_sensitive)?.clone();
    let op = if negated {
        predicate.op.negate()
    } else {
        predicate.op
    };

    // null checks on required columns resolve at bind time
    if field.required {
        if op == Operator::IsNull {
            return Ok(BoundExpr::AlwaysFalse);
        }
        if op == Operator::NotNull {
            return Ok(BoundExpr::AlwaysTrue);
        }
    }

    let literals = if op.is_unary() {
        if !predicate.literals.is_empty() {
            return Err(Error::Invalid(format!(
                "operator {op} takes no literal, got {}",
                predicate.literals.len()
            )));
        }
        vec![]
    } else {
        let primitive = field.field_type.as_primitive().ok_or_else(|| {
            Error::Invalid(format!(
                "cannot compare non-primitive column {} with {op}",
                predicate.term
            ))
        })?;
        if predicate.literals.is_empty() {
            return Err(Error::Invalid(format!("operator {op} needs a literal")));
        }
        predicate
            .literals
            .iter()
            .map(|literal| literal.to_type(primitive))
            .collect::<Result<Vec<_>>>()?
    };

    if matches!(op, Operator::IsNan | Operator::NotNan)
        && !matches!(
            field.field_type.as_primitive(),
            Some(PrimitiveType::Float) | Some(PrimitiveType::Double)
        )
    {
        return Err(Error::Invalid(format!(
            "NaN check on non-floating-point column {}",
            predicate.term
        )));
    }

    let accessor = schema.accessor_for_field(field.id);
    Ok(BoundExpr::Predicate(BoundPredicate {
        field,
        accessor,
        op,
        literals,
    }))
}
