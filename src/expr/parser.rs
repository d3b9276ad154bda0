/*!
Parser for the string predicate grammar accepted wherever predicates are
taken: identifiers, string/number/bool literals, `= != < <= > >= IN NOT IN
IS NULL IS NOT NULL IS NAN IS NOT NAN AND OR NOT ( )`.
*/

use crate::error::{Error, Result};
use crate::expr::{Expr, Operator, Predicate};
use crate::model::values::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    LParen,
    RParen,
    Comma,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Parse a predicate expression from its string form.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        position: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(Error::Invalid(format!(
            "unexpected trailing input at {token:?}"
        ))),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                // accept both = and ==
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(Error::Invalid("expected = after !".to_string()));
                }
                tokens.push(Token::NotEq);
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::LtEq);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::GtEq);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '\'' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => {
                            // doubled quote is an escaped quote
                            if chars.peek() == Some(&'\'') {
                                chars.next();
                                value.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some(c) => value.push(c),
                        None => {
                            return Err(Error::Invalid(
                                "unterminated string literal".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || c == '-' => {
                chars.next();
                let mut value = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_digit() || n == '.' || n == 'e' || n == 'E' || n == '+' {
                        value.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut value = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' || n == '.' {
                        value.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(value));
            }
            other => {
                return Err(Error::Invalid(format!(
                    "unexpected character {other:?} in predicate"
                )))
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(Error::Invalid(format!(
                "expected {keyword} at {:?}",
                self.peek()
            )))
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;
        while self.eat_keyword("or") {
            expr = expr.or(self.parse_and()?);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        while self.eat_keyword("and") {
            expr = expr.and(self.parse_unary()?);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            return Ok(self.parse_unary()?.not());
        }
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let expr = self.parse_or()?;
            match self.next() {
                Some(Token::RParen) => return Ok(expr),
                other => {
                    return Err(Error::Invalid(format!("expected ) at {other:?}")))
                }
            }
        }
        if self.peek_keyword("true") {
            self.next();
            return Ok(Expr::AlwaysTrue);
        }
        if self.peek_keyword("false") {
            self.next();
            return Ok(Expr::AlwaysFalse);
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr> {
        let term = match self.next() {
            Some(Token::Ident(name)) => name,
            other => {
                return Err(Error::Invalid(format!(
                    "expected a column reference at {other:?}"
                )))
            }
        };

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            let op = if self.eat_keyword("null") {
                if negated {
                    Operator::NotNull
                } else {
                    Operator::IsNull
                }
            } else if self.eat_keyword("nan") {
                if negated {
                    Operator::NotNan
                } else {
                    Operator::IsNan
                }
            } else {
                return Err(Error::Invalid(format!(
                    "expected NULL or NAN at {:?}",
                    self.peek()
                )));
            };
            return Ok(Expr::Predicate(Predicate {
                term,
                op,
                literals: vec![],
            }));
        }

        if self.eat_keyword("not") {
            self.expect_keyword("in")?;
            let literals = self.parse_literal_list()?;
            return Ok(Expr::Predicate(Predicate {
                term,
                op: Operator::NotIn,
                literals,
            }));
        }
        if self.eat_keyword("in") {
            let literals = self.parse_literal_list()?;
            return Ok(Expr::Predicate(Predicate {
                term,
                op: Operator::In,
                literals,
            }));
        }

        let op = match self.next() {
            Some(Token::Eq) => Operator::Eq,
            Some(Token::NotEq) => Operator::NotEq,
            Some(Token::Lt) => Operator::Lt,
            Some(Token::LtEq) => Operator::LtEq,
            Some(Token::Gt) => Operator::Gt,
            Some(Token::GtEq) => Operator::GtEq,
            other => {
                return Err(Error::Invalid(format!(
                    "expected a comparison operator at {other:?}"
                )))
            }
        };
        let literal = self.parse_literal()?;
        Ok(Expr::Predicate(Predicate {
            term,
            op,
            literals: vec![literal],
        }))
    }

    fn parse_literal_list(&mut self) -> Result<Vec<Value>> {
        match self.next() {
            Some(Token::LParen) => {}
            other => return Err(Error::Invalid(format!("expected ( at {other:?}"))),
        }
        let mut literals = vec![self.parse_literal()?];
        loop {
            match self.next() {
                Some(Token::Comma) => literals.push(self.parse_literal()?),
                Some(Token::RParen) => return Ok(literals),
                other => {
                    return Err(Error::Invalid(format!(
                        "expected , or ) at {other:?}"
                    )))
                }
            }
        }
    }

    fn parse_literal(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Str(value)) => Ok(Value::String(value)),
            Some(Token::Number(value)) => {
                if value.contains(['.', 'e', 'E']) {
                    value
                        .parse::<f64>()
                        .map(Value::Double)
                        .map_err(|_| Error::Invalid(format!("bad number literal {value}")))
                } else {
                    value
                        .parse::<i64>()
                        .map(Value::Long)
                        .map_err(|_| Error::Invalid(format!("bad number literal {value}")))
                }
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("true") => {
                Ok(Value::Boolean(true))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("false") => {
                Ok(Value::Boolean(false))
            }
            other => Err(Error::Invalid(format!("expected a literal at {other:?}"))),
        }
    }
}
