//! Condition-string parser.
//!
//! The grammar has no parentheses; precedence alone decides grouping:
//!
//! ```text
//! Or  ::= And '@' Or | And
//! And ::= Cmp '&' And | Cmp
//! Cmp ::= condition Op integer
//! Op  ::= '==' | '!=' | '>' | '>=' | '<' | '<='
//! ```
//!
//! Parsing is a Pratt parser over a token vector. Binary operators bind
//! left-associatively, so `a&b&c` yields `(a&b)&c`.

use std::sync::Arc;
use thiserror::Error;

use crate::conditions::{Comparator, Condition, ConditionLookup};
use crate::operator::Operator;
use crate::sample_policy::ReconcileError;

const CMP_BP: u8 = 30;
const AND_BP: u8 = 20;
const OR_BP: u8 = 10;

static EOF: Token = Token::Eof;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected =")]
    ExpectedEquals,
    #[error("invalid character")]
    InvalidCharacter,
    #[error("integer literal out of range")]
    IntegerOverflow,
    #[error("unexpected eof")]
    UnexpectedEof,
    #[error("unexpected integer literal")]
    UnexpectedInteger,
    #[error("unexpected identifier")]
    UnexpectedIdentifier,
    #[error("unknown condition {0}")]
    UnknownCondition(String),
    #[error("expected condition on left hand side of comparison")]
    ExpectedConditionLhs,
    #[error("expected number on right hand side of comparison")]
    ExpectedNumberRhs,
    #[error("expected expression")]
    ExpectedExpression,
    #[error("expected comparison on left hand side of operator")]
    ExpectedComparisonLhs,
    #[error("expected comparison on right hand side of operator")]
    ExpectedComparisonRhs,
    #[error("expected comparison or operator")]
    ExpectedComparisonOrOperator,
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Int(i32),
    Ident(String),
    Cmp(Comparator),
    And,
    Or,
    Eof,
}

impl Token {
    const fn lbp(&self) -> u8 {
        match self {
            Self::Cmp(_) => CMP_BP,
            Self::And => AND_BP,
            Self::Or => OR_BP,
            Self::Int(_) | Self::Ident(_) | Self::Eof => 0,
        }
    }
}

/// Result of [`parse_any`]; a bare integer or condition is a valid parse of
/// its own.
#[derive(Debug, Clone)]
pub enum Node {
    Int(i32),
    Cond(Arc<Condition>),
    Op(Operator),
}

const fn is_ident(c: u8) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'_'
}

/// Split a condition string into tokens, terminated by [`Token::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_digit() {
            let mut n: i32 = 0;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                n = n
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(i32::from(bytes[i] - b'0')))
                    .ok_or(ParseError::IntegerOverflow)?;
                i += 1;
            }
            tokens.push(Token::Int(n));
        } else if is_ident(c) {
            let start = i;
            while i < bytes.len() && is_ident(bytes[i]) {
                i += 1;
            }
            tokens.push(Token::Ident(source[start..i].to_string()));
        } else {
            let followed_by_eq = bytes.get(i + 1) == Some(&b'=');
            let (token, width) = match c {
                b'=' | b'!' if !followed_by_eq => return Err(ParseError::ExpectedEquals),
                b'=' => (Token::Cmp(Comparator::Eq), 2),
                b'!' => (Token::Cmp(Comparator::Neq), 2),
                b'<' if followed_by_eq => (Token::Cmp(Comparator::Lte), 2),
                b'<' => (Token::Cmp(Comparator::Lt), 1),
                b'>' if followed_by_eq => (Token::Cmp(Comparator::Gte), 2),
                b'>' => (Token::Cmp(Comparator::Gt), 1),
                b'@' => (Token::Or, 1),
                b'&' => (Token::And, 1),
                _ => return Err(ParseError::InvalidCharacter),
            };
            tokens.push(token);
            i += width;
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

struct Parser<'t, L> {
    tokens: std::slice::Iter<'t, Token>,
    next: &'t Token,
    lookup: L,
}

impl<'t, L: ConditionLookup> Parser<'t, L> {
    fn new(tokens: &'t [Token], lookup: L) -> Self {
        let mut tokens = tokens.iter();
        let next = tokens.next().unwrap_or(&EOF);
        Self {
            tokens,
            next,
            lookup,
        }
    }

    fn advance(&mut self) -> &'t Token {
        let current = self.next;
        self.next = self.tokens.next().unwrap_or(&EOF);
        current
    }

    fn expression(&mut self, rbp: u8) -> Result<Node, ParseError> {
        let current = self.advance();
        let mut left = self.nud(current)?;
        while rbp < self.next.lbp() {
            let current = self.advance();
            left = self.led(current, left)?;
        }
        Ok(left)
    }

    fn nud(&self, token: &Token) -> Result<Node, ParseError> {
        match token {
            Token::Int(value) => Ok(Node::Int(*value)),
            Token::Ident(name) => self
                .lookup
                .lookup(name)
                .map(Node::Cond)
                .ok_or_else(|| ParseError::UnknownCondition(name.clone())),
            Token::Cmp(_) | Token::And | Token::Or => Err(ParseError::ExpectedExpression),
            Token::Eof => Err(ParseError::UnexpectedEof),
        }
    }

    fn led(&mut self, token: &Token, left: Node) -> Result<Node, ParseError> {
        match token {
            Token::Int(_) => Err(ParseError::UnexpectedInteger),
            Token::Ident(_) => Err(ParseError::UnexpectedIdentifier),
            Token::Eof => Err(ParseError::UnexpectedEof),
            Token::Cmp(comparator) => {
                let Node::Cond(condition) = left else {
                    return Err(ParseError::ExpectedConditionLhs);
                };
                let Node::Int(argument) = self.expression(CMP_BP)? else {
                    return Err(ParseError::ExpectedNumberRhs);
                };
                Ok(Node::Op(Operator::cmp(condition, *comparator, argument)))
            }
            Token::And | Token::Or => {
                let Node::Op(lhs) = left else {
                    return Err(ParseError::ExpectedComparisonLhs);
                };
                let Node::Op(rhs) = self.expression(token.lbp())? else {
                    return Err(ParseError::ExpectedComparisonRhs);
                };
                let op = if *token == Token::And {
                    Operator::and(lhs, rhs)?
                } else {
                    Operator::or(lhs, rhs)?
                };
                Ok(Node::Op(op))
            }
        }
    }
}

/// Parse any expression, including a bare integer or condition name.
///
/// Parsing stops at the first token that cannot continue the expression;
/// trailing tokens are ignored.
pub fn parse_any<L: ConditionLookup>(source: &str, lookup: L) -> Result<Node, ParseError> {
    let tokens = tokenize(source)?;
    Parser::new(&tokens, lookup).expression(0)
}

/// Parse a full condition string into an operator tree.
pub fn parse<L: ConditionLookup>(source: &str, lookup: L) -> Result<Operator, ParseError> {
    match parse_any(source, lookup)? {
        Node::Op(op) => Ok(op),
        Node::Int(_) | Node::Cond(_) => Err(ParseError::ExpectedComparisonOrOperator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{MockConditions, default_table};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn tokenizes_every_operator() {
        let tokens = tokenize("a==1&b!=2@c<3&d<=4&e>5&f>=60").expect("valid input");
        let cmps: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Cmp(c) => Some(*c),
                _ => None,
            })
            .collect();
        assert_eq!(cmps, Comparator::ALL.to_vec());
        assert_eq!(tokens.last(), Some(&Token::Eof));
        assert!(tokens.contains(&Token::Int(60)));
        assert!(tokens.contains(&Token::Or));
    }

    #[test]
    fn precedence_groups_and_inside_or() {
        let op = parse("phase==1&corner!=0@is_last_straight==1", default_table())
            .expect("valid condition");
        let Operator::Or { left, right, .. } = &op else {
            panic!("expected or at the root, got {op:?}");
        };
        assert!(matches!(**left, Operator::And { .. }));
        assert!(matches!(**right, Operator::Cmp(_)));
    }

    #[test]
    fn binary_operators_are_left_associative() {
        let op = parse("a==1&b==2&c==3", MockConditions::new()).expect("valid");
        let Operator::And { left, right, .. } = &op else {
            panic!("expected and");
        };
        assert!(matches!(**left, Operator::And { .. }));
        assert_eq!(right.to_string(), "c==3");
    }

    #[test]
    fn reports_errors() {
        let mock = MockConditions::new();
        let cases = [
            ("a=1", ParseError::ExpectedEquals),
            ("a!1", ParseError::ExpectedEquals),
            ("a==1 ", ParseError::InvalidCharacter),
            ("A==1", ParseError::InvalidCharacter),
            ("a==", ParseError::UnexpectedEof),
            ("", ParseError::UnexpectedEof),
            ("a==1&", ParseError::UnexpectedEof),
            ("1==1", ParseError::ExpectedConditionLhs),
            ("a==b", ParseError::ExpectedNumberRhs),
            ("==1", ParseError::ExpectedExpression),
            ("a&b==1", ParseError::ExpectedComparisonLhs),
            ("a==1&b", ParseError::ExpectedComparisonRhs),
            ("a", ParseError::ExpectedComparisonOrOperator),
            ("7", ParseError::ExpectedComparisonOrOperator),
            ("a==99999999999", ParseError::IntegerOverflow),
        ];
        for (source, expected) in cases {
            let err = parse(source, &mock).expect_err(source);
            assert_eq!(err, expected, "{source}");
        }
        assert_eq!(
            parse("no_such_condition==1", default_table()).expect_err("unknown"),
            ParseError::UnknownCondition("no_such_condition".to_string())
        );
    }

    #[test]
    fn parse_any_accepts_bare_values() {
        let mock = MockConditions::new();
        assert!(matches!(parse_any("42", &mock), Ok(Node::Int(42))));
        match parse_any("corner", &mock) {
            Ok(Node::Cond(c)) => assert_eq!(c.name(), "corner"),
            other => panic!("expected condition, got {other:?}"),
        }
    }

    #[test]
    fn policy_conflicts_surface_as_parse_errors() {
        let err = parse("straight_random==1&all_corner_random==1", default_table())
            .expect_err("exclusive policies");
        assert_eq!(
            err,
            ParseError::Reconcile(ReconcileError::StraightWithAllCorner)
        );
    }

    fn random_cmp(rng: &mut SmallRng, names: &[&str]) -> String {
        let name = names[rng.gen_range(0..names.len())];
        let op = Comparator::ALL[rng.gen_range(0..Comparator::ALL.len())];
        format!("{name}{op}{}", rng.gen_range(0..1000))
    }

    #[test]
    fn printed_trees_reparse_to_the_same_shape() {
        let mock = MockConditions::new();
        let names = ["phase", "corner", "order_rate", "is_lastspurt", "hp_per"];
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let ors = rng.gen_range(1..4);
            let source = (0..ors)
                .map(|_| {
                    let ands = rng.gen_range(1..4);
                    (0..ands)
                        .map(|_| random_cmp(&mut rng, &names))
                        .collect::<Vec<_>>()
                        .join("&")
                })
                .collect::<Vec<_>>()
                .join("@");
            let tree = parse(&source, &mock).expect("generated source parses");
            let printed = tree.to_string();
            assert_eq!(printed, source);
            let reparsed = parse(&printed, &mock).expect("printed tree parses");
            assert!(tree.same_shape(&reparsed), "{source}");
        }
    }
}
