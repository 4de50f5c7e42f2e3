//! LDAP-style filter expressions over attribute maps.
//!
//! Supported syntax:
//!
//! - `(&(f1)(f2)...)`, `(|(f1)(f2)...)` and `(!(f))`
//! - `(attr=value)`, `(attr>=value)`, `(attr<=value)`, `(attr~=value)`
//! - `(attr=*)` presence and `(attr=pre*mid*post)` substring tests
//! - a bare top-level item such as `attr=value`
//!
//! A backslash escapes the following character inside values. Comparisons
//! are typed: the operand is converted to the type of the attribute value
//! before comparing, and a list attribute matches when any element matches.
//! A missing attribute never matches.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::attribute::{AttributeValue, Attributes};
use crate::error::{ResourceError, ResourceResult};
use crate::version::Version;

/// Comparison operator of a simple filter item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Equal,
    /// `~=`, equality ignoring case and whitespace.
    Approx,
    /// `>=`
    GreaterOrEqual,
    /// `<=`
    LessOrEqual,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::Approx => "~=",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Equal | Self::Approx => ordering == Ordering::Equal,
            Self::GreaterOrEqual => ordering != Ordering::Less,
            Self::LessOrEqual => ordering != Ordering::Greater,
        }
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// All operands match.
    And(Vec<Filter>),
    /// At least one operand matches.
    Or(Vec<Filter>),
    /// The operand does not match.
    Not(Box<Filter>),
    /// Typed comparison against a single attribute.
    Compare {
        /// Attribute name.
        attribute: String,
        /// Operator.
        op: CompareOp,
        /// Unescaped operand.
        value: String,
    },
    /// The attribute is present.
    Present(String),
    /// Wildcard match on the string form of the attribute. Segments are the
    /// literal pieces between `*` characters; the first must prefix the value
    /// and the last must suffix it.
    Substring {
        /// Attribute name.
        attribute: String,
        /// Literal segments between wildcards.
        segments: Vec<String>,
    },
}

impl Filter {
    /// Parses a filter expression.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidFilter`] with the character offset of
    /// the first problem.
    pub fn parse(input: &str) -> ResourceResult<Self> {
        input.parse()
    }

    /// Convenience constructor for `(attribute=value)`.
    #[must_use]
    pub fn equal(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Compare {
            attribute: attribute.into(),
            op: CompareOp::Equal,
            value: value.into(),
        }
    }

    /// Evaluates the filter against an attribute map.
    #[must_use]
    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Self::And(items) => items.iter().all(|f| f.matches(attributes)),
            Self::Or(items) => items.iter().any(|f| f.matches(attributes)),
            Self::Not(inner) => !inner.matches(attributes),
            Self::Present(attribute) => attributes.contains_key(attribute),
            Self::Compare {
                attribute,
                op,
                value,
            } => attributes
                .get(attribute)
                .is_some_and(|actual| compare(actual, *op, value)),
            Self::Substring {
                attribute,
                segments,
            } => attributes
                .get(attribute)
                .is_some_and(|actual| substring(actual, segments)),
        }
    }
}

fn compare(actual: &AttributeValue, op: CompareOp, operand: &str) -> bool {
    match actual {
        AttributeValue::List(items) => items.iter().any(|item| compare(item, op, operand)),
        AttributeValue::String(s) => match op {
            CompareOp::Approx => normalize(s) == normalize(operand),
            _ => op.accepts(s.as_str().cmp(operand)),
        },
        AttributeValue::Long(n) => operand
            .trim()
            .parse::<i64>()
            .is_ok_and(|o| op.accepts(n.cmp(&o))),
        AttributeValue::Double(d) => operand
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|o| d.partial_cmp(&o))
            .is_some_and(|ordering| op.accepts(ordering)),
        AttributeValue::Version(v) => {
            Version::parse(operand).is_ok_and(|o| op.accepts(v.cmp(&o)))
        },
        AttributeValue::VersionRange(range) => match op {
            CompareOp::Equal | CompareOp::Approx => {
                Version::parse(operand).is_ok_and(|o| range.includes(&o))
            },
            CompareOp::GreaterOrEqual | CompareOp::LessOrEqual => false,
        },
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn substring(actual: &AttributeValue, segments: &[String]) -> bool {
    if let AttributeValue::List(items) = actual {
        return items.iter().any(|item| substring(item, segments));
    }
    let text = actual.value_string();
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    let Some(mut remaining) = text.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        let Some(at) = remaining.find(part.as_str()) else {
            return false;
        };
        remaining = remaining
            .get(at.saturating_add(part.len())..)
            .unwrap_or_default();
    }
    remaining.ends_with(last.as_str())
}

impl FromStr for Filter {
    type Err = ResourceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::new(input);
        parser.skip_whitespace();
        let filter = if parser.peek() == Some('(') {
            parser.parse_filter()?
        } else {
            parser.bare = true;
            parser.parse_item()?
        };
        parser.skip_whitespace();
        if parser.peek().is_some() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(filter)
    }
}

/// Deepest composite nesting a parsed filter may have.
const MAX_NESTING: usize = 256;

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
    bare: bool,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
            bare: false,
            depth: 0,
        }
    }

    fn error(&self, reason: &str) -> ResourceError {
        ResourceError::InvalidFilter {
            input: self.input.to_string(),
            offset: self.pos,
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos = self.pos.saturating_add(1);
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> ResourceResult<()> {
        if self.peek() == Some(expected) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn parse_filter(&mut self) -> ResourceResult<Filter> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(&format!("nesting deeper than {MAX_NESTING} levels")));
        }
        self.depth = self.depth.saturating_add(1);
        let filter = self.parse_nested();
        self.depth = self.depth.saturating_sub(1);
        filter
    }

    fn parse_nested(&mut self) -> ResourceResult<Filter> {
        self.expect('(')?;
        self.skip_whitespace();
        let filter = match self.peek() {
            Some('&') => {
                self.bump();
                Filter::And(self.parse_operands()?)
            },
            Some('|') => {
                self.bump();
                Filter::Or(self.parse_operands()?)
            },
            Some('!') => {
                self.bump();
                self.skip_whitespace();
                Filter::Not(Box::new(self.parse_filter()?))
            },
            _ => self.parse_item()?,
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_operands(&mut self) -> ResourceResult<Vec<Filter>> {
        let mut operands = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() != Some('(') {
                break;
            }
            operands.push(self.parse_filter()?);
        }
        if operands.is_empty() {
            return Err(self.error("expected at least one operand"));
        }
        Ok(operands)
    }

    fn parse_item(&mut self) -> ResourceResult<Filter> {
        let mut attribute = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '<' | '>' | '~' | '(' | ')') {
                break;
            }
            attribute.push(c);
            self.bump();
        }
        let attribute = attribute.trim().to_string();
        if attribute.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.bump() {
            Some('=') => CompareOp::Equal,
            Some('<') => {
                self.expect('=')?;
                CompareOp::LessOrEqual
            },
            Some('>') => {
                self.expect('=')?;
                CompareOp::GreaterOrEqual
            },
            Some('~') => {
                self.expect('=')?;
                CompareOp::Approx
            },
            _ => return Err(self.error("expected comparison operator")),
        };

        let mut segments = self.parse_value()?;
        if op != CompareOp::Equal {
            if segments.len() != 1 {
                return Err(self.error("wildcards are only allowed with '='"));
            }
            return Ok(Filter::Compare {
                attribute,
                op,
                value: segments.pop().unwrap_or_default(),
            });
        }

        Ok(match segments.as_slice() {
            [_] => Filter::Compare {
                attribute,
                op,
                value: segments.pop().unwrap_or_default(),
            },
            [a, b] if a.is_empty() && b.is_empty() => Filter::Present(attribute),
            _ => Filter::Substring {
                attribute,
                segments,
            },
        })
    }

    /// Reads a value up to the closing parenthesis, splitting it on
    /// unescaped `*`.
    fn parse_value(&mut self) -> ResourceResult<Vec<String>> {
        let mut segments = vec![String::new()];
        loop {
            let c = match self.peek() {
                None if self.bare => break,
                None => return Err(self.error("unterminated filter item")),
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some(escaped) => escaped,
                        None => return Err(self.error("dangling escape")),
                    }
                },
                Some('*') => {
                    self.bump();
                    segments.push(String::new());
                    continue;
                },
                Some(c) => {
                    self.bump();
                    c
                },
            };
            if let Some(last) = segments.last_mut() {
                last.push(c);
            }
        }
        Ok(segments)
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        if matches!(c, '\\' | '(' | ')' | '*') {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(items) | Self::Or(items) => {
                f.write_str(if matches!(self, Self::And(_)) { "(&" } else { "(|" })?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            },
            Self::Not(inner) => write!(f, "(!{inner})"),
            Self::Present(attribute) => write!(f, "({attribute}=*)"),
            Self::Compare {
                attribute,
                op,
                value,
            } => {
                write!(f, "({attribute}{}", op.symbol())?;
                write_escaped(f, value)?;
                f.write_str(")")
            },
            Self::Substring {
                attribute,
                segments,
            } => {
                write!(f, "({attribute}=")?;
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        f.write_str("*")?;
                    }
                    write_escaped(f, segment)?;
                }
                f.write_str(")")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionRange;

    fn attrs(pairs: &[(&str, AttributeValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_simple_equality() {
        let a = attrs(&[("svc", "X".into())]);
        assert!(Filter::parse("(svc=X)").unwrap().matches(&a));
        assert!(!Filter::parse("(svc=Y)").unwrap().matches(&a));
        assert!(!Filter::parse("(other=X)").unwrap().matches(&a));
    }

    #[test]
    fn test_bare_top_level_item() {
        let a = attrs(&[("svc", "X".into())]);
        let filter = Filter::parse("svc=X").unwrap();
        assert!(filter.matches(&a));
        assert_eq!(filter.to_string(), "(svc=X)");
    }

    #[test]
    fn test_composites() {
        let a = attrs(&[("a", "1".into()), ("b", "2".into())]);
        assert!(Filter::parse("(&(a=1)(b=2))").unwrap().matches(&a));
        assert!(!Filter::parse("(&(a=1)(b=3))").unwrap().matches(&a));
        assert!(Filter::parse("(|(a=9)(b=2))").unwrap().matches(&a));
        assert!(Filter::parse("(!(a=9))").unwrap().matches(&a));
        assert!(Filter::parse("( & (a=1) (b=2) )").unwrap().matches(&a));
    }

    #[test]
    fn test_typed_version_comparison() {
        let a = attrs(&[("version", Version::new(1, 10, 0).into())]);
        // String comparison would put 1.10 below 1.9.
        assert!(Filter::parse("(version>=1.9)").unwrap().matches(&a));
        assert!(Filter::parse("(version<=2.0)").unwrap().matches(&a));
        assert!(!Filter::parse("(version>=2.0)").unwrap().matches(&a));
        assert!(Filter::parse("(version=1.10.0)").unwrap().matches(&a));
    }

    #[test]
    fn test_typed_long_comparison() {
        let a = attrs(&[("size", 100_i64.into())]);
        assert!(Filter::parse("(size>=99)").unwrap().matches(&a));
        assert!(!Filter::parse("(size<=9)").unwrap().matches(&a));
        assert!(!Filter::parse("(size=abc)").unwrap().matches(&a));
    }

    #[test]
    fn test_range_attribute_includes_operand() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        let a = attrs(&[("accepts", range.into())]);
        assert!(Filter::parse("(accepts=1.5)").unwrap().matches(&a));
        assert!(!Filter::parse("(accepts=2.0)").unwrap().matches(&a));
    }

    #[test]
    fn test_list_matches_any_element() {
        let a = attrs(&[("tags", vec!["red", "blue"].into())]);
        assert!(Filter::parse("(tags=blue)").unwrap().matches(&a));
        assert!(!Filter::parse("(tags=green)").unwrap().matches(&a));
        assert!(Filter::parse("(tags=bl*)").unwrap().matches(&a));
    }

    #[test]
    fn test_presence_and_substring() {
        let a = attrs(&[("name", "org.example.core".into())]);
        assert_eq!(
            Filter::parse("(name=*)").unwrap(),
            Filter::Present("name".into())
        );
        assert!(Filter::parse("(name=*)").unwrap().matches(&a));
        assert!(!Filter::parse("(missing=*)").unwrap().matches(&a));
        assert!(Filter::parse("(name=org.*)").unwrap().matches(&a));
        assert!(Filter::parse("(name=*core)").unwrap().matches(&a));
        assert!(Filter::parse("(name=org*example*core)").unwrap().matches(&a));
        assert!(!Filter::parse("(name=org*core*example)").unwrap().matches(&a));
    }

    #[test]
    fn test_approx_ignores_case_and_whitespace() {
        let a = attrs(&[("title", "Hello World".into())]);
        assert!(Filter::parse("(title~=helloworld)").unwrap().matches(&a));
    }

    #[test]
    fn test_escapes() {
        let a = attrs(&[("expr", "a*(b)".into())]);
        let filter = Filter::parse(r"(expr=a\*\(b\))").unwrap();
        assert!(filter.matches(&a));
        assert_eq!(filter.to_string(), r"(expr=a\*\(b\))");
    }

    #[test]
    fn test_display_reparses() {
        let text = "(&(a>=1)(|(b~=x)(!(c=*)))(d=p*q))";
        let filter = Filter::parse(text).unwrap();
        assert_eq!(filter.to_string(), text);
        assert_eq!(Filter::parse(&filter.to_string()).unwrap(), filter);
    }

    #[test]
    fn test_parse_errors_report_offset() {
        let err = Filter::parse("(a=1").unwrap_err();
        assert!(matches!(err, ResourceError::InvalidFilter { offset: 4, .. }));
        assert!(Filter::parse("(&)").is_err());
        assert!(Filter::parse("(=x)").is_err());
        assert!(Filter::parse("(a>x)").is_err());
        assert!(Filter::parse("(a>=x*)").is_err());
        assert!(Filter::parse("(a=1))").is_err());
        assert!(Filter::parse("(a=1\\").is_err());
    }

    fn negated(levels: usize) -> String {
        format!("{}(a=1){}", "(!".repeat(levels), ")".repeat(levels))
    }

    #[test]
    fn test_nesting_limit() {
        let a = attrs(&[("a", "1".into())]);
        let deepest = Filter::parse(&negated(MAX_NESTING.saturating_sub(1))).unwrap();
        assert!(deepest.matches(&a));
        assert_eq!(deepest.to_string(), negated(MAX_NESTING.saturating_sub(1)));

        let err = Filter::parse(&negated(MAX_NESTING)).unwrap_err();
        assert!(matches!(err, ResourceError::InvalidFilter { .. }));
        assert!(Filter::parse(&negated(100_000)).is_err());

        let wide = format!("(&{})", "(|(a=1)(b=2))".repeat(1_000));
        assert!(Filter::parse(&wide).unwrap().matches(&a));
    }
}
