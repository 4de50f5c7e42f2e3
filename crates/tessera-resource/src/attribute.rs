//! Typed attribute values.
//!
//! Attribute values are typed so that filters and catalogs can compare and
//! persist them without losing information. Each value has a type name and a
//! string form, and [`AttributeValue::parse`] reverses the pair.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ResourceError, ResourceResult};
use crate::version::{Version, VersionRange};

/// Attribute map of a capability or requirement.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Directive map of a capability or requirement.
pub type Directives = BTreeMap<String, String>;

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Free text.
    String(String),
    /// Signed integer.
    Long(i64),
    /// Floating point number.
    Double(f64),
    /// A version.
    Version(Version),
    /// A version range.
    VersionRange(VersionRange),
    /// Homogeneous list of values.
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Type name used when persisting the value, e.g. `Long` or `List<String>`.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::String(_) => "String".into(),
            Self::Long(_) => "Long".into(),
            Self::Double(_) => "Double".into(),
            Self::Version(_) => "Version".into(),
            Self::VersionRange(_) => "VersionRange".into(),
            Self::List(items) => {
                let inner = items
                    .first()
                    .map_or_else(|| "String".to_string(), Self::type_name);
                format!("List<{inner}>")
            },
        }
    }

    /// String form of the value. List elements are joined with `,`, with
    /// `,` and `\` inside elements escaped by a backslash. A list holding a
    /// single empty element is written as a lone `\` to keep it apart from
    /// the empty list.
    #[must_use]
    pub fn value_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Long(n) => n.to_string(),
            Self::Double(d) => d.to_string(),
            Self::Version(v) => v.to_string(),
            Self::VersionRange(r) => r.to_string(),
            Self::List(items) => {
                let joined = items
                    .iter()
                    .map(|item| escape_list_element(&item.value_string()))
                    .collect::<Vec<_>>()
                    .join(",");
                if joined.is_empty() && !items.is_empty() {
                    "\\".to_string()
                } else {
                    joined
                }
            },
        }
    }

    /// Rebuilds a value from its type name and string form.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidAttribute`] for unknown types or values
    /// that do not parse as the named type.
    pub fn parse(type_name: &str, value: &str) -> ResourceResult<Self> {
        let invalid = |reason: String| ResourceError::InvalidAttribute {
            name: type_name.to_string(),
            reason,
        };

        if let Some(inner) = type_name
            .strip_prefix("List<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            if inner.starts_with("List<") {
                return Err(invalid("nested lists are not supported".into()));
            }
            if value.is_empty() {
                return Ok(Self::List(Vec::new()));
            }
            let items = split_list(value)
                .iter()
                .map(|item| Self::parse(inner, item))
                .collect::<ResourceResult<Vec<_>>>()?;
            return Ok(Self::List(items));
        }

        match type_name {
            "String" => Ok(Self::String(value.to_string())),
            "Long" => value
                .trim()
                .parse()
                .map(Self::Long)
                .map_err(|e| invalid(format!("'{value}': {e}"))),
            "Double" => value
                .trim()
                .parse()
                .map(Self::Double)
                .map_err(|e| invalid(format!("'{value}': {e}"))),
            "Version" => Version::parse(value)
                .map(Self::Version)
                .map_err(|e| invalid(e.to_string())),
            "VersionRange" => VersionRange::parse(value)
                .map(Self::VersionRange)
                .map_err(|e| invalid(e.to_string())),
            other => Err(invalid(format!("unknown attribute type '{other}'"))),
        }
    }

    /// The value as text, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a version, if it is one.
    #[must_use]
    pub fn as_version(&self) -> Option<&Version> {
        match self {
            Self::Version(v) => Some(v),
            _ => None,
        }
    }

    /// The value as an integer, if it is one.
    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value_string())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::Long(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<Version> for AttributeValue {
    fn from(value: Version) -> Self {
        Self::Version(value)
    }
}

impl From<VersionRange> for AttributeValue {
    fn from(value: VersionRange) -> Self {
        Self::VersionRange(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

fn escape_list_element(element: &str) -> String {
    let mut out = String::with_capacity(element.len());
    for c in element.chars() {
        if c == ',' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            },
            ',' => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(AttributeValue::from("x").type_name(), "String");
        assert_eq!(AttributeValue::from(3_i64).type_name(), "Long");
        assert_eq!(AttributeValue::from(1.5).type_name(), "Double");
        assert_eq!(
            AttributeValue::from(Version::new(1, 0, 0)).type_name(),
            "Version"
        );
        assert_eq!(
            AttributeValue::from(vec![1_i64, 2]).type_name(),
            "List<Long>"
        );
        assert_eq!(
            AttributeValue::List(Vec::new()).type_name(),
            "List<String>"
        );
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(
            AttributeValue::parse("Long", "42").unwrap(),
            AttributeValue::Long(42)
        );
        assert_eq!(
            AttributeValue::parse("Version", "1.2.3").unwrap(),
            AttributeValue::Version(Version::new(1, 2, 3))
        );
        assert!(AttributeValue::parse("Long", "forty-two").is_err());
        assert!(AttributeValue::parse("Blob", "x").is_err());
    }

    #[test]
    fn test_list_escaping_survives_reparse() {
        let value = AttributeValue::from(vec!["a,b", "c\\d", "e"]);
        let text = value.value_string();
        assert_eq!(text, "a\\,b,c\\\\d,e");
        let parsed = AttributeValue::parse(&value.type_name(), &text).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_empty_list_parses() {
        assert_eq!(
            AttributeValue::parse("List<String>", "").unwrap(),
            AttributeValue::List(Vec::new())
        );
        assert!(AttributeValue::parse("List<List<String>>", "a").is_err());
    }

    #[test]
    fn test_single_empty_element_is_not_the_empty_list() {
        let single = AttributeValue::from(vec![""]);
        let text = single.value_string();
        assert_eq!(text, "\\");
        assert_eq!(AttributeValue::parse("List<String>", &text).unwrap(), single);

        let pair = AttributeValue::from(vec!["", ""]);
        assert_eq!(
            AttributeValue::parse("List<String>", &pair.value_string()).unwrap(),
            pair
        );
        assert_eq!(AttributeValue::List(Vec::new()).value_string(), "");
    }
}
