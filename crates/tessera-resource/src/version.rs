//! Multi-part versions and version ranges.
//!
//! Versions follow the `major.minor.micro[.qualifier]` shape used by module
//! manifests. Missing numeric segments default to zero, so `"1"` and
//! `"1.0.0"` denote the same version. Qualifiers compare lexicographically
//! and an empty qualifier sorts before any non-empty one.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{ResourceError, ResourceResult};

/// A comparable multi-part version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Micro (patch) version.
    pub micro: u32,
    /// Optional qualifier, empty when absent.
    pub qualifier: String,
}

impl Version {
    /// The empty version `0.0.0`.
    pub const EMPTY: Self = Self {
        major: 0,
        minor: 0,
        micro: 0,
        qualifier: String::new(),
    };

    /// Creates a version without qualifier.
    #[must_use]
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    /// Creates a version with a qualifier.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidVersion`] if the qualifier contains
    /// characters other than ASCII alphanumerics, `-` and `_`.
    pub fn with_qualifier(
        major: u32,
        minor: u32,
        micro: u32,
        qualifier: impl Into<String>,
    ) -> ResourceResult<Self> {
        let qualifier = qualifier.into();
        validate_qualifier(&qualifier, &qualifier)?;
        Ok(Self {
            major,
            minor,
            micro,
            qualifier,
        })
    }

    /// Parses a version string.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidVersion`] for empty input, non-numeric
    /// segments, or an invalid qualifier.
    pub fn parse(input: &str) -> ResourceResult<Self> {
        input.parse()
    }

    /// Whether this is the empty version.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

fn invalid_version(input: &str, reason: impl Into<String>) -> ResourceError {
    ResourceError::InvalidVersion {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn validate_qualifier(input: &str, qualifier: &str) -> ResourceResult<()> {
    if qualifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(invalid_version(
            input,
            format!("qualifier '{qualifier}' contains invalid characters"),
        ))
    }
}

impl FromStr for Version {
    type Err = ResourceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid_version(input, "empty version"));
        }

        let mut parts = trimmed.splitn(4, '.');
        let mut numeric = [0u32; 3];
        for (slot, name) in numeric.iter_mut().zip(["major", "minor", "micro"]) {
            match parts.next() {
                Some(segment) => {
                    *slot = segment.parse().map_err(|e| {
                        invalid_version(input, format!("{name} segment '{segment}': {e}"))
                    })?;
                },
                None => break,
            }
        }

        let qualifier = parts.next().unwrap_or_default();
        if trimmed.ends_with('.') {
            return Err(invalid_version(input, "trailing separator"));
        }
        validate_qualifier(input, qualifier)?;

        let [major, minor, micro] = numeric;
        Ok(Self {
            major,
            minor,
            micro,
            qualifier: qualifier.to_string(),
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.micro.cmp(&other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

/// An interval of versions.
///
/// Written as `[floor,ceiling)` style intervals, or as a bare version which
/// means "this version or later".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    floor: Version,
    floor_inclusive: bool,
    ceiling: Option<Version>,
    ceiling_inclusive: bool,
}

impl VersionRange {
    /// A range containing `floor` and every later version.
    #[must_use]
    pub fn at_least(floor: Version) -> Self {
        Self {
            floor,
            floor_inclusive: true,
            ceiling: None,
            ceiling_inclusive: false,
        }
    }

    /// A range containing exactly one version.
    #[must_use]
    pub fn exact(version: Version) -> Self {
        Self {
            floor: version.clone(),
            floor_inclusive: true,
            ceiling: Some(version),
            ceiling_inclusive: true,
        }
    }

    /// A bounded range.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidVersionRange`] if the range is empty.
    pub fn between(
        floor: Version,
        floor_inclusive: bool,
        ceiling: Version,
        ceiling_inclusive: bool,
    ) -> ResourceResult<Self> {
        let range = Self {
            floor,
            floor_inclusive,
            ceiling: Some(ceiling),
            ceiling_inclusive,
        };
        if range.is_empty() {
            return Err(ResourceError::InvalidVersionRange {
                input: range.to_string(),
                reason: "range contains no versions".into(),
            });
        }
        Ok(range)
    }

    /// Parses a range expression.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidVersionRange`] for malformed input.
    pub fn parse(input: &str) -> ResourceResult<Self> {
        input.parse()
    }

    /// Lower bound.
    #[must_use]
    pub fn floor(&self) -> &Version {
        &self.floor
    }

    /// Upper bound, if any.
    #[must_use]
    pub fn ceiling(&self) -> Option<&Version> {
        self.ceiling.as_ref()
    }

    /// Whether `version` lies within this range.
    #[must_use]
    pub fn includes(&self, version: &Version) -> bool {
        let above_floor = if self.floor_inclusive {
            version >= &self.floor
        } else {
            version > &self.floor
        };
        let below_ceiling = match &self.ceiling {
            None => true,
            Some(ceiling) if self.ceiling_inclusive => version <= ceiling,
            Some(ceiling) => version < ceiling,
        };
        above_floor && below_ceiling
    }

    fn is_empty(&self) -> bool {
        match &self.ceiling {
            None => false,
            Some(ceiling) => match self.floor.cmp(ceiling) {
                Ordering::Greater => true,
                Ordering::Equal => !(self.floor_inclusive && self.ceiling_inclusive),
                Ordering::Less => false,
            },
        }
    }

    /// Renders this range as a filter expression over `attribute`.
    ///
    /// `[1.0,2.0)` on `version` becomes `(&(version>=1.0.0)(!(version>=2.0.0)))`.
    #[must_use]
    pub fn to_filter(&self, attribute: &str) -> String {
        let floor = if self.floor_inclusive {
            format!("({attribute}>={})", self.floor)
        } else {
            format!("(!({attribute}<={}))", self.floor)
        };
        match &self.ceiling {
            None => floor,
            Some(ceiling) => {
                let ceiling = if self.ceiling_inclusive {
                    format!("({attribute}<={ceiling})")
                } else {
                    format!("(!({attribute}>={ceiling}))")
                };
                format!("(&{floor}{ceiling})")
            },
        }
    }
}

impl FromStr for VersionRange {
    type Err = ResourceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ResourceError::InvalidVersionRange {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let Some(first) = trimmed.chars().next() else {
            return Err(invalid("empty range"));
        };

        if first != '[' && first != '(' {
            let floor = trimmed.parse::<Version>().map_err(|e| invalid(&e.to_string()))?;
            return Ok(Self::at_least(floor));
        }

        let floor_inclusive = first == '[';
        let ceiling_inclusive = match trimmed.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid("missing closing ']' or ')'")),
        };
        let body = trimmed
            .get(1..trimmed.len().saturating_sub(1))
            .ok_or_else(|| invalid("truncated range"))?;
        let (floor, ceiling) = body
            .split_once(',')
            .ok_or_else(|| invalid("expected 'floor,ceiling'"))?;

        let floor = floor.parse::<Version>().map_err(|e| invalid(&e.to_string()))?;
        let ceiling = ceiling.parse::<Version>().map_err(|e| invalid(&e.to_string()))?;

        Self::between(floor, floor_inclusive, ceiling, ceiling_inclusive)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ceiling {
            None => write!(f, "{}", self.floor),
            Some(ceiling) => write!(
                f,
                "{}{},{}{}",
                if self.floor_inclusive { '[' } else { '(' },
                self.floor,
                ceiling,
                if self.ceiling_inclusive { ']' } else { ')' },
            ),
        }
    }
}
