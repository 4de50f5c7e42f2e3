//! Resource identity: a symbolic name paired with a version.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{ResourceError, ResourceResult};
use crate::version::Version;

/// The `(symbolic name, version)` pair that uniquely identifies a resource.
///
/// Identities order by version first and then by name. The string form is
/// `name:version`; parsing a bare name yields the empty version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    symbolic_name: String,
    version: Version,
}

impl ResourceIdentity {
    /// Creates an identity.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidIdentity`] if the name is empty or
    /// contains `:`.
    pub fn new(symbolic_name: impl Into<String>, version: Version) -> ResourceResult<Self> {
        let symbolic_name = symbolic_name.into();
        if symbolic_name.trim().is_empty() {
            return Err(ResourceError::InvalidIdentity(
                "symbolic name must not be empty".into(),
            ));
        }
        if symbolic_name.contains(':') {
            return Err(ResourceError::InvalidIdentity(format!(
                "symbolic name '{symbolic_name}' must not contain ':'"
            )));
        }
        Ok(Self {
            symbolic_name,
            version,
        })
    }

    /// Symbolic name.
    #[must_use]
    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    /// Version.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }
}

impl FromStr for ResourceIdentity {
    type Err = ResourceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.rsplit_once(':') {
            Some((name, version)) => {
                let version = version
                    .parse::<Version>()
                    .map_err(|e| ResourceError::InvalidIdentity(format!("{input}: {e}")))?;
                Self::new(name, version)
            },
            None => Self::new(input, Version::EMPTY),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbolic_name, self.version)
    }
}

impl PartialOrd for ResourceIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.symbolic_name.cmp(&other.symbolic_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = ResourceIdentity::new("alpha", Version::new(1, 0, 0)).unwrap();
        assert_eq!(id.to_string(), "alpha:1.0.0");
        let parsed: ResourceIdentity = "alpha:1.0.0".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_bare_name_parses_with_empty_version() {
        let id: ResourceIdentity = "alpha".parse().unwrap();
        assert_eq!(id.symbolic_name(), "alpha");
        assert!(id.version().is_empty());
    }

    #[test]
    fn test_invalid_identities() {
        assert!(ResourceIdentity::new("", Version::EMPTY).is_err());
        assert!(ResourceIdentity::new("a:b", Version::EMPTY).is_err());
        assert!("alpha:x.y".parse::<ResourceIdentity>().is_err());
    }

    #[test]
    fn test_orders_by_version_then_name() {
        let b1 = ResourceIdentity::new("b", Version::new(1, 0, 0)).unwrap();
        let a2 = ResourceIdentity::new("a", Version::new(2, 0, 0)).unwrap();
        let a1 = ResourceIdentity::new("a", Version::new(1, 0, 0)).unwrap();
        let mut ids = vec![a2.clone(), b1.clone(), a1.clone()];
        ids.sort();
        assert_eq!(ids, vec![a1, b1, a2]);
    }
}
