//! Match policy: does a capability satisfy a requirement.

use std::fmt;

use crate::capability::{Capability, Requirement};

/// Decides whether a capability satisfies a requirement.
///
/// Implementations must be pure: no side effects, no I/O.
pub trait MatchPolicy: Send + Sync + fmt::Debug {
    /// Returns `true` if `capability` satisfies `requirement`.
    fn matches(&self, capability: &Capability, requirement: &Requirement) -> bool;
}

/// Namespace equality plus the requirement's filter, when it has one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMatchPolicy;

impl MatchPolicy for DefaultMatchPolicy {
    fn matches(&self, capability: &Capability, requirement: &Requirement) -> bool {
        if capability.namespace() != requirement.namespace() {
            return false;
        }
        requirement
            .filter()
            .is_none_or(|filter| filter.matches(capability.attributes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::version::Version;

    fn alpha() -> Resource {
        Resource::builder()
            .identity("alpha", Version::new(1, 0, 0))
            .provides("svc", "X")
            .build()
            .unwrap()
    }

    #[test]
    fn test_namespace_equality_without_filter() {
        let resource = alpha();
        let svc = &resource.capabilities()[1];
        let any_svc = Requirement::builder("svc").build().unwrap();
        let other = Requirement::builder("other").build().unwrap();
        assert!(DefaultMatchPolicy.matches(svc, &any_svc));
        assert!(!DefaultMatchPolicy.matches(svc, &other));
    }

    #[test]
    fn test_filter_decides() {
        let resource = alpha();
        let svc = &resource.capabilities()[1];
        let x = Requirement::builder("svc").filter("svc=X").build().unwrap();
        let y = Requirement::builder("svc").filter("svc=Y").build().unwrap();
        assert!(DefaultMatchPolicy.matches(svc, &x));
        assert!(!DefaultMatchPolicy.matches(svc, &y));
    }

    #[test]
    fn test_differing_namespace_never_matches_even_with_passing_filter() {
        let resource = alpha();
        let svc = &resource.capabilities()[1];
        let req = Requirement::builder("other")
            .filter("(svc=*)")
            .build()
            .unwrap();
        assert!(!DefaultMatchPolicy.matches(svc, &req));
    }
}
