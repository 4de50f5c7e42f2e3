//! Provisioning error types.

use tessera_resource::{ResourceError, ResourceIdentity};

/// Errors from resolution and provisioning.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Nothing in the environment or the repository satisfies a requirement.
    #[error("unsatisfied requirement {requirement}")]
    UnsatisfiedRequirement {
        /// The requirement.
        requirement: String,
        /// Resource declaring it; `None` for a top-level requirement.
        requirer: Option<ResourceIdentity>,
    },

    /// Resources depend on each other in a cycle.
    #[error("dependency cycle: {}", format_path(.path))]
    ResolutionCycle {
        /// The cycle, starting and ending with the same resource.
        path: Vec<ResourceIdentity>,
    },

    /// The host installer failed. Earlier installations were rolled back.
    #[error("failed to install {resource}: {source}")]
    Install {
        /// Resource being installed.
        resource: ResourceIdentity,
        /// What the installer reported.
        #[source]
        source: anyhow::Error,
    },

    /// A wire or requirement could not be built.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

fn format_path(path: &[ResourceIdentity]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message() {
        let err = ProvisionError::ResolutionCycle {
            path: vec![
                "a:1.0.0".parse().unwrap(),
                "b:1.0.0".parse().unwrap(),
                "a:1.0.0".parse().unwrap(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle: a:1.0.0 -> b:1.0.0 -> a:1.0.0"
        );
    }

    #[test]
    fn test_unsatisfied_message_names_requirer() {
        let err = ProvisionError::UnsatisfiedRequirement {
            requirement: "Requirement[svc] of a:1.0.0".into(),
            requirer: Some("a:1.0.0".parse().unwrap()),
        };
        assert_eq!(err.to_string(), "unsatisfied requirement Requirement[svc] of a:1.0.0");
    }
}
