pub mod gcloud;
pub mod noop;

use crate::firewall::FirewallRule;
use thiserror::Error;

/// Remote store of firewall rules, addressed by rule name.
///
/// Every call is a single blocking round trip; retries are up to whoever drives
/// reconciliation.
pub trait FirewallProvider: Send + Sync {
    fn get(&self, name: &str) -> Result<FirewallRule, ProviderError>;

    fn create(&self, rule: &FirewallRule) -> Result<(), ProviderError>;

    /// Replaces allowed entries, ranges, tags and description of the rule named `rule.name`
    fn patch(&self, rule: &FirewallRule) -> Result<(), ProviderError>;

    fn delete(&self, name: &str) -> Result<(), ProviderError>;
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Firewall rule '{name}' was not found")]
    NotFound { name: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// Maps not-found to `None`, for calls where absence is a normal outcome
pub fn ignore_not_found<T>(result: Result<T, ProviderError>) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// The projects involved in a call. When the network belongs to another (host)
/// project, the cluster is on a shared VPC ("XPN") and firewall changes usually
/// have to be made by the host project's administrators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudContext {
    pub project_id: String,
    pub network_project_id: String,
}

impl CloudContext {
    pub fn new(project_id: impl Into<String>, network_project_id: Option<String>) -> Self {
        let project_id = project_id.into();
        Self {
            network_project_id: network_project_id.unwrap_or_else(|| project_id.clone()),
            project_id,
        }
    }

    pub fn on_xpn(&self) -> bool {
        self.project_id != self.network_project_id
    }
}
