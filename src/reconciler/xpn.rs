use crate::firewall::gcloud_command::GcloudCommand;
use crate::firewall_provider::{CloudContext, ProviderError};
use thiserror::Error;

/// A change the cluster is not allowed to make itself because the network belongs to
/// a host project. Carries the command the host project's administrator has to run.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct XpnError {
    #[source]
    pub source: ProviderError,
    pub command: String,
    pub message: String,
}

impl XpnError {
    pub fn new(source: ProviderError, command: &GcloudCommand) -> Self {
        let command = command.to_string();
        Self {
            source,
            message: format!("Firewall change required by security admin: `{}`", command),
            command,
        }
    }
}

/// Whether `err` was caused by operating on a firewall of a network owned by another project
pub fn is_xpn_permission_failure(err: &ProviderError, cloud: &CloudContext) -> bool {
    err.is_forbidden() && cloud.on_xpn()
}
