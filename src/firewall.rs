pub mod comparator;
pub mod description;
pub mod gcloud_command;
pub mod synthesizer;

use crate::l4_type::L4LbType;
use serde::{Deserialize, Serialize};

const COMPUTE_API_PREFIX: &str = "https://www.googleapis.com/compute/v1/";

/// A firewall rule in the shape the provider stores it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ranges: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination_ranges: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_tags: Vec<String>,

    #[serde(default)]
    pub allowed: Vec<FirewallAllowed>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallAllowed {
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,

    /// Single ports ("80") or ranges ("8000-8080"); empty means every port of the protocol
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

/// The virtual network a rule attaches to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub network_url: String,
}

impl NetworkInfo {
    pub fn new(project_id: &str, network_name: &str) -> Self {
        Self {
            network_url: format!(
                "{}projects/{}/global/networks/{}",
                COMPUTE_API_PREFIX, project_id, network_name
            ),
        }
    }

    /// Short network name, accepting either a full URL, a partial resource link or a bare name
    pub fn name(&self) -> &str {
        name_from_link(&self.network_url)
    }
}

pub fn name_from_link(link: &str) -> &str {
    link.rsplit('/').next().unwrap_or(link)
}

/// Everything needed to build the firewall rule for one L4 load balancer purpose
/// (LB traffic to nodes, or health checks to nodes).
#[derive(Debug, Clone)]
pub struct FirewallParams {
    /// Stable identity of the rule on the provider side
    pub name: String,

    /// Frontend address of the load balancer; only used for the rule description
    pub ip: String,

    pub source_ranges: Vec<String>,

    /// Only applied when pinhole firewalls are enabled
    pub destination_ranges: Vec<String>,

    pub port_ranges: Vec<String>,
    pub node_names: Vec<String>,
    pub protocol: String,
    pub l4_type: L4LbType,
    pub network: NetworkInfo,
}

/// The object on whose behalf a rule is reconciled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub namespace: String,
    pub name: String,
}

impl OwnerRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// `<namespace>/<name>`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
