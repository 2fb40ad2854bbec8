use serde::{Deserialize, Serialize};
use thiserror::Error;

const SHARED_RESOURCE_DESCRIPTION: &str =
    "This resource is shared by all L4 Services using ExternalTrafficPolicy: Cluster.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    #[default]
    Ga,
    Beta,
    Alpha,
}

/// Structured annotation stored in a rule's free-text description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct L4ResourceDescription {
    #[serde(rename = "networking.gke.io/service-name", default)]
    pub service_name: String,

    #[serde(
        rename = "networking.gke.io/service-ip",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub service_ip: String,

    #[serde(
        rename = "networking.gke.io/api-version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub api_version: Option<ApiVersion>,

    #[serde(
        rename = "networking.gke.io/resource-description",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub resource_description: String,
}

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("Failed to encode resource description")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode resource description '{description}'")]
    Decode {
        description: String,
        #[source]
        source: serde_json::Error,
    },
}

impl L4ResourceDescription {
    pub fn encode(&self) -> Result<String, DescriptionError> {
        serde_json::to_string(self).map_err(DescriptionError::Encode)
    }

    pub fn decode(description: &str) -> Result<Self, DescriptionError> {
        serde_json::from_str(description).map_err(|source| DescriptionError::Decode {
            description: description.to_string(),
            source,
        })
    }

    /// Shared rules are not attributed to any single service
    pub fn is_shared(&self) -> bool {
        self.service_name.is_empty() && self.resource_description == SHARED_RESOURCE_DESCRIPTION
    }
}

/// Renders the description of a rule the reconciler is about to write
pub trait DescriptionCodec: Send + Sync {
    fn encode(
        &self,
        owner_key: &str,
        ip: &str,
        api_version: ApiVersion,
        shared: bool,
    ) -> Result<String, DescriptionError>;
}

/// JSON annotation understood by the rest of the cluster tooling
pub struct L4DescriptionCodec {}

impl DescriptionCodec for L4DescriptionCodec {
    fn encode(
        &self,
        owner_key: &str,
        ip: &str,
        api_version: ApiVersion,
        shared: bool,
    ) -> Result<String, DescriptionError> {
        make_l4_firewall_description(owner_key, ip, api_version, shared)
    }
}

pub fn make_l4_firewall_description(
    owner_key: &str,
    ip: &str,
    api_version: ApiVersion,
    shared: bool,
) -> Result<String, DescriptionError> {
    let description = if shared {
        L4ResourceDescription {
            api_version: Some(api_version),
            resource_description: SHARED_RESOURCE_DESCRIPTION.to_string(),
            ..Default::default()
        }
    } else {
        L4ResourceDescription {
            service_name: owner_key.to_string(),
            service_ip: ip.to_string(),
            api_version: Some(api_version),
            ..Default::default()
        }
    };

    description.encode()
}
