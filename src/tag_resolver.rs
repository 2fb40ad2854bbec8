use thiserror::Error;

/// Maps compute node names to the network tags a rule must target
pub trait TagResolver: Send + Sync {
    fn resolve(&self, node_names: &[String]) -> Result<Vec<String>, TagResolutionError>;
}

#[derive(Debug, Error)]
pub enum TagResolutionError {
    #[error("No nodes given, cannot determine target tags")]
    NoNodes,

    #[error("No instance found for node(s) {}", .0.join(", "))]
    UnknownNodes(Vec<String>),

    #[error("No network tags found for node(s) {}", .0.join(", "))]
    NoTags(Vec<String>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Uses the same tags for every node, as configured for clusters whose nodes all
/// share a well-known tag
pub struct StaticTagResolver {
    tags: Vec<String>,
}

impl StaticTagResolver {
    pub fn new(tags: Vec<String>) -> Self {
        log::info!("Using static node tags {:?}", tags);
        Self { tags }
    }
}

impl TagResolver for StaticTagResolver {
    fn resolve(&self, node_names: &[String]) -> Result<Vec<String>, TagResolutionError> {
        if node_names.is_empty() {
            return Err(TagResolutionError::NoNodes);
        }
        if self.tags.is_empty() {
            return Err(TagResolutionError::NoTags(node_names.to_vec()));
        }
        Ok(self.tags.clone())
    }
}
