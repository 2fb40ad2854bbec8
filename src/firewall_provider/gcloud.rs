use crate::firewall::gcloud_command::GcloudCommand;
use crate::firewall::FirewallRule;
use crate::firewall_provider::{CloudContext, FirewallProvider, ProviderError};
use crate::tag_resolver::{TagResolutionError, TagResolver};
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Talks to Compute Engine through the `gcloud` CLI.
///
/// Firewall rules live in the network project, instances in the cluster's own project.
pub struct GcloudFirewallProvider {
    gcloud_path: String,
    cloud: CloudContext,
}

#[derive(Deserialize)]
struct Instance {
    name: String,
    #[serde(default)]
    tags: InstanceTags,
}

#[derive(Default, Deserialize)]
struct InstanceTags {
    #[serde(default)]
    items: Vec<String>,
}

impl GcloudFirewallProvider {
    pub fn new(gcloud_path: String, cloud: CloudContext) -> anyhow::Result<Self> {
        log::info!(
            "Using gcloud provider, project \"{}\", network project \"{}\"",
            cloud.project_id,
            cloud.network_project_id
        );

        Self::handle_process_output(
            &gcloud_path,
            &["--version".to_string()],
            "gcloud",
            std::process::Command::new(&gcloud_path)
                .arg("--version")
                .output(),
        )
        .with_context(|| format!("'{}' is not usable", gcloud_path))?;

        Ok(Self { gcloud_path, cloud })
    }

    fn run(&self, command: &GcloudCommand, resource: &str) -> Result<String, ProviderError> {
        let args = command.args();
        log::trace!("Running {}", command);
        Self::handle_process_output(
            &self.gcloud_path,
            args,
            resource,
            std::process::Command::new(&self.gcloud_path)
                .args(args)
                .output(),
        )
    }

    fn handle_process_output(
        program: &str,
        args: &[String],
        resource: &str,
        output: std::io::Result<std::process::Output>,
    ) -> Result<String, ProviderError> {
        match output {
            Ok(output) => {
                if output.status.success() {
                    return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
                }

                let stderr = String::from_utf8_lossy(&output.stderr);
                let stderr = stderr.trim_end();
                log::debug!(
                    "'{} {}' failed: [{}] {}",
                    program,
                    args.join(" "),
                    output.status,
                    stderr
                );
                Err(classify_stderr(resource, stderr))
            }
            Err(e) => Err(anyhow!(e)
                .context(format!("Failed to start {}", program))
                .into()),
        }
    }
}

/// Sorts a failed call into the provider error taxonomy by gcloud's error text
fn classify_stderr(resource: &str, stderr: &str) -> ProviderError {
    if stderr.contains("HTTPError 404") || stderr.contains("was not found") {
        ProviderError::NotFound {
            name: resource.to_string(),
        }
    } else if stderr.contains("HTTPError 403")
        || stderr.contains("PERMISSION_DENIED")
        || (stderr.contains("Required '") && stderr.contains("' permission"))
    {
        ProviderError::PermissionDenied {
            message: stderr.to_string(),
        }
    } else {
        ProviderError::Other(anyhow!("gcloud failed: {}", stderr))
    }
}

/// Picks, for every node, the longest of its tags that the instance name starts with.
/// Other tags on a node may be shared with unrelated instances and are left out.
fn tags_from_instances(
    node_names: &[String],
    instances_json: &str,
) -> Result<Vec<String>, TagResolutionError> {
    let instances: Vec<Instance> = serde_json::from_str(instances_json)
        .context("Failed to parse instance list returned by gcloud")?;

    let unknown = node_names
        .iter()
        .filter(|node| !instances.iter().any(|i| &i.name == *node))
        .cloned()
        .collect::<Vec<_>>();
    if !unknown.is_empty() {
        return Err(TagResolutionError::UnknownNodes(unknown));
    }

    let mut tags = BTreeSet::new();
    let mut untagged = Vec::new();
    for instance in instances.iter().filter(|i| node_names.contains(&i.name)) {
        match instance
            .tags
            .items
            .iter()
            .filter(|tag| instance.name.starts_with(tag.as_str()))
            .max_by_key(|tag| tag.len())
        {
            Some(tag) => {
                tags.insert(tag.clone());
            }
            None => untagged.push(instance.name.clone()),
        }
    }
    if !untagged.is_empty() {
        return Err(TagResolutionError::NoTags(untagged));
    }

    Ok(tags.into_iter().collect())
}

impl FirewallProvider for GcloudFirewallProvider {
    fn get(&self, name: &str) -> Result<FirewallRule, ProviderError> {
        let command =
            GcloudCommand::describe(name, &self.cloud.network_project_id).arg("--format=json");
        let output = self.run(&command, name)?;
        let rule: FirewallRule = serde_json::from_str(&output)
            .with_context(|| format!("Failed to parse firewall rule '{}'", name))?;
        Ok(rule)
    }

    fn create(&self, rule: &FirewallRule) -> Result<(), ProviderError> {
        let command = GcloudCommand::create(rule, &self.cloud.network_project_id).arg("--quiet");
        self.run(&command, &rule.name).map(|_| ())
    }

    fn patch(&self, rule: &FirewallRule) -> Result<(), ProviderError> {
        let command = GcloudCommand::update(rule, &self.cloud.network_project_id).arg("--quiet");
        self.run(&command, &rule.name).map(|_| ())
    }

    fn delete(&self, name: &str) -> Result<(), ProviderError> {
        let command = GcloudCommand::delete(name, &self.cloud.network_project_id).arg("--quiet");
        self.run(&command, name).map(|_| ())
    }
}

impl TagResolver for GcloudFirewallProvider {
    fn resolve(&self, node_names: &[String]) -> Result<Vec<String>, TagResolutionError> {
        if node_names.is_empty() {
            return Err(TagResolutionError::NoNodes);
        }

        let command = GcloudCommand::list_instances(node_names, &self.cloud.project_id)
            .arg("--format=json");
        let output = self
            .run(&command, "instances")
            .context("Failed to list node instances")?;

        tags_from_instances(node_names, &output)
    }
}
