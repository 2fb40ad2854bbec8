use super::{name_from_link, FirewallRule};
use std::fmt;

/// A `gcloud` invocation, kept as separate arguments so the same value can be executed
/// directly or shown to an operator as a copy-pasteable command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcloudCommand {
    args: Vec<String>,
}

impl GcloudCommand {
    fn firewall_rules(verb: &str, name: &str) -> Self {
        Self {
            args: vec![
                "compute".to_string(),
                "firewall-rules".to_string(),
                verb.to_string(),
                name.to_string(),
            ],
        }
    }

    pub fn create(rule: &FirewallRule, project_id: &str) -> Self {
        let mut command = Self::firewall_rules("create", &rule.name);
        command.flag("--network", name_from_link(&rule.network));
        command.rule_flags(rule, project_id, false);
        command
    }

    /// Replaces every field of an existing rule. Empty lists are sent as empty values,
    /// which clears them on the remote rule.
    pub fn update(rule: &FirewallRule, project_id: &str) -> Self {
        let mut command = Self::firewall_rules("update", &rule.name);
        command.rule_flags(rule, project_id, true);
        command
    }

    pub fn delete(name: &str, project_id: &str) -> Self {
        let mut command = Self::firewall_rules("delete", name);
        command.flag("--project", project_id);
        command
    }

    pub fn describe(name: &str, project_id: &str) -> Self {
        let mut command = Self::firewall_rules("describe", name);
        command.flag("--project", project_id);
        command
    }

    /// Lists the named instances; used to look up node network tags
    pub fn list_instances(node_names: &[String], project_id: &str) -> Self {
        let mut command = Self {
            args: vec![
                "compute".to_string(),
                "instances".to_string(),
                "list".to_string(),
            ],
        };
        command.flag("--filter", &format!("name=({})", node_names.join(" ")));
        command.flag("--project", project_id);
        command
    }

    /// Appends an argument that only matters when the command is executed
    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn flag(&mut self, name: &str, value: &str) {
        self.args.push(name.to_string());
        self.args.push(value.to_string());
    }

    fn list_flag(&mut self, name: &str, values: &[String], send_empty: bool) {
        if values.is_empty() && !send_empty {
            return;
        }
        // Sorted so that repeated remediation events for the same rule are identical
        let mut values = values.to_vec();
        values.sort();
        self.flag(name, &values.join(","));
    }

    fn rule_flags(&mut self, rule: &FirewallRule, project_id: &str, send_empty: bool) {
        let allow = rule
            .allowed
            .iter()
            .flat_map(|allowed| {
                if allowed.ports.is_empty() {
                    vec![allowed.ip_protocol.clone()]
                } else {
                    allowed
                        .ports
                        .iter()
                        .map(|port| format!("{}:{}", allowed.ip_protocol, port))
                        .collect()
                }
            })
            .collect::<Vec<_>>();

        self.flag("--description", &rule.description);
        self.list_flag("--allow", &allow, false);
        self.list_flag("--source-ranges", &rule.source_ranges, send_empty);
        self.list_flag("--target-tags", &rule.target_tags, send_empty);
        self.list_flag("--destination-ranges", &rule.destination_ranges, send_empty);
        self.flag("--project", project_id);
    }
}

impl fmt::Display for GcloudCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "gcloud")?;
        for arg in &self.args {
            if needs_quoting(arg) {
                // Single quotes keep the shell from expanding anything inside
                write!(f, " '{}'", arg.replace('\'', "'\\''"))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

fn needs_quoting(arg: &str) -> bool {
    arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || "\"'`$\\{}()[]<>|&;*?!#~".contains(c))
}
