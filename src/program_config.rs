use clap::{Args, Parser, Subcommand, ValueEnum};
use ipnet::IpNet;
use l4_firewall::firewall::OwnerRef;
use l4_firewall::l4_type::L4LbType;
use std::net::IpAddr;

#[derive(Debug, Parser)]
#[clap(name = "l4-firewall")]
pub struct ProgramConfig {
    #[clap(flatten)]
    pub cloud: CloudConfig,

    #[clap(flatten)]
    pub provider: ProviderConfig,

    /// Restrict rules to the load balancer's destination ranges
    #[clap(long, env)]
    pub enable_pinhole: bool,

    /// Repeat the operation every given number of seconds until interrupted
    #[clap(long, env)]
    pub resync_interval: Option<u64>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct CloudConfig {
    /// Project the cluster and its nodes belong to
    #[clap(long, env)]
    pub project: String,

    /// Project owning the VPC network, if it is shared from another project
    #[clap(long, env)]
    pub network_project: Option<String>,

    /// VPC network the rules attach to
    #[clap(long, env, default_value = "default")]
    pub network: String,
}

#[derive(Debug, Args)]
pub struct ProviderConfig {
    /// Firewall provider
    #[clap(long = "provider", env = "PROVIDER", value_enum, ignore_case = true)]
    pub kind: ProviderKind,

    /// gcloud executable (gcloud provider only)
    #[clap(long, env, default_value = "gcloud")]
    pub gcloud_path: String,

    /// Network tags shared by all nodes; looked up per node when omitted
    #[clap(long, env, value_delimiter = ',', required_if_eq("kind", "none"))]
    pub node_tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[allow(non_camel_case_types)]
pub enum ProviderKind {
    none,
    gcloud,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ensure the rule admitting load balancer traffic to the nodes
    Ensure(RuleArgs),

    /// Ensure the rule admitting health check probes to the nodes
    EnsureHealthCheck {
        #[clap(flatten)]
        rule: RuleArgs,

        /// The rule is shared by several services
        #[clap(long)]
        shared: bool,
    },

    /// Delete a rule
    Delete {
        /// Rule name
        #[clap(long)]
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct RuleArgs {
    /// Rule name
    #[clap(long)]
    pub name: String,

    /// Service the rule belongs to, as <namespace>/<name>
    #[clap(long, value_parser = parse_owner)]
    pub owner: OwnerRef,

    /// Load balancer frontend IP address
    #[clap(long)]
    pub ip: Option<IpAddr>,

    /// Protocol, e.g. tcp or udp
    #[clap(long, default_value = "tcp")]
    pub protocol: String,

    /// Ports or port ranges, e.g. 80,8000-8080
    #[clap(long = "ports", value_delimiter = ',')]
    pub port_ranges: Vec<String>,

    /// Allowed source CIDRs
    #[clap(long, value_delimiter = ',')]
    pub source_ranges: Vec<IpNet>,

    /// Destination CIDRs (only applied with --enable-pinhole)
    #[clap(long, value_delimiter = ',')]
    pub destination_ranges: Vec<IpNet>,

    /// Names of the nodes the rule targets
    #[clap(long = "nodes", value_delimiter = ',', required = true)]
    pub node_names: Vec<String>,

    /// Load balancer type (ILB or NetLB)
    #[clap(long, value_parser = parse_l4_type, default_value = "ILB")]
    pub l4_type: L4LbType,
}

fn parse_owner(input: &str) -> Result<OwnerRef, String> {
    match input.split_once('/') {
        Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
            Ok(OwnerRef::new(namespace, name))
        }
        _ => Err(format!("'{}' is not of the form <namespace>/<name>", input)),
    }
}

fn parse_l4_type(input: &str) -> Result<L4LbType, String> {
    L4LbType::parse(input).ok_or_else(|| format!("Unknown load balancer type '{}'", input))
}

impl ProgramConfig {
    pub fn parse() -> Self {
        Parser::parse()
    }
}
