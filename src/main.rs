mod program_config;

use crate::program_config::{Command, ProgramConfig, ProviderKind, RuleArgs};
use anyhow::Context;
use env_logger::Env;
use l4_firewall::event_sink::{EventSink, LogEventSink};
use l4_firewall::firewall::{FirewallParams, NetworkInfo, OwnerRef};
use l4_firewall::firewall_provider::gcloud::GcloudFirewallProvider;
use l4_firewall::firewall_provider::noop::NoopFirewallProvider;
use l4_firewall::firewall_provider::{CloudContext, FirewallProvider};
use l4_firewall::reconciler::{EnsureError, Reconciler, ReconcilerConfig};
use l4_firewall::tag_resolver::{StaticTagResolver, TagResolver};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};

const ALL_SOURCES: &str = "0.0.0.0/0";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse config
    let config = ProgramConfig::parse();

    // Set up logging
    env_logger::Builder::from_env(Env::default().default_filter_or(if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(None)
    .format_module_path(false)
    .init();

    run(config).await
}

/// One reconcile request, as selected on the command line
enum Operation {
    EnsureForNodes {
        owner: OwnerRef,
        params: FirewallParams,
    },
    EnsureForHealthCheck {
        owner: OwnerRef,
        params: FirewallParams,
        shared: bool,
    },
    Delete {
        name: String,
    },
}

impl Operation {
    fn new(command: Command, network: NetworkInfo) -> Self {
        match command {
            Command::Ensure(rule) => Self::EnsureForNodes {
                owner: rule.owner.clone(),
                params: firewall_params(rule, network, vec![ALL_SOURCES.to_string()]),
            },
            Command::EnsureHealthCheck { rule, shared } => Self::EnsureForHealthCheck {
                owner: rule.owner.clone(),
                params: {
                    let default_sources = rule.l4_type.health_check_source_ranges();
                    firewall_params(rule, network, default_sources)
                },
                shared,
            },
            Command::Delete { name } => Self::Delete { name },
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::EnsureForNodes { params, .. } | Self::EnsureForHealthCheck { params, .. } => {
                &params.name
            }
            Self::Delete { name } => name,
        }
    }

    fn run(&self, reconciler: &Reconciler, events: &dyn EventSink) -> Result<(), EnsureError> {
        match self {
            Self::EnsureForNodes { owner, params } => {
                reconciler.ensure_firewall_for_nodes(owner, params, events)
            }
            Self::EnsureForHealthCheck {
                owner,
                params,
                shared,
            } => reconciler.ensure_firewall_for_health_check(owner, params, *shared, events),
            Self::Delete { name } => reconciler.ensure_rule_deleted(name),
        }
    }
}

fn firewall_params(
    rule: RuleArgs,
    network: NetworkInfo,
    default_source_ranges: Vec<String>,
) -> FirewallParams {
    let source_ranges = if rule.source_ranges.is_empty() {
        default_source_ranges
    } else {
        rule.source_ranges.iter().map(|r| r.to_string()).collect()
    };

    FirewallParams {
        name: rule.name,
        ip: rule.ip.map(|ip| ip.to_string()).unwrap_or_default(),
        source_ranges,
        destination_ranges: rule
            .destination_ranges
            .iter()
            .map(|r| r.to_string())
            .collect(),
        port_ranges: rule.port_ranges,
        node_names: rule.node_names,
        protocol: rule.protocol,
        l4_type: rule.l4_type,
        network,
    }
}

async fn run(config: ProgramConfig) -> anyhow::Result<()> {
    let cloud = CloudContext::new(config.cloud.project, config.cloud.network_project);
    if cloud.on_xpn() {
        log::info!(
            "Network is owned by project \"{}\", firewall changes may need its administrators",
            cloud.network_project_id
        );
    }

    let node_tags = config.provider.node_tags;
    let provider: Arc<dyn FirewallProvider>;
    let tag_resolver: Arc<dyn TagResolver>;
    match config.provider.kind {
        ProviderKind::none => {
            provider = Arc::new(NoopFirewallProvider::new());
            tag_resolver = Arc::new(StaticTagResolver::new(node_tags));
        }
        ProviderKind::gcloud => {
            let gcloud = Arc::new(
                GcloudFirewallProvider::new(config.provider.gcloud_path, cloud.clone())
                    .context("Failed to initialize gcloud firewall provider")?,
            );
            tag_resolver = if node_tags.is_empty() {
                gcloud.clone()
            } else {
                Arc::new(StaticTagResolver::new(node_tags))
            };
            provider = gcloud;
        }
    }

    let network = NetworkInfo::new(&cloud.network_project_id, &config.cloud.network);
    let reconciler = Arc::new(Reconciler::new(
        provider,
        tag_resolver,
        cloud,
        ReconcilerConfig {
            enable_pinhole: config.enable_pinhole,
        },
    ));
    let operation = Arc::new(Operation::new(config.command, network));

    let interval = match config.resync_interval {
        Some(seconds) => Duration::from_secs(seconds.max(1)),
        None => {
            return reconcile(reconciler, operation.clone())
                .await
                .with_context(|| format!("Failed to reconcile firewall rule '{}'", operation.name()));
        }
    };

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to listen for SIGINT")?;
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    let mut sigquit = signal(SignalKind::quit()).context("Failed to listen for SIGQUIT")?;
    let mut ticker = tokio::time::interval(interval);

    log::info!(
        "Reconciling firewall rule \"{}\" every {}s",
        operation.name(),
        interval.as_secs()
    );

    // Failed attempts are simply retried on the next tick
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = reconcile(reconciler.clone(), operation.clone()).await {
                    log::warn!("Failed to reconcile firewall rule \"{}\": {:#}", operation.name(), e);
                }
            }
            _ = sigint.recv() => break,
            _ = sigterm.recv() => break,
            _ = sigquit.recv() => break,
        }
    }

    log::info!("Stopped.");

    Ok(())
}

async fn reconcile(reconciler: Arc<Reconciler>, operation: Arc<Operation>) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || operation.run(&reconciler, &LogEventSink {}))
        .await
        .context("Reconcile task panicked")??;

    log::debug!("Reconcile finished");
    Ok(())
}
