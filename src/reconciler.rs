pub mod xpn;

use crate::event_sink::{EventSink, EventType};
use crate::firewall::comparator::rules_equal;
use crate::firewall::description::{
    ApiVersion, DescriptionCodec, L4DescriptionCodec, L4ResourceDescription,
};
use crate::firewall::gcloud_command::GcloudCommand;
use crate::firewall::synthesizer::desired_rule;
use crate::firewall::{FirewallParams, OwnerRef};
use crate::firewall_provider::{ignore_not_found, CloudContext, FirewallProvider, ProviderError};
use crate::reconciler::xpn::{is_xpn_permission_failure, XpnError};
use crate::tag_resolver::{TagResolutionError, TagResolver};
use std::sync::Arc;
use thiserror::Error;

const XPN_EVENT_REASON: &str = "XPN";

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcilerConfig {
    /// Narrow rules to the load balancer's destination ranges
    pub enable_pinhole: bool,
}

#[derive(Debug, Error)]
pub enum EnsureError {
    #[error("Failed to resolve target tags")]
    TagResolution(#[from] TagResolutionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    SharedNetwork(#[from] XpnError),
}

/// Converges provider-side firewall rules towards the rules L4 load balancers need.
///
/// Each call issues at most one fetch and one mutating request. Nothing is retried or
/// remembered between calls.
pub struct Reconciler {
    provider: Arc<dyn FirewallProvider>,
    tag_resolver: Arc<dyn TagResolver>,
    descriptions: Arc<dyn DescriptionCodec>,
    cloud: CloudContext,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn FirewallProvider>,
        tag_resolver: Arc<dyn TagResolver>,
        cloud: CloudContext,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            provider,
            tag_resolver,
            descriptions: Arc::new(L4DescriptionCodec {}),
            cloud,
            config,
        }
    }

    pub fn with_description_codec(mut self, descriptions: Arc<dyn DescriptionCodec>) -> Self {
        self.descriptions = descriptions;
        self
    }

    /// Creates the rule described by `params`, or patches the existing rule of the same
    /// name when it differs. Shared rules are compared without their description.
    pub fn ensure_rule(
        &self,
        owner_key: &str,
        params: &FirewallParams,
        shared: bool,
    ) -> Result<(), EnsureError> {
        let existing = ignore_not_found(self.provider.get(&params.name))?;

        let target_tags = self.tag_resolver.resolve(&params.node_names)?;

        // The description is metadata only, a rule without one still grants the right access
        let description = match self.descriptions.encode(
            owner_key,
            &params.ip,
            ApiVersion::Ga,
            shared,
        ) {
            Ok(description) => description,
            Err(e) => {
                log::info!(
                    "Failed to generate description for firewall rule \"{}\" ({}): {}",
                    params.name,
                    params.l4_type,
                    e
                );
                String::new()
            }
        };

        let expected = desired_rule(params, target_tags, description, self.config.enable_pinhole);

        let existing = match existing {
            Some(existing) => existing,
            None => {
                log::debug!(
                    "Creating firewall rule \"{}\" ({})",
                    params.name,
                    params.l4_type
                );
                return self.provider.create(&expected).map_err(|e| {
                    self.classify_failure(e, &params.name, "create", || {
                        GcloudCommand::create(&expected, &self.cloud.network_project_id)
                    })
                });
            }
        };

        if rules_equal(&expected, &existing, shared) {
            log::trace!("Firewall rule \"{}\" is up to date", params.name);
            return Ok(());
        }

        if !shared {
            if let Ok(previous) = L4ResourceDescription::decode(&existing.description) {
                if !previous.is_shared() && previous.service_name != owner_key {
                    log::warn!(
                        "Firewall rule \"{}\" was last written for \"{}\", taking it over for \"{}\"",
                        params.name,
                        previous.service_name,
                        owner_key
                    );
                }
            }
        }

        log::debug!(
            "Patching firewall rule \"{}\" ({})",
            params.name,
            params.l4_type
        );
        self.provider.patch(&expected).map_err(|e| {
            self.classify_failure(e, &params.name, "patch", || {
                GcloudCommand::update(&expected, &self.cloud.network_project_id)
            })
        })
    }

    /// Deletes the named rule; a rule that is already gone counts as deleted
    pub fn ensure_rule_deleted(&self, name: &str) -> Result<(), EnsureError> {
        match ignore_not_found(self.provider.delete(name)) {
            Ok(_) => Ok(()),
            Err(e) => Err(self.classify_failure(e, name, "delete", || {
                GcloudCommand::delete(name, &self.cloud.network_project_id)
            })),
        }
    }

    /// Like [`Self::ensure_rule`], but a change that only the host project of a shared
    /// network can make is reported as an event on `owner` instead of an error.
    pub fn ensure_rule_for_owner(
        &self,
        owner: &OwnerRef,
        params: &FirewallParams,
        shared: bool,
        events: &dyn EventSink,
    ) -> Result<(), EnsureError> {
        match self.ensure_rule(&owner.key(), params, shared) {
            Err(EnsureError::SharedNetwork(e)) => {
                events.notify(owner, EventType::Normal, XPN_EVENT_REASON, &e.message);
                Ok(())
            }
            result => result,
        }
    }

    /// Rule admitting health check probes to the nodes, possibly shared between services
    pub fn ensure_firewall_for_health_check(
        &self,
        owner: &OwnerRef,
        params: &FirewallParams,
        shared: bool,
        events: &dyn EventSink,
    ) -> Result<(), EnsureError> {
        self.ensure_rule_for_owner(owner, params, shared, events)
    }

    /// Rule admitting load balancer traffic to the nodes; never shared
    pub fn ensure_firewall_for_nodes(
        &self,
        owner: &OwnerRef,
        params: &FirewallParams,
        events: &dyn EventSink,
    ) -> Result<(), EnsureError> {
        self.ensure_rule_for_owner(owner, params, false, events)
    }

    fn classify_failure(
        &self,
        err: ProviderError,
        name: &str,
        operation: &str,
        command: impl FnOnce() -> GcloudCommand,
    ) -> EnsureError {
        if !is_xpn_permission_failure(&err, &self.cloud) {
            return err.into();
        }

        let command = command();
        log::info!(
            "Could not {} firewall rule \"{}\" on XPN cluster, raising event for `{}`: {}",
            operation,
            name,
            command,
            err
        );
        XpnError::new(err, &command).into()
    }
}
