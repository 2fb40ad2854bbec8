use assert_matches::assert_matches;
use l4_firewall::event_sink::{EventSink, EventType};
use l4_firewall::firewall::description::{ApiVersion, DescriptionCodec, DescriptionError};
use l4_firewall::firewall::{FirewallAllowed, FirewallParams, FirewallRule, NetworkInfo, OwnerRef};
use l4_firewall::firewall_provider::{CloudContext, FirewallProvider, ProviderError};
use l4_firewall::l4_type::L4LbType;
use l4_firewall::reconciler::{EnsureError, Reconciler, ReconcilerConfig};
use l4_firewall::tag_resolver::{TagResolutionError, TagResolver};
use maplit::hashmap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Create(FirewallRule),
    Patch(FirewallRule),
    Delete(String),
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    PermissionDenied,
    Other,
}

impl Failure {
    fn error(self) -> ProviderError {
        match self {
            Self::PermissionDenied => ProviderError::PermissionDenied {
                message: "Required 'compute.firewalls.create' permission".to_string(),
            },
            Self::Other => ProviderError::Other(anyhow::anyhow!("backendError")),
        }
    }
}

#[derive(Default)]
struct ProviderState {
    rules: HashMap<String, FirewallRule>,
    calls: Vec<Call>,
    fail_get: Option<Failure>,
    fail_mutations: Option<Failure>,
}

/// Keeps rules in memory and records every mutating call
#[derive(Clone, Default)]
struct FakeProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl FakeProvider {
    fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    fn rule(&self, name: &str) -> Option<FirewallRule> {
        self.state.lock().unwrap().rules.get(name).cloned()
    }

    fn insert(&self, rule: FirewallRule) {
        self.state
            .lock()
            .unwrap()
            .rules
            .insert(rule.name.clone(), rule);
    }

    fn fail_get(&self, failure: Failure) {
        self.state.lock().unwrap().fail_get = Some(failure);
    }

    fn fail_mutations(&self, failure: Failure) {
        self.state.lock().unwrap().fail_mutations = Some(failure);
    }
}

impl FirewallProvider for FakeProvider {
    fn get(&self, name: &str) -> Result<FirewallRule, ProviderError> {
        let state = self.state.lock().unwrap();
        if let Some(failure) = state.fail_get {
            return Err(failure.error());
        }
        state
            .rules
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                name: name.to_string(),
            })
    }

    fn create(&self, rule: &FirewallRule) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(rule.clone()));
        if let Some(failure) = state.fail_mutations {
            return Err(failure.error());
        }
        state.rules.insert(rule.name.clone(), rule.clone());
        Ok(())
    }

    fn patch(&self, rule: &FirewallRule) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Patch(rule.clone()));
        if let Some(failure) = state.fail_mutations {
            return Err(failure.error());
        }
        state.rules.insert(rule.name.clone(), rule.clone());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(name.to_string()));
        if let Some(failure) = state.fail_mutations {
            return Err(failure.error());
        }
        match state.rules.remove(name) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotFound {
                name: name.to_string(),
            }),
        }
    }
}

/// Resolves known nodes to their instance tags
struct FakeTags {
    tags: HashMap<&'static str, &'static str>,
}

impl TagResolver for FakeTags {
    fn resolve(&self, node_names: &[String]) -> Result<Vec<String>, TagResolutionError> {
        let unknown = node_names
            .iter()
            .filter(|n| !self.tags.contains_key(n.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            return Err(TagResolutionError::UnknownNodes(unknown));
        }
        Ok(node_names
            .iter()
            .map(|n| self.tags[n.as_str()].to_string())
            .collect())
    }
}

/// Fails to render any description
struct BrokenDescriptions {}

impl DescriptionCodec for BrokenDescriptions {
    fn encode(
        &self,
        _owner_key: &str,
        _ip: &str,
        _api_version: ApiVersion,
        _shared: bool,
    ) -> Result<String, DescriptionError> {
        Err(DescriptionError::Encode(
            serde_json::from_str::<u8>("not json").unwrap_err(),
        ))
    }
}

#[derive(Default)]
struct RecordedEvents {
    events: Mutex<Vec<(OwnerRef, EventType, String, String)>>,
}

impl EventSink for RecordedEvents {
    fn notify(&self, owner: &OwnerRef, event_type: EventType, reason: &str, message: &str) {
        self.events.lock().unwrap().push((
            owner.clone(),
            event_type,
            reason.to_string(),
            message.to_string(),
        ));
    }
}

const SERVICE_PROJECT: &str = "service-project";
const HOST_PROJECT: &str = "host-project";

fn reconciler(provider: &FakeProvider, xpn: bool, enable_pinhole: bool) -> Reconciler {
    let network_project = if xpn { HOST_PROJECT } else { SERVICE_PROJECT };
    Reconciler::new(
        Arc::new(provider.clone()),
        Arc::new(FakeTags {
            tags: hashmap! {
                "n1" => "gke-n1",
                "n2" => "gke-n2",
            },
        }),
        CloudContext::new(SERVICE_PROJECT, Some(network_project.to_string())),
        ReconcilerConfig { enable_pinhole },
    )
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn params() -> FirewallParams {
    FirewallParams {
        name: "k8s-fw-abc".to_string(),
        ip: "10.1.2.3".to_string(),
        source_ranges: strings(&["10.0.0.0/8"]),
        destination_ranges: strings(&["10.1.2.3/32"]),
        port_ranges: strings(&["80", "443"]),
        node_names: strings(&["n1", "n2"]),
        protocol: "TCP".to_string(),
        l4_type: L4LbType::Ilb,
        network: NetworkInfo::new(SERVICE_PROJECT, "default"),
    }
}

fn owner() -> OwnerRef {
    OwnerRef::new("default", "my-svc")
}

#[test]
fn creates_missing_rule() {
    let provider = FakeProvider::default();
    reconciler(&provider, false, false)
        .ensure_rule("default/my-svc", &params(), false)
        .unwrap();

    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    let created = match &calls[0] {
        Call::Create(rule) => rule,
        other => panic!("expected create, got {:?}", other),
    };
    assert_eq!(created.name, "k8s-fw-abc");
    assert_eq!(
        created.allowed,
        vec![FirewallAllowed {
            ip_protocol: "tcp".to_string(),
            ports: strings(&["80", "443"]),
        }]
    );
    assert_eq!(created.target_tags, strings(&["gke-n1", "gke-n2"]));
    assert_eq!(created.source_ranges, strings(&["10.0.0.0/8"]));
    assert!(created.destination_ranges.is_empty());
    assert!(created.description.contains("default/my-svc"));
    assert!(created.network.ends_with("/global/networks/default"));
}

#[test]
fn second_ensure_is_a_no_op() {
    let provider = FakeProvider::default();
    let reconciler = reconciler(&provider, false, false);

    reconciler.ensure_rule("default/my-svc", &params(), false).unwrap();
    reconciler.ensure_rule("default/my-svc", &params(), false).unwrap();

    assert_eq!(provider.calls().len(), 1);
}

#[test]
fn reordered_fields_are_converged() {
    let provider = FakeProvider::default();
    let reconciler = reconciler(&provider, false, false);
    reconciler.ensure_rule("default/my-svc", &params(), false).unwrap();

    let mut permuted = params();
    permuted.port_ranges = strings(&["443", "80", "80"]);
    permuted.node_names = strings(&["n2", "n1"]);
    reconciler.ensure_rule("default/my-svc", &permuted, false).unwrap();

    assert_eq!(provider.calls().len(), 1);
}

#[test]
fn patches_rule_with_fewer_ports() {
    let provider = FakeProvider::default();
    let reconciler = reconciler(&provider, false, false);
    reconciler.ensure_rule("default/my-svc", &params(), false).unwrap();

    let mut stale = provider.rule("k8s-fw-abc").unwrap();
    stale.allowed[0].ports = strings(&["80"]);
    provider.insert(stale);

    reconciler.ensure_rule("default/my-svc", &params(), false).unwrap();

    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    assert_matches!(&calls[1], Call::Patch(rule) if rule.allowed[0].ports == strings(&["80", "443"]));
    assert_eq!(
        calls.iter().filter(|c| matches!(c, Call::Create(_))).count(),
        1
    );
}

#[test]
fn shared_rule_ignores_description() {
    let provider = FakeProvider::default();
    let reconciler = reconciler(&provider, false, false);
    reconciler.ensure_rule("default/my-svc", &params(), true).unwrap();

    let mut other_owner = provider.rule("k8s-fw-abc").unwrap();
    other_owner.description = "written by another service".to_string();
    provider.insert(other_owner);

    reconciler.ensure_rule("default/my-svc", &params(), true).unwrap();
    assert_eq!(provider.calls().len(), 1);

    reconciler.ensure_rule("default/my-svc", &params(), false).unwrap();
    assert_matches!(provider.calls().last(), Some(Call::Patch(_)));
}

#[test]
fn shared_rule_description_names_no_service() {
    let provider = FakeProvider::default();
    reconciler(&provider, false, false)
        .ensure_rule("default/my-svc", &params(), true)
        .unwrap();

    let created = provider.rule("k8s-fw-abc").unwrap();
    assert!(!created.description.contains("my-svc"));
    assert!(created.description.contains("shared"));
}

#[test]
fn pinhole_flag_controls_destination_ranges() {
    let provider = FakeProvider::default();
    reconciler(&provider, false, true)
        .ensure_rule("default/my-svc", &params(), false)
        .unwrap();
    assert_eq!(
        provider.rule("k8s-fw-abc").unwrap().destination_ranges,
        strings(&["10.1.2.3/32"])
    );

    // Turning the flag off narrows nothing any more, so the rule is patched
    reconciler(&provider, false, false)
        .ensure_rule("default/my-svc", &params(), false)
        .unwrap();
    assert_matches!(provider.calls().last(), Some(Call::Patch(rule)) if rule.destination_ranges.is_empty());
}

#[test]
fn fetch_failure_is_fatal() {
    let provider = FakeProvider::default();
    provider.fail_get(Failure::Other);

    assert_matches!(
        reconciler(&provider, false, false).ensure_rule("default/my-svc", &params(), false),
        Err(EnsureError::Provider(ProviderError::Other(_)))
    );
    assert!(provider.calls().is_empty());
}

#[test]
fn tag_resolution_failure_is_fatal() {
    let provider = FakeProvider::default();
    let mut params = params();
    params.node_names.push("n3".to_string());

    assert_matches!(
        reconciler(&provider, false, false).ensure_rule("default/my-svc", &params, false),
        Err(EnsureError::TagResolution(TagResolutionError::UnknownNodes(nodes))) if nodes == strings(&["n3"])
    );
    assert!(provider.calls().is_empty());
}

#[test]
fn tag_resolution_failure_blocks_patch() {
    let provider = FakeProvider::default();
    let reconciler = reconciler(&provider, false, false);
    reconciler.ensure_rule("default/my-svc", &params(), false).unwrap();

    let mut stale = provider.rule("k8s-fw-abc").unwrap();
    stale.allowed[0].ports = strings(&["80"]);
    provider.insert(stale.clone());

    let mut params = params();
    params.node_names.push("n3".to_string());
    assert_matches!(
        reconciler.ensure_rule("default/my-svc", &params, false),
        Err(EnsureError::TagResolution(TagResolutionError::UnknownNodes(nodes))) if nodes == strings(&["n3"])
    );

    assert_eq!(provider.calls().len(), 1);
    assert_eq!(provider.rule("k8s-fw-abc").unwrap(), stale);
}

#[test]
fn description_failure_still_creates_rule() {
    let provider = FakeProvider::default();
    reconciler(&provider, false, false)
        .with_description_codec(Arc::new(BrokenDescriptions {}))
        .ensure_rule("default/my-svc", &params(), false)
        .unwrap();

    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert_matches!(&calls[0], Call::Create(rule) => {
        assert!(rule.description.is_empty());
        assert_eq!(rule.target_tags, strings(&["gke-n1", "gke-n2"]));
        assert_eq!(rule.allowed[0].ports, strings(&["80", "443"]));
    });
}

#[test]
fn permission_denied_without_shared_network() {
    let provider = FakeProvider::default();
    provider.fail_mutations(Failure::PermissionDenied);

    assert_matches!(
        reconciler(&provider, false, false).ensure_rule("default/my-svc", &params(), false),
        Err(EnsureError::Provider(ProviderError::PermissionDenied { .. }))
    );
}

#[test]
fn permission_denied_on_shared_network_create() {
    let provider = FakeProvider::default();
    provider.fail_mutations(Failure::PermissionDenied);

    let err = reconciler(&provider, true, false)
        .ensure_rule("default/my-svc", &params(), false)
        .unwrap_err();

    assert_matches!(err, EnsureError::SharedNetwork(e) => {
        assert!(e.command.starts_with("gcloud compute firewall-rules create k8s-fw-abc"));
        assert!(e.command.ends_with("--project host-project"));
        assert!(e.message.contains(&e.command));
        assert_matches!(e.source, ProviderError::PermissionDenied { .. });
    });
    assert_eq!(provider.calls().len(), 1);
}

#[test]
fn permission_denied_on_shared_network_patch() {
    let provider = FakeProvider::default();
    let reconciler = reconciler(&provider, true, false);
    reconciler.ensure_rule("default/my-svc", &params(), false).unwrap();

    let mut stale = provider.rule("k8s-fw-abc").unwrap();
    stale.source_ranges = strings(&["0.0.0.0/0"]);
    provider.insert(stale);
    provider.fail_mutations(Failure::PermissionDenied);

    assert_matches!(
        reconciler.ensure_rule("default/my-svc", &params(), false),
        Err(EnsureError::SharedNetwork(e)) if e.command.starts_with("gcloud compute firewall-rules update k8s-fw-abc")
    );
}

#[test]
fn other_errors_on_shared_network_are_not_wrapped() {
    let provider = FakeProvider::default();
    provider.fail_mutations(Failure::Other);

    assert_matches!(
        reconciler(&provider, true, false).ensure_rule("default/my-svc", &params(), false),
        Err(EnsureError::Provider(ProviderError::Other(_)))
    );
}

#[test]
fn shared_network_failure_becomes_event() {
    let provider = FakeProvider::default();
    provider.fail_mutations(Failure::PermissionDenied);
    let events = RecordedEvents::default();

    reconciler(&provider, true, false)
        .ensure_rule_for_owner(&owner(), &params(), false, &events)
        .unwrap();

    let events = events.events.into_inner().unwrap();
    assert_eq!(events.len(), 1);
    let (event_owner, event_type, reason, message) = &events[0];
    assert_eq!(event_owner, &owner());
    assert_eq!(*event_type, EventType::Normal);
    assert_eq!(reason, "XPN");
    assert!(message.starts_with("Firewall change required by security admin: `gcloud compute firewall-rules create"));
}

#[test]
fn other_failures_are_not_events() {
    let provider = FakeProvider::default();
    provider.fail_mutations(Failure::PermissionDenied);
    let events = RecordedEvents::default();

    assert_matches!(
        reconciler(&provider, false, false).ensure_firewall_for_nodes(&owner(), &params(), &events),
        Err(EnsureError::Provider(ProviderError::PermissionDenied { .. }))
    );
    assert!(events.events.into_inner().unwrap().is_empty());
}

#[test]
fn node_rules_are_never_shared() {
    let provider = FakeProvider::default();
    let reconciler = reconciler(&provider, false, false);
    let events = RecordedEvents::default();
    reconciler
        .ensure_firewall_for_health_check(&owner(), &params(), true, &events)
        .unwrap();

    let mut other_owner = provider.rule("k8s-fw-abc").unwrap();
    other_owner.description = "written by another service".to_string();
    provider.insert(other_owner);

    reconciler
        .ensure_firewall_for_health_check(&owner(), &params(), true, &events)
        .unwrap();
    assert_eq!(provider.calls().len(), 1);

    reconciler
        .ensure_firewall_for_nodes(&owner(), &params(), &events)
        .unwrap();
    assert_matches!(provider.calls().last(), Some(Call::Patch(rule)) if rule.description.contains("default/my-svc"));
}

#[test]
fn deleting_missing_rule_succeeds() {
    let provider = FakeProvider::default();
    reconciler(&provider, false, false)
        .ensure_rule_deleted("k8s-fw-abc")
        .unwrap();
    assert_eq!(provider.calls(), vec![Call::Delete("k8s-fw-abc".to_string())]);
}

#[test]
fn deletes_existing_rule() {
    let provider = FakeProvider::default();
    let reconciler = reconciler(&provider, false, false);
    reconciler.ensure_rule("default/my-svc", &params(), false).unwrap();

    reconciler.ensure_rule_deleted("k8s-fw-abc").unwrap();
    assert!(provider.rule("k8s-fw-abc").is_none());
}

#[test]
fn delete_on_shared_network() {
    let provider = FakeProvider::default();
    provider.fail_mutations(Failure::PermissionDenied);

    assert_matches!(
        reconciler(&provider, true, false).ensure_rule_deleted("k8s-fw-abc"),
        Err(EnsureError::SharedNetwork(e))
            if e.command == "gcloud compute firewall-rules delete k8s-fw-abc --project host-project"
    );

    assert_matches!(
        reconciler(&provider, false, false).ensure_rule_deleted("k8s-fw-abc"),
        Err(EnsureError::Provider(ProviderError::PermissionDenied { .. }))
    );
}
