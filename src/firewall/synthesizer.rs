use super::{FirewallAllowed, FirewallParams, FirewallRule};

/// Builds the desired rule for `params`.
///
/// Destination ranges are only carried over when pinhole firewalls are enabled,
/// whatever the caller supplied.
pub fn desired_rule(
    params: &FirewallParams,
    target_tags: Vec<String>,
    description: String,
    enable_pinhole: bool,
) -> FirewallRule {
    FirewallRule {
        name: params.name.clone(),
        description,
        network: params.network.network_url.clone(),
        source_ranges: params.source_ranges.clone(),
        destination_ranges: if enable_pinhole {
            params.destination_ranges.clone()
        } else {
            Vec::new()
        },
        target_tags,
        allowed: vec![FirewallAllowed {
            ip_protocol: params.protocol.to_lowercase(),
            ports: params.port_ranges.clone(),
        }],
    }
}
