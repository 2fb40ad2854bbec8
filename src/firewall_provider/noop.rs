use crate::firewall::FirewallRule;
use crate::firewall_provider::{FirewallProvider, ProviderError};

/// Dry-run provider: no rule ever exists and every change is only logged
pub struct NoopFirewallProvider {
    _priv: (),
}

impl NoopFirewallProvider {
    pub fn new() -> Self {
        log::info!("Firewall provider is disabled, changes will only be logged");
        Self { _priv: () }
    }
}

impl Default for NoopFirewallProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FirewallProvider for NoopFirewallProvider {
    fn get(&self, name: &str) -> Result<FirewallRule, ProviderError> {
        Err(ProviderError::NotFound {
            name: name.to_string(),
        })
    }

    fn create(&self, rule: &FirewallRule) -> Result<(), ProviderError> {
        log::info!("Would create firewall rule {:?}", rule);
        Ok(())
    }

    fn patch(&self, rule: &FirewallRule) -> Result<(), ProviderError> {
        log::info!("Would patch firewall rule {:?}", rule);
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), ProviderError> {
        log::info!("Would delete firewall rule \"{}\"", name);
        Ok(())
    }
}
