use crate::firewall::OwnerRef;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// Audit trail of the objects rules are reconciled for. Delivery is fire-and-forget.
pub trait EventSink: Send + Sync {
    fn notify(&self, owner: &OwnerRef, event_type: EventType, reason: &str, message: &str);
}

/// Writes one line per event to stdout
pub struct LogEventSink {}

impl LogEventSink {
    pub fn format<M: Display>(
        owner: &OwnerRef,
        event_type: EventType,
        reason: &str,
        message: M,
    ) -> String {
        let kind = match event_type {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        };

        format!("{owner} [{kind}] {reason}: {message}")
    }
}

impl EventSink for LogEventSink {
    fn notify(&self, owner: &OwnerRef, event_type: EventType, reason: &str, message: &str) {
        println!("{}", Self::format(owner, event_type, reason, message));
    }
}
