//! Reconciles the firewall rules L4 load balancers need against a cloud provider.
//!
//! [`reconciler::Reconciler`] fetches the current rule, builds the desired one and
//! issues the single create or patch (or nothing) needed to converge. Permission
//! failures caused by a shared VPC network are turned into the `gcloud` command the
//! network owner has to run.

pub mod event_sink;
pub mod firewall;
pub mod firewall_provider;
pub mod l4_type;
pub mod reconciler;
pub mod tag_resolver;
