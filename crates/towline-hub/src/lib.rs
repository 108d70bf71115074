//! # Towline Hub
//!
//! Full support-bot implementation: Chatwoot platform client, completion
//! gateway, keyword-retrieval knowledge base, scripted intake scenarios,
//! the conversation dispatcher with operator-fallback timers, runtime
//! metrics, and the webhook HTTP API.

pub mod api;
pub mod chatwoot;
pub mod dispatcher;
pub mod gateway;
pub mod metrics;
pub mod middleware;
pub mod providers;
pub mod retrieval;
pub mod scenarios;

#[cfg(test)]
pub(crate) mod testing;
