//! # Towline Core
//!
//! Shared types and traits for the Towline support bot.
//! This crate is the foundation — the hub and the binary depend on it.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod platform;
pub mod provider;
pub mod session;
pub mod text;
