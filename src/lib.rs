//! Emotive Chat - structured persona replies from chat-completion providers
//!
//! This crate asks an OpenAI-compatible provider for a `{reply, emotion}`
//! object, negotiating down to whatever structured-output support the
//! provider has, and streams the reply text out as it is generated.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
