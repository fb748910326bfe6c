//! oVirt/RHV engine backend.
//!
//! Talks to the engine's REST API v4 with JSON bodies and HTTP basic auth.

mod client;
mod wire;

pub use client::{OvirtClient, OvirtConfig};
