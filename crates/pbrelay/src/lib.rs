//! Relay from Productboard component webhooks to linked features.
//!
//! When a component is created or updated, the relay looks the component up
//! and creates a Blocked feature under it, named after the component. This
//! crate holds the transport-agnostic pieces; the HTTP endpoint lives in
//! `pbrelay-server`.
//!
//! # Modules
//!
//! - [`event`]: classifies inbound webhook payloads
//! - [`client`]: Productboard API client with retry
//! - [`retry`]: backoff policy injected into the client
//! - [`model`]: component and feature wire types
//! - [`error`]: error taxonomy

// Core types
pub mod constants;
pub mod error;
pub mod event;
pub mod model;
pub mod retry;

// HTTP client
pub mod client;

pub use client::{ClientConfig, ProductboardClient};
pub use error::{ApiError, RelayError};
pub use event::{normalize, normalize_bytes, ComponentEventKind, NormalizedEvent};
pub use model::{ComponentRecord, FeatureRequest};
pub use retry::RetryConfig;
