//! flowstat webhook - HTTP delivery of status events
//!
//! A [`WebhookClient`] pushes each accepted [`flowstat_core::StatusEvent`]
//! to one subscriber URL as a JSON [`WebhookPayload`], optionally signed
//! with HMAC-SHA256. All clients share one pooled transport.

pub mod client;
pub mod error;
pub mod payload;
pub mod transport;

pub use client::WebhookClient;
pub use error::{Result, WebhookError};
pub use payload::{compute_signature, verify_signature, WebhookPayload};
