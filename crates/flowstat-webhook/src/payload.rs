//! Webhook request body and signing
//!
//! The signature is HMAC-SHA256 over the JSON bytes of the payload with the
//! `signature` field absent, hex-encoded in lowercase and carried inside the
//! body itself.

use flowstat_core::{EventType, StatusEvent};
use ring::hmac;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: EventType,
    pub status: StatusEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl WebhookPayload {
    pub fn new(status: StatusEvent) -> Self {
        Self {
            event: status.event_type,
            status,
            signature: None,
        }
    }

    /// Serialized form without the signature, i.e. the signed bytes
    pub fn unsigned_bytes(&self) -> serde_json::Result<Vec<u8>> {
        if self.signature.is_none() {
            return serde_json::to_vec(self);
        }
        let unsigned = Self {
            signature: None,
            ..self.clone()
        };
        serde_json::to_vec(&unsigned)
    }

    /// Compute and attach the signature
    pub fn sign(&mut self, secret: &str) -> serde_json::Result<()> {
        self.signature = None;
        let data = serde_json::to_vec(self)?;
        self.signature = Some(compute_signature(&data, secret));
        Ok(())
    }

    /// Check the attached signature against `secret`
    pub fn verify(&self, secret: &str) -> bool {
        let Some(signature) = self.signature.as_deref() else {
            return false;
        };
        let Ok(tag) = hex::decode(signature) else {
            return false;
        };
        let Ok(data) = self.unsigned_bytes() else {
            return false;
        };
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
        hmac::verify(&key, &data, &tag).is_ok()
    }
}

/// Subscriber-side check of a received payload
pub fn verify_signature(secret: &str, payload: &WebhookPayload) -> bool {
    payload.verify(secret)
}

/// Lowercase hex HMAC-SHA256 of `data`
pub fn compute_signature(data: &[u8], secret: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, data);
    hex::encode(tag.as_ref())
}
