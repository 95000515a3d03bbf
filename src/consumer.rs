//! NATS consumer for incoming loan applications

use crate::types::application::ApplicationForm;
use anyhow::Result;
use async_nats::{Client, Message, Subscriber};
use tracing::info;

/// Consumer for receiving applications from NATS
pub struct ApplicationConsumer {
    client: Client,
    subject: String,
}

impl ApplicationConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the application subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to application subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Decode one application payload.
pub fn decode_application(message: &Message) -> serde_json::Result<ApplicationForm> {
    decode_payload(&message.payload)
}

pub(crate) fn decode_payload(payload: &[u8]) -> serde_json::Result<ApplicationForm> {
    serde_json::from_slice(payload)
}
