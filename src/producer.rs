//! NATS producer for decisions and rejections

use crate::types::decision::{DecisionMessage, RejectionMessage};
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::{debug, warn};

/// Publishes scoring outcomes to NATS
#[derive(Clone)]
pub struct DecisionProducer {
    client: Client,
    decision_subject: String,
    rejection_subject: String,
}

impl DecisionProducer {
    pub fn new(client: Client, decision_subject: &str, rejection_subject: &str) -> Self {
        Self {
            client,
            decision_subject: decision_subject.to_string(),
            rejection_subject: rejection_subject.to_string(),
        }
    }

    /// Send a decision to the requester's reply subject, or publish it on the
    /// decision subject when the message carried no reply subject.
    pub async fn send_decision(
        &self,
        reply: Option<Subject>,
        decision: &DecisionMessage,
    ) -> Result<()> {
        let payload = serde_json::to_vec(decision)?;
        let subject = reply.unwrap_or_else(|| self.decision_subject.clone().into());

        self.client.publish(subject.clone(), payload.into()).await?;

        debug!(
            subject = %subject,
            decision_id = %decision.decision_id,
            application_id = ?decision.application_id,
            decision = %decision.decision,
            probability = decision.probability,
            "Published decision"
        );
        Ok(())
    }

    /// Send a rejection to the requester, or publish it on the rejection subject.
    pub async fn send_rejection(
        &self,
        reply: Option<Subject>,
        rejection: &RejectionMessage,
    ) -> Result<()> {
        let payload = serde_json::to_vec(rejection)?;
        let subject = reply.unwrap_or_else(|| self.rejection_subject.clone().into());

        self.client.publish(subject.clone(), payload.into()).await?;

        warn!(
            subject = %subject,
            application_id = ?rejection.application_id,
            kind = %rejection.kind,
            field = ?rejection.field,
            "Published rejection"
        );
        Ok(())
    }

    pub fn decision_subject(&self) -> &str {
        &self.decision_subject
    }

    pub fn rejection_subject(&self) -> &str {
        &self.rejection_subject
    }
}
