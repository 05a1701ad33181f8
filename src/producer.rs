//! NATS reply publishing

use crate::error::ServiceError;
use anyhow::Result;
use async_nats::{Client, Subject};
use serde::Serialize;
use tracing::{debug, warn};

/// Publishes JSON replies to request inboxes
#[derive(Clone)]
pub struct ReplyProducer {
    client: Client,
}

impl ReplyProducer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Reply with a successful body or the error's wire form
    pub async fn reply<T: Serialize>(
        &self,
        inbox: Option<Subject>,
        result: &Result<T, ServiceError>,
    ) -> Result<()> {
        let payload = match result {
            Ok(body) => serde_json::to_vec(body)?,
            Err(e) => serde_json::to_vec(&e.to_reply())?,
        };
        self.publish(inbox, payload).await
    }

    /// Reply with a body that cannot fail
    pub async fn reply_ok<T: Serialize>(&self, inbox: Option<Subject>, body: &T) -> Result<()> {
        self.publish(inbox, serde_json::to_vec(body)?).await
    }

    async fn publish(&self, inbox: Option<Subject>, payload: Vec<u8>) -> Result<()> {
        let Some(inbox) = inbox else {
            warn!("Request carried no reply subject; dropping reply");
            return Ok(());
        };

        debug!(inbox = %inbox, bytes = payload.len(), "Publishing reply");
        self.client.publish(inbox, payload.into()).await?;
        Ok(())
    }
}
