//! NATS request subscription

use anyhow::Result;
use async_nats::{Client, Message};
use futures::stream::{select_all, BoxStream};
use futures::StreamExt;
use tracing::info;

/// Caller-facing operation a request subject maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Predict,
    Health,
    Metrics,
    Retrain,
}

impl RequestKind {
    /// Whether the request runs on the bounded request workers. Retrains
    /// queue on their own slot so a burst of uploads cannot starve predictions.
    pub fn uses_worker_pool(self) -> bool {
        !matches!(self, RequestKind::Retrain)
    }
}

/// Subscribes to the four request subjects and yields tagged messages
pub struct RequestConsumer {
    client: Client,
    subjects: Vec<(RequestKind, String)>,
}

impl RequestConsumer {
    pub fn new(client: Client, subjects: Vec<(RequestKind, String)>) -> Self {
        Self { client, subjects }
    }

    /// Subscribe to every subject and merge the streams
    pub async fn subscribe(&self) -> Result<BoxStream<'static, (RequestKind, Message)>> {
        let mut streams = Vec::with_capacity(self.subjects.len());

        for (kind, subject) in &self.subjects {
            let subscriber = self.client.subscribe(subject.clone()).await?;
            info!(subject = %subject, kind = ?kind, "Subscribed to request subject");

            let kind = *kind;
            streams.push(subscriber.map(move |message| (kind, message)).boxed());
        }

        Ok(select_all(streams).boxed())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    // Subscription tests would require a running NATS server

    #[test]
    fn test_only_retrain_bypasses_worker_pool() {
        assert!(RequestKind::Predict.uses_worker_pool());
        assert!(RequestKind::Health.uses_worker_pool());
        assert!(RequestKind::Metrics.uses_worker_pool());
        assert!(!RequestKind::Retrain.uses_worker_pool());
    }
}
