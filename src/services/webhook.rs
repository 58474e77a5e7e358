//! Queued webhook notifier.
//!
//! # Responsibilities
//! - Accept events without blocking the caller
//! - Deliver them to every configured URL from a single worker task
//!
//! # Design Decisions
//! - Bounded queue; when full, new events are dropped and counted
//! - Graceful shutdown flushes the queue, forced shutdown abandons it
//! - Requests carry the configured API key; the secret must exist for
//!   that key or construction fails

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::new_id;
use crate::auth::middleware::API_KEY_HEADER;
use crate::auth::CredentialSet;
use crate::backend::types::{unix_now, Room};
use crate::config::WebhookConfig;
use crate::lifecycle::shutdown::{ShutdownListener, ShutdownPhase};
use crate::observability::metrics;

const QUEUE_SIZE: usize = 200;
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("api key '{0}' for webhooks has no secret in the configured keys")]
    MissingSecret(String),

    #[error("webhook.api_key is required when webhook urls are configured")]
    MissingApiKey,

    #[error("could not build webhook client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("webhook worker already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub id: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
    pub created_at: i64,
}

impl WebhookEvent {
    pub fn new(event: &str, room: Option<Room>) -> Self {
        Self {
            id: new_id("EV_"),
            event: event.to_string(),
            room,
            created_at: unix_now(),
        }
    }
}

pub struct WebhookNotifier {
    urls: Vec<String>,
    api_key: String,
    client: reqwest::Client,
    tx: mpsc::Sender<WebhookEvent>,
    rx: Mutex<Option<mpsc::Receiver<WebhookEvent>>>,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig, credentials: &CredentialSet) -> Result<Self, WebhookError> {
        if !config.urls.is_empty() {
            if config.api_key.is_empty() {
                return Err(WebhookError::MissingApiKey);
            }
            if credentials.secret(&config.api_key).is_none() {
                return Err(WebhookError::MissingSecret(config.api_key.clone()));
            }
        }

        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;
        let (tx, rx) = mpsc::channel(QUEUE_SIZE);

        Ok(Self {
            urls: config.urls.clone(),
            api_key: config.api_key.clone(),
            client,
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.urls.is_empty()
    }

    /// Queue an event. Never blocks.
    pub fn notify(&self, event: WebhookEvent) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.tx.try_send(event) {
            metrics::record_webhook("dropped");
            tracing::warn!(error = %e, "Webhook queue full, dropping event");
        }
    }

    /// Spawn the delivery worker. May only be called once.
    pub fn start(&self, mut shutdown: ShutdownListener) -> Result<JoinHandle<()>, WebhookError> {
        let mut rx = self
            .rx
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .ok_or(WebhookError::AlreadyStarted)?;
        let delivery = Delivery {
            urls: self.urls.clone(),
            api_key: self.api_key.clone(),
            client: self.client.clone(),
        };

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.requested() => break,
                    event = rx.recv() => match event {
                        Some(event) => delivery.deliver(&event).await,
                        None => return,
                    },
                }
            }

            rx.close();
            let mut flushed = 0usize;
            while let Some(event) = rx.recv().await {
                if shutdown.phase() == ShutdownPhase::Forced {
                    tracing::warn!("Forced shutdown, abandoning queued webhooks");
                    return;
                }
                delivery.deliver(&event).await;
                flushed += 1;
            }
            tracing::debug!(flushed, "Webhook queue flushed");
        }))
    }
}

struct Delivery {
    urls: Vec<String>,
    api_key: String,
    client: reqwest::Client,
}

impl Delivery {
    async fn deliver(&self, event: &WebhookEvent) {
        for url in &self.urls {
            let result = self
                .client
                .post(url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(event)
                .send()
                .await
                .and_then(|resp| resp.error_for_status());
            match result {
                Ok(_) => metrics::record_webhook("delivered"),
                Err(e) => {
                    metrics::record_webhook("failed");
                    tracing::warn!(url = %url, event = %event.event, error = %e, "Webhook delivery failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::shutdown::Shutdown;
    use std::collections::BTreeMap;

    fn credentials() -> CredentialSet {
        CredentialSet::new(BTreeMap::from([(
            "hookkey".to_string(),
            "hooksecret".to_string(),
        )]))
        .unwrap()
    }

    #[test]
    fn test_urls_without_secret_rejected() {
        let config = WebhookConfig {
            api_key: "unknown".into(),
            urls: vec!["http://127.0.0.1:9/hook".into()],
        };
        assert!(matches!(
            WebhookNotifier::new(&config, &credentials()),
            Err(WebhookError::MissingSecret(_))
        ));

        let config = WebhookConfig {
            api_key: String::new(),
            urls: vec!["http://127.0.0.1:9/hook".into()],
        };
        assert!(matches!(
            WebhookNotifier::new(&config, &credentials()),
            Err(WebhookError::MissingApiKey)
        ));
    }

    #[test]
    fn test_no_urls_is_disabled() {
        let notifier = WebhookNotifier::new(&WebhookConfig::default(), &credentials()).unwrap();
        assert!(!notifier.is_enabled());
    }

    #[tokio::test]
    async fn test_worker_starts_once_and_stops() {
        let notifier = WebhookNotifier::new(&WebhookConfig::default(), &credentials()).unwrap();
        let shutdown = Shutdown::new();
        let handle = notifier.start(shutdown.subscribe()).unwrap();
        assert!(matches!(
            notifier.start(shutdown.subscribe()),
            Err(WebhookError::AlreadyStarted)
        ));

        shutdown.trigger(false);
        handle.await.unwrap();
    }
}
