//! Webhook side channel.
//!
//! Each stored message is posted as `{"text": "<message as JSON>"}`. Posts
//! run on tracked tasks so a slow endpoint never stalls ingestion. At most
//! `max_in_flight` posts run at once; messages arriving while all slots are
//! busy skip the webhook.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::warn;

use crate::config::DEFAULT_WEBHOOK_MAX_IN_FLIGHT;
use crate::message::LogMessage;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid webhook url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to encode webhook payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Request body posted for each message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub text: String,
}

impl WebhookPayload {
    pub fn for_message(message: &LogMessage) -> Result<Self, NotifyError> {
        Ok(Self {
            text: serde_json::to_string(message)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: reqwest::Url,
    slots: Arc<Semaphore>,
    max_in_flight: usize,
    tasks: TaskTracker,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let url = reqwest::Url::parse(url).map_err(|err| NotifyError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            slots: Arc::new(Semaphore::new(DEFAULT_WEBHOOK_MAX_IN_FLIGHT)),
            max_in_flight: DEFAULT_WEBHOOK_MAX_IN_FLIGHT,
            tasks: TaskTracker::new(),
        })
    }

    /// Limit concurrent posts. Zero is treated as one.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        self.slots = Arc::new(Semaphore::new(max_in_flight));
        self.max_in_flight = max_in_flight;
        self
    }

    /// Spawn posts on `tasks`, so whoever waits on the tracker waits for them.
    pub fn with_tasks(mut self, tasks: TaskTracker) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Posts currently running.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.slots.available_permits()
    }

    /// Post `message` in the background. Failures are logged and dropped,
    /// as is the message itself when `max_in_flight` posts are running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn notify(&self, message: &LogMessage) {
        let Ok(slot) = Arc::clone(&self.slots).try_acquire_owned() else {
            warn!(
                url = %self.url,
                max_in_flight = self.max_in_flight,
                "webhook busy, dropping notification"
            );
            return;
        };

        let payload = match WebhookPayload::for_message(message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "error encoding webhook payload");
                return;
            }
        };

        let notifier = self.clone();
        self.tasks.spawn(async move {
            let _slot = slot;
            if let Err(err) = notifier.post(&payload).await {
                warn!(url = %notifier.url, error = %err, "error sending log to webhook");
            }
        });
    }

    /// Post one payload and wait for a success status.
    pub async fn post(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
        self.client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
