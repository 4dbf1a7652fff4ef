//! Tell the outside world about newly opened accounts.
//!
//! Events go through a bounded queue consumed by a single worker, so a slow
//! or failing receiver never delays an HTTP response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use url::Url;

use crate::account::Account;
use crate::config;
use crate::user::User;

const CONTENT_TYPE: &str = "application/cloudevents+json";
const DATA_CONTENT_TYPE: &str = "application/json";
const CLOUDEVENT_VERSION: &str = "1.0";
const EVENT_TYPE: &str = "com.cba.account.created";
const EVENT_SOURCE: &str = "com.cba.onboarding";
const ID_LENGTH: usize = 12;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Errors raised while handing an event to its receiver.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("cannot serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("delivery timed out")]
    Timeout,
}

/// CloudEvents envelope of a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cloudevent {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    pub id: String,
    time: String,
    datacontenttype: &'static str,
    pub data: AccountCreated,
}

/// Payload sent once an account is committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountCreated {
    pub to: String,
    pub firstname: String,
    pub lastname: String,
    pub user_id: i64,
    pub account_number: String,
    pub account_type: String,
    pub currency: String,
}

impl Cloudevent {
    fn account_created(user: &User, account: &Account) -> Self {
        Cloudevent {
            specversion: CLOUDEVENT_VERSION,
            r#type: EVENT_TYPE,
            source: EVENT_SOURCE,
            id: Alphanumeric.sample_string(&mut OsRng, ID_LENGTH),
            time: Utc::now().to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data: AccountCreated {
                to: user.email.clone(),
                firstname: user.firstname.clone(),
                lastname: user.lastname.clone(),
                user_id: account.user_id,
                account_number: account.account_number.clone(),
                account_type: account.r#type.clone(),
                currency: account.currency.clone(),
            },
        }
    }
}

/// Final hop of a notification.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, event: &Cloudevent) -> Result<(), DeliveryError>;
}

/// POST events to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    client: reqwest::Client,
    url: Url,
}

impl WebhookDelivery {
    /// Create a new [`WebhookDelivery`].
    pub fn new(url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Delivery for WebhookDelivery {
    async fn deliver(&self, event: &Cloudevent) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(event)?;
        let response = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DeliveryError::Status(response.status()));
        }

        Ok(())
    }
}

/// Only write events to the logs.
#[derive(Debug, Clone, Default)]
pub struct LogDelivery;

#[async_trait]
impl Delivery for LogDelivery {
    async fn deliver(&self, event: &Cloudevent) -> Result<(), DeliveryError> {
        tracing::info!(
            id = %event.id,
            user_id = event.data.user_id,
            account_number = %event.data.account_number,
            "account created notification"
        );
        Ok(())
    }
}

/// Queue and retry policy.
#[derive(Debug, Clone)]
pub struct Options {
    pub queue_size: usize,
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Wait before the second attempt, doubled on each retry.
    pub backoff: Duration,
}

impl From<&config::Notifier> for Options {
    fn from(config: &config::Notifier) -> Self {
        Self {
            queue_size: config.queue_size.max(1),
            timeout: Duration::from_secs(config.timeout),
            max_attempts: config.max_attempts.max(1),
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl Options {
    /// Wait after the failed `attempt`, saturating instead of overflowing.
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Handle used to enqueue notifications.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: mpsc::Sender<Cloudevent>,
}

impl Notifier {
    /// Start the delivery worker.
    ///
    /// The worker stops once every [`Notifier`] clone is dropped and the
    /// queue is empty.
    pub fn spawn(delivery: Arc<dyn Delivery>, options: Options) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(options.queue_size);
        let worker = Worker {
            receiver,
            delivery,
            options,
        };

        (Self { sender }, tokio::spawn(worker.run()))
    }

    /// Enqueue an `account.created` event without waiting.
    ///
    /// Returns `false` when the event was dropped.
    pub fn notify(&self, user: &User, account: &Account) -> bool {
        let event = Cloudevent::account_created(user, account);

        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                metrics::counter!("notifications_dropped_total").increment(1);
                tracing::warn!(
                    id = %event.id,
                    account_number = %event.data.account_number,
                    "notification queue is full, event dropped"
                );
                false
            },
            Err(TrySendError::Closed(event)) => {
                metrics::counter!("notifications_dropped_total").increment(1);
                tracing::warn!(id = %event.id, "notifier stopped, event dropped");
                false
            },
        }
    }
}

struct Worker {
    receiver: mpsc::Receiver<Cloudevent>,
    delivery: Arc<dyn Delivery>,
    options: Options,
}

impl Worker {
    async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            if let Err(err) = self.send(&event).await {
                metrics::counter!("notifications_failed_total").increment(1);
                tracing::error!(
                    id = %event.id,
                    account_number = %event.data.account_number,
                    error = %err,
                    "notification given up"
                );
            }
        }

        tracing::debug!("notifier worker stopped");
    }

    async fn send(&self, event: &Cloudevent) -> Result<(), DeliveryError> {
        let mut attempt = 1;

        loop {
            let result = tokio::time::timeout(
                self.options.timeout,
                self.delivery.deliver(event),
            )
            .await
            .unwrap_or(Err(DeliveryError::Timeout));

            match result {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= self.options.max_attempts => return Err(err),
                Err(err) => {
                    tracing::warn!(id = %event.id, attempt, error = %err, "notification failed, retrying");
                    tokio::time::sleep(self.options.delay(attempt)).await;
                    attempt += 1;
                },
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::sync::Mutex;

    use super::*;
    use crate::config::AccountDefaults;

    /// Keep every delivered event, failing the first `failures` attempts.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub events: Mutex<Vec<Cloudevent>>,
        pub attempts: AtomicU32,
        pub failures: u32,
    }

    #[async_trait]
    impl Delivery for Recorder {
        async fn deliver(&self, event: &Cloudevent) -> Result<(), DeliveryError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(DeliveryError::Timeout);
            }
            self.events.lock().await.push(event.clone());
            Ok(())
        }
    }

    /// Never answers.
    struct Stuck;

    #[async_trait]
    impl Delivery for Stuck {
        async fn deliver(&self, _: &Cloudevent) -> Result<(), DeliveryError> {
            std::future::pending().await
        }
    }

    pub(crate) fn options() -> Options {
        Options {
            queue_size: 16,
            timeout: Duration::from_millis(50),
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    fn account() -> Account {
        Account::open(&AccountDefaults::default(), "3012345678".into(), 1, "savings")
    }

    #[tokio::test]
    async fn test_event_is_delivered() {
        let recorder = Arc::new(Recorder::default());
        let (notifier, worker) = Notifier::spawn(recorder.clone(), options());

        assert!(notifier.notify(&crate::user::tests::ada(), &account()));
        drop(notifier);
        worker.await.unwrap();

        let events = recorder.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].r#type, EVENT_TYPE);
        assert_eq!(events[0].id.len(), ID_LENGTH);
        assert_eq!(events[0].data.to, "ada@example.com");
        assert_eq!(events[0].data.account_number, "3012345678");
    }

    #[tokio::test]
    async fn test_failures_are_retried() {
        let recorder = Arc::new(Recorder {
            failures: 2,
            ..Default::default()
        });
        let (notifier, worker) = Notifier::spawn(recorder.clone(), options());

        notifier.notify(&crate::user::tests::ada(), &account());
        drop(notifier);
        worker.await.unwrap();

        assert_eq!(recorder.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(recorder.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let recorder = Arc::new(Recorder {
            failures: u32::MAX,
            ..Default::default()
        });
        let (notifier, worker) = Notifier::spawn(recorder.clone(), options());

        notifier.notify(&crate::user::tests::ada(), &account());
        notifier.notify(&crate::user::tests::ada(), &account());
        drop(notifier);
        worker.await.unwrap();

        assert_eq!(recorder.attempts.load(Ordering::SeqCst), 6);
        assert!(recorder.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (notifier, worker) = Notifier::spawn(
            Arc::new(Stuck),
            Options {
                queue_size: 1,
                timeout: Duration::from_secs(60),
                ..options()
            },
        );

        // the worker holds at most one event, the queue one more.
        let accepted = (0..4)
            .filter(|_| notifier.notify(&crate::user::tests::ada(), &account()))
            .count();
        assert!(accepted < 4);

        worker.abort();
    }

    #[test]
    fn test_delay_doubles_and_saturates() {
        let options = Options {
            backoff: Duration::from_millis(500),
            ..options()
        };

        assert_eq!(options.delay(1), Duration::from_millis(500));
        assert_eq!(options.delay(2), Duration::from_secs(1));
        assert_eq!(options.delay(4), Duration::from_secs(4));
        assert_eq!(
            options.delay(100),
            Duration::from_millis(500).saturating_mul(u32::MAX)
        );

        let options = Options {
            backoff: Duration::MAX,
            ..options
        };
        assert_eq!(options.delay(2), Duration::MAX);
    }

    #[test]
    fn test_options_from_config() {
        let options = Options::from(&config::Notifier {
            queue_size: 0,
            max_attempts: 0,
            ..Default::default()
        });

        assert_eq!(options.queue_size, 1);
        assert_eq!(options.max_attempts, 1);
        assert_eq!(options.timeout, Duration::from_secs(5));
    }
}
