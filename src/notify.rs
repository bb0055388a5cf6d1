use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);
const ALERT_FOOTER: &str = "AWS Billing Monitor";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("webhook not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertColor {
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub title: String,
    pub text: String,
    pub color: AlertColor,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct TextPayload<'a> {
    text: &'a str,
    mrkdwn: bool,
}

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    attachments: Vec<Attachment<'a>>,
}

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    title: &'a str,
    text: &'a str,
    color: AlertColor,
    footer: &'a str,
    ts: i64,
}

pub struct WebhookSink {
    webhook_url: String,
    client: Client,
}

impl WebhookSink {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, DeliveryError> {
        let webhook_url = webhook_url.into();
        if webhook_url.trim().is_empty() {
            return Err(DeliveryError::NotConfigured("empty webhook URL".into()));
        }
        let client = Client::builder().timeout(DELIVERY_TIMEOUT).build()?;
        Ok(Self {
            webhook_url,
            client,
        })
    }

    pub async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        self.post(&TextPayload { text, mrkdwn: true }).await?;
        debug!(channel = "webhook", "report delivered");
        Ok(())
    }

    pub async fn send_alert(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let payload = AlertPayload {
            attachments: vec![Attachment {
                title: &alert.title,
                text: &alert.text,
                color: alert.color,
                footer: ALERT_FOOTER,
                ts: alert.timestamp.timestamp(),
            }],
        };
        self.post(&payload).await?;
        debug!(channel = "webhook", title = %alert.title, "alert delivered");
        Ok(())
    }

    async fn post<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.webhook_url).json(payload).send().await?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(channel = "webhook", status = %status, body = %body, "webhook request failed");
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
