use std::env;
use std::fmt;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::json;

use crate::models::NotificationPayload;
use crate::util::VAR_FCM_SERVER_KEY;
use crate::DRY_RUN;

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

/// Outbound push seam. One call fans out to every token in the payload; the
/// provider reports per-token outcomes.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, payload: &NotificationPayload) -> Result<SendReport, PushError>;
}

/// Delivery counts for one multicast.
#[derive(Deserialize, Clone, Copy, Debug, Default)]
pub struct SendReport {
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub failure: u32,
}

pub struct FcmClient {
    server_key: String,
    http: reqwest::Client,
}

impl FcmClient {
    pub fn new() -> FcmClient {
        FcmClient {
            server_key: env::var(VAR_FCM_SERVER_KEY).unwrap(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send(&self, payload: &NotificationPayload) -> Result<SendReport, PushError> {
        let response = self.http.post(FCM_SEND_URL)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&fcm_body(payload))
            .send()
            .await
            .map_err(PushError::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Status(status, body));
        }

        let report: SendReport = response.json().await.map_err(PushError::Http)?;
        debug!("fcm:: multicast done, success={} failure={}", report.success, report.failure);
        Ok(report)
    }
}

/// Legacy multicast body: `registration_ids` reaches every device in a single
/// request. Display hints ride along in the notification block.
fn fcm_body(payload: &NotificationPayload) -> serde_json::Value {
    json!({
        "registration_ids": payload.tokens,
        "dry_run": DRY_RUN,
        "notification": {
            "title": payload.title,
            "body": payload.body,
            "icon": payload.icon,
            "click_action": payload.link,
        },
    })
}

#[derive(Debug)]
pub enum PushError {
    Http(reqwest::Error),
    Status(u16, String),
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Http(e) => write!(f, "send failed: {e}"),
            PushError::Status(status, body) => write!(f, "provider responded {status}: {body}"),
        }
    }
}
