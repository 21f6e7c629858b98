//! Firebase Cloud Messaging (HTTP v1) push provider.
//!
//! Authenticates with a service-account key: a short-lived RS256 JWT is
//! exchanged for an OAuth access token, which is cached until shortly before
//! it expires.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dispatch_core::notification::{PushError, PushMessage, PushProvider, PushReceipt};
use dispatch_shared::Masked;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tokio::sync::Mutex;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ANDROID_CHANNEL: &str = "rides_channel";
const ANDROID_SOUND: &str = "notification_sound";
const APNS_SOUND: &str = "notification_sound.caf";

/// Refresh this long before the provider-reported expiry.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct FcmPushProvider {
    http: reqwest::Client,
    account: ServiceAccount,
    signing_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl FcmPushProvider {
    pub fn new(account: ServiceAccount) -> Result<Self, PushError> {
        let signing_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| PushError::NotConfigured(format!("invalid service account key: {}", e)))?;
        Ok(Self {
            http: reqwest::Client::new(),
            account,
            signing_key,
            token: Mutex::new(None),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PushError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PushError::NotConfigured(format!("{}: {}", path.display(), e)))?;
        let account: ServiceAccount = serde_json::from_str(&raw)
            .map_err(|e| PushError::NotConfigured(format!("{}: {}", path.display(), e)))?;
        Self::new(account)
    }

    fn send_url(&self) -> String {
        format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.account.project_id
        )
    }

    async fn access_token(&self) -> Result<String, PushError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: FCM_SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| PushError::Authentication(e.to_string()))?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];
        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("FCM token exchange failed: {}", body);
            return Err(PushError::Authentication("token exchange failed".to_string()));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PushError::Authentication(e.to_string()))?;
        tracing::debug!("Obtained FCM access token valid for {}s", token.expires_in);

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        });
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }
}

/// FCM v1 request body for one device.
pub fn fcm_payload(message: &PushMessage) -> Value {
    let mut body = json!({
        "message": {
            "token": message.token,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "data": message.data,
            "android": {
                "priority": "high",
                "notification": {
                    "channel_id": ANDROID_CHANNEL,
                    "sound": ANDROID_SOUND,
                },
            },
            "apns": {
                "payload": {
                    "aps": { "sound": APNS_SOUND },
                },
            },
        }
    });
    if let Some(link) = &message.link {
        body["message"]["webpush"] = json!({ "fcm_options": { "link": link } });
    }
    body
}

fn is_unregistered(status: u16, body: &str) -> bool {
    status == 404 || body.contains("UNREGISTERED")
}

#[async_trait]
impl PushProvider for FcmPushProvider {
    fn name(&self) -> &str {
        "fcm"
    }

    async fn send(&self, message: &PushMessage) -> Result<PushReceipt, PushError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.send_url())
            .bearer_auth(token)
            .json(&fcm_payload(message))
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let sent: SendResponse = response
                .json()
                .await
                .map_err(|e| PushError::Transport(e.to_string()))?;
            return Ok(PushReceipt {
                provider: self.name().to_string(),
                message_id: sent.name,
            });
        }

        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        if code == 401 {
            self.invalidate_token().await;
            return Err(PushError::Authentication(body));
        }
        if is_unregistered(code, &body) {
            return Err(PushError::Unregistered);
        }
        tracing::warn!(
            "FCM rejected message for {} (status {}): {}",
            Masked(message.token.as_str()),
            code,
            body
        );
        Err(PushError::Rejected { status: code, message: body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn message() -> PushMessage {
        PushMessage {
            token: "device-token-1234".to_string(),
            title: "🚗 Nouvelle course disponible".to_string(),
            body: "Marie Laurent - CDG → Paris".to_string(),
            data: BTreeMap::from([("reservationId".to_string(), "abc".to_string())]),
            link: Some("/reservations".to_string()),
        }
    }

    #[test]
    fn test_payload_targets_rides_channel() {
        let payload = fcm_payload(&message());
        let inner = &payload["message"];
        assert_eq!(inner["token"], "device-token-1234");
        assert_eq!(inner["android"]["notification"]["channel_id"], "rides_channel");
        assert_eq!(inner["apns"]["payload"]["aps"]["sound"], "notification_sound.caf");
        assert_eq!(inner["webpush"]["fcm_options"]["link"], "/reservations");
        assert_eq!(inner["data"]["reservationId"], "abc");
    }

    #[test]
    fn test_payload_without_link() {
        let mut msg = message();
        msg.link = None;
        assert!(fcm_payload(&msg)["message"].get("webpush").is_none());
    }

    #[test]
    fn test_unregistered_detection() {
        assert!(is_unregistered(404, ""));
        assert!(is_unregistered(400, r#"{"error":{"details":[{"errorCode":"UNREGISTERED"}]}}"#));
        assert!(!is_unregistered(400, "INVALID_ARGUMENT"));
    }

    #[test]
    fn test_bad_key_is_not_configured() {
        let account = ServiceAccount {
            project_id: "dispatch".to_string(),
            client_email: "push@dispatch.iam.gserviceaccount.com".to_string(),
            private_key: "not a pem".to_string(),
            token_uri: default_token_uri(),
        };
        assert!(matches!(FcmPushProvider::new(account), Err(PushError::NotConfigured(_))));
    }
}
