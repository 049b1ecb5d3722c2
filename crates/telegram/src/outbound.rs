//! Outbound message sender for Telegram.

use std::time::Duration;

use {
    async_trait::async_trait,
    serde::Deserialize,
    serde_json::json,
    tracing::{debug, warn},
};

use feedrelay_channels::{MessageSender, SendError, SendOptions};

use crate::error::{Error, Result};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const RETRY_AFTER_MAX_RETRIES: usize = 4;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Bot API client delivering messages via `sendMessage`.
pub struct TelegramSender {
    client:   reqwest::Client,
    token:    String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl TelegramSender {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_api_base(token, TELEGRAM_API_BASE)
    }

    /// Point the client at a different API host. Used by tests.
    pub fn with_api_base(token: &str, api_base: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(Error::EmptyToken);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            token: token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn send_once(
        &self,
        chat_id: &str,
        text: &str,
        options: &SendOptions,
    ) -> std::result::Result<(), SendError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": options.disable_link_preview,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| SendError::transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(chat_id, "telegram message sent");
            return Ok(());
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .unwrap_or_else(|_| ApiResponse {
                ok: false,
                error_code: Some(status.as_u16()),
                description: None,
                parameters: None,
            });
        Err(classify_failure(chat_id, status.as_u16(), &parsed))
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        options: &SendOptions,
    ) -> std::result::Result<(), SendError> {
        let mut retries = 0usize;

        loop {
            match self.send_once(chat_id, text, options).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let SendError::RateLimited { retry_after_secs } = err else {
                        return Err(err);
                    };

                    if retries >= RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            chat_id,
                            retries,
                            max_retries = RETRY_AFTER_MAX_RETRIES,
                            retry_after_secs,
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    warn!(
                        chat_id,
                        retries,
                        max_retries = RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs,
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                },
            }
        }
    }
}

fn classify_failure(chat_id: &str, http_status: u16, response: &ApiResponse) -> SendError {
    debug_assert!(!response.ok);
    let code = response.error_code.unwrap_or(http_status);
    let description = response
        .description
        .clone()
        .unwrap_or_else(|| format!("http status {http_status}"));

    match code {
        429 => SendError::RateLimited {
            retry_after_secs: response
                .parameters
                .as_ref()
                .and_then(|p| p.retry_after)
                .unwrap_or(1),
        },
        403 => SendError::Forbidden { description },
        400 if description.to_ascii_lowercase().contains("chat not found") => {
            SendError::ChatNotFound {
                chat_id: chat_id.to_string(),
            }
        },
        400 => SendError::Rejected { description },
        _ => SendError::Api { code, description },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn make_sender(server: &mockito::Server) -> TelegramSender {
        TelegramSender::with_api_base("test-token", &server.url()).unwrap()
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            TelegramSender::new("  "),
            Err(Error::EmptyToken)
        ));
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottest-token/sendMessage")
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{}}"#)
            .create_async()
            .await;

        let sender = make_sender(&server);
        sender
            .send("-100", "*hi*", &SendOptions::default())
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_forbidden_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottest-token/sendMessage")
            .with_status(403)
            .with_body(r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked"}"#)
            .expect(1)
            .create_async()
            .await;

        let sender = make_sender(&server);
        let err = sender
            .send("-100", "hi", &SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Forbidden { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_chat_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bottest-token/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let sender = make_sender(&server);
        let err = sender
            .send("-999", "hi", &SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::ChatNotFound { chat_id } if chat_id == "-999"));
    }

    #[tokio::test]
    async fn test_send_rate_limit_exhausts_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottest-token/sendMessage")
            .with_status(429)
            .with_body(
                r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":0}}"#,
            )
            .expect(1 + RETRY_AFTER_MAX_RETRIES)
            .create_async()
            .await;

        let sender = make_sender(&server);
        let err = sender
            .send("-100", "hi", &SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::RateLimited { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_bad_request_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bottest-token/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: can't parse entities"}"#)
            .create_async()
            .await;

        let sender = make_sender(&server);
        let err = sender
            .send("-100", "*broken", &SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Rejected { .. }));
        assert!(!err.is_retryable());
    }
}
