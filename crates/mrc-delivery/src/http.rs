//! SQS-compatible HTTP transport (JSON protocol).
//!
//! Requests are sent to `endpoint` with `X-Amz-Target: AmazonSQS.SendMessage`
//! or `AmazonSQS.SendMessageBatch` and an `application/x-amz-json-1.0` body.
//! Requests are not signed here, so `endpoint` must be an SQS-compatible
//! service or a proxy that signs on the way out; the public regional
//! endpoints reject unsigned calls. An optional bearer token is forwarded as
//! `Authorization`. The token is never logged.

use std::collections::BTreeMap;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::{
    BatchFailure, BatchResponse, BatchSuccess, MessageAttribute, QueueMessage, QueueTransport,
    SendReceipt, TransportError,
};

const AMZ_JSON: &str = "application/x-amz-json-1.0";
const TARGET_SEND: &str = "AmazonSQS.SendMessage";
const TARGET_SEND_BATCH: &str = "AmazonSQS.SendMessageBatch";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageRequest<'a> {
    queue_url: &'a str,
    message_body: &'a str,
    message_attributes: &'a BTreeMap<String, MessageAttribute>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BatchEntry<'a> {
    id: &'a str,
    message_body: &'a str,
    message_attributes: &'a BTreeMap<String, MessageAttribute>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageBatchRequest<'a> {
    queue_url: &'a str,
    entries: Vec<BatchEntry<'a>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageResponse {
    message_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageBatchResponse {
    #[serde(default)]
    successful: Vec<WireSuccess>,
    #[serde(default)]
    failed: Vec<WireFailure>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireSuccess {
    id: String,
    message_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireFailure {
    id: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    sender_fault: bool,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SqsHttpTransport {
    http: reqwest::Client,
    endpoint: String,
    queue_url: String,
    auth_token: Option<String>,
}

impl std::fmt::Debug for SqsHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqsHttpTransport")
            .field("endpoint", &self.endpoint)
            .field("queue_url", &self.queue_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl SqsHttpTransport {
    pub fn new(endpoint: impl Into<String>, queue_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            queue_url: queue_url.into(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        target: &str,
        body: &B,
    ) -> Result<R, TransportError> {
        let bytes = serde_json::to_vec(body).map_err(|e| TransportError::Decode(e.to_string()))?;
        let mut req = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, AMZ_JSON)
            .header("X-Amz-Target", target)
            .body(bytes);
        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }
        resp.json::<R>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl QueueTransport for SqsHttpTransport {
    fn name(&self) -> &'static str {
        "sqs-http"
    }

    async fn send_one(&self, message: &QueueMessage) -> Result<SendReceipt, TransportError> {
        let body = SendMessageRequest {
            queue_url: &self.queue_url,
            message_body: &message.body,
            message_attributes: &message.attributes,
        };
        let resp: SendMessageResponse = self.post(TARGET_SEND, &body).await?;
        Ok(SendReceipt {
            message_id: resp.message_id,
        })
    }

    async fn send_batch(&self, messages: &[QueueMessage]) -> Result<BatchResponse, TransportError> {
        let body = SendMessageBatchRequest {
            queue_url: &self.queue_url,
            entries: messages
                .iter()
                .map(|m| BatchEntry {
                    id: &m.id,
                    message_body: &m.body,
                    message_attributes: &m.attributes,
                })
                .collect(),
        };
        let resp: SendMessageBatchResponse = self.post(TARGET_SEND_BATCH, &body).await?;
        Ok(BatchResponse {
            successful: resp
                .successful
                .into_iter()
                .map(|s| BatchSuccess {
                    id: s.id,
                    message_id: s.message_id,
                })
                .collect(),
            failed: resp
                .failed
                .into_iter()
                .map(|f| BatchFailure {
                    id: f.id,
                    reason: match f.message {
                        Some(m) if !m.is_empty() => format!("{}: {}", f.code, m),
                        _ => f.code,
                    },
                    sender_fault: f.sender_fault,
                })
                .collect(),
        })
    }
}
