//! SMS and voice gateway collaborator.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// One outgoing text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRequest {
    /// Recipient in international form.
    pub to: String,
    /// Message body.
    pub message: String,
}

/// Gateway acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsReceipt {
    /// Provider message id.
    pub message_id: String,
}

/// Gateway acknowledgement of a placed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReceipt {
    /// Provider call id.
    pub call_id: String,
    /// Provider call status, e.g. "queued".
    pub status: String,
}

/// The SMS/voice gateway.
///
/// Implementations receive numbers already normalised to international form.
#[async_trait]
pub trait SmsGateway: Send + Sync + std::fmt::Debug {
    /// Send one text message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gateway`](crate::Error::Gateway) if the provider
    /// rejects the request.
    async fn send_sms(&self, request: &SmsRequest) -> Result<SmsReceipt>;

    /// Ring a number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gateway`](crate::Error::Gateway) if the provider
    /// rejects the request.
    async fn initiate_call(&self, to: &str) -> Result<CallReceipt>;
}

/// A dry-run gateway that logs every request and always succeeds.
#[derive(Debug, Default)]
pub struct LogGateway {
    sequence: AtomicU64,
}

impl LogGateway {
    /// Create a gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-dry-{n:06}")
    }
}

#[async_trait]
impl SmsGateway for LogGateway {
    async fn send_sms(&self, request: &SmsRequest) -> Result<SmsReceipt> {
        let message_id = self.next_id("SM");
        info!(to = %request.to, id = %message_id, chars = request.message.len(), "SMS (dry run)");
        Ok(SmsReceipt { message_id })
    }

    async fn initiate_call(&self, to: &str) -> Result<CallReceipt> {
        let call_id = self.next_id("CA");
        info!(to, id = %call_id, "call (dry run)");
        Ok(CallReceipt {
            call_id,
            status: "queued".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_gateway_ids_are_unique() {
        let gateway = LogGateway::new();
        let request = SmsRequest {
            to: "+919876543210".to_string(),
            message: "hi".to_string(),
        };
        let a = gateway.send_sms(&request).await.unwrap();
        let b = gateway.send_sms(&request).await.unwrap();
        assert_ne!(a.message_id, b.message_id);
        assert!(a.message_id.starts_with("SM-"));
    }

    #[tokio::test]
    async fn test_log_gateway_call() {
        let receipt = LogGateway::new()
            .initiate_call("+919876543210")
            .await
            .unwrap();
        assert!(receipt.call_id.starts_with("CA-"));
        assert_eq!(receipt.status, "queued");
    }
}
