//! In-memory transport for tests and dry runs.

use super::transport::{DeliveryHandle, MessageTransport, TransportError};
use super::AutomatedMessage;
use crate::tenant::CompanyContext;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Records every accepted message. Individual keys can be made to fail, or
/// the whole transport marked unavailable.
#[derive(Default)]
pub struct MockTransport {
    sent: RwLock<Vec<AutomatedMessage>>,
    failing_keys: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
    counter: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every message with this key fail as rejected.
    pub async fn fail_key(&self, key: &str) {
        self.failing_keys.write().await.insert(key.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Messages accepted so far, in order.
    pub async fn sent(&self) -> Vec<AutomatedMessage> {
        self.sent.read().await.clone()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("unavailable", &self.unavailable)
            .field("counter", &self.counter)
            .finish()
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn enqueue(
        &self,
        _ctx: &CompanyContext,
        message: &AutomatedMessage,
    ) -> Result<DeliveryHandle, TransportError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("mock transport offline".to_string()));
        }
        if self.failing_keys.read().await.contains(&message.dedup_key) {
            return Err(TransportError::Rejected(format!(
                "mock rejection for {}",
                message.dedup_key
            )));
        }

        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        self.sent.write().await.push(message.clone());
        Ok(DeliveryHandle {
            id: format!("mock-{}", id),
            channel: message.channel,
            queued_at: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
