//! Outbound message transport.
//!
//! The core never talks to WhatsApp or SMTP directly. A
//! [`MessageTransport`] accepts messages and returns a delivery handle;
//! [`QueuedDocumentTransport`] is the document hand-off variant that writes
//! each message into a queue collection picked up by an external sender.

use super::{AutomatedMessage, MessageChannel};
use crate::scope::{ScopeError, ScopedStore};
use crate::tenant::CompanyContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

/// Collection picked up by the email sender.
pub const MAIL_COLLECTION: &str = "mail";
/// Collection picked up by the WhatsApp sender.
pub const WHATSAPP_COLLECTION: &str = "whatsapp_queue";
/// Collection read by the in-app notification feed.
pub const NOTIFICATIONS_COLLECTION: &str = "notifications";

/// Errors for a single message hand-off.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport refused the message (bad address, wrong company).
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// The transport could not be reached.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// Writing the queue document failed.
    #[error("Queue store error: {0}")]
    Store(String),
}

impl From<ScopeError> for TransportError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::CrossTenantAccess { .. } | ScopeError::PermissionDenied { .. } => {
                TransportError::Rejected(err.to_string())
            }
            other => TransportError::Store(other.to_string()),
        }
    }
}

/// Receipt for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryHandle {
    /// Transport-assigned id (queue document id for document hand-off).
    pub id: String,
    pub channel: MessageChannel,
    pub queued_at: DateTime<Utc>,
}

/// Destination for outbound messages.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Hands one message over. Must not retry internally.
    async fn enqueue(
        &self,
        ctx: &CompanyContext,
        message: &AutomatedMessage,
    ) -> Result<DeliveryHandle, TransportError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Writes messages as documents into per-channel queue collections.
///
/// Documents go through [`ScopedStore`], so the company id is stamped and a
/// message addressed to another company is rejected before it is written.
pub struct QueuedDocumentTransport {
    store: ScopedStore,
}

impl QueuedDocumentTransport {
    pub fn new(store: ScopedStore) -> Self {
        Self { store }
    }

    fn collection_for(channel: MessageChannel) -> &'static str {
        match channel {
            MessageChannel::Email => MAIL_COLLECTION,
            MessageChannel::Whatsapp => WHATSAPP_COLLECTION,
            MessageChannel::InApp => NOTIFICATIONS_COLLECTION,
        }
    }

    fn document_for(message: &AutomatedMessage, queued_at: DateTime<Utc>) -> Value {
        let locale = message.locale.as_str();
        let common = json!({
            "company_id": message.company_id,
            "trigger": message.trigger,
            "reference_id": message.reference_id,
            "dedup_key": message.dedup_key,
            "locale": locale,
            "created_at": queued_at,
        });

        let specific = match message.channel {
            MessageChannel::Email => json!({
                "to": message.target,
                "message": {
                    "subject": message.subject.as_ref().map(|s| s.for_locale(locale)),
                    "text": message.body.for_locale(locale),
                },
                "localized": {
                    "subject": message.subject,
                    "body": message.body,
                },
            }),
            MessageChannel::Whatsapp => json!({
                "to": message.target,
                "body": message.body.for_locale(locale),
                "localized": message.body,
                "status": "pending",
            }),
            MessageChannel::InApp => json!({
                "user_id": message.target,
                "title": message.subject.as_ref().map(|s| s.for_locale(locale)),
                "body": message.body.for_locale(locale),
                "localized": message.body,
                "read": false,
            }),
        };

        let mut document = common;
        if let (Some(target), Value::Object(extra)) = (document.as_object_mut(), specific) {
            target.extend(extra);
        }
        document
    }
}

#[async_trait]
impl MessageTransport for QueuedDocumentTransport {
    async fn enqueue(
        &self,
        ctx: &CompanyContext,
        message: &AutomatedMessage,
    ) -> Result<DeliveryHandle, TransportError> {
        if message.target.trim().is_empty() {
            return Err(TransportError::Rejected(format!(
                "message '{}' has no target",
                message.dedup_key
            )));
        }

        let queued_at = Utc::now();
        let collection = Self::collection_for(message.channel);
        let document = Self::document_for(message, queued_at);
        let id = self.store.insert(ctx, collection, document).await?;

        debug!(collection, id = %id, key = %message.dedup_key, "Message queued");
        Ok(DeliveryHandle {
            id,
            channel: message.channel,
            queued_at,
        })
    }

    fn name(&self) -> &'static str {
        "queued_document"
    }
}
