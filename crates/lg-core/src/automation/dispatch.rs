//! Dispatch of automation queues.

use super::transport::{DeliveryHandle, MessageTransport, TransportError};
use super::{AutomatedMessage, MessageChannel};
use crate::db::{DbError, DeliveryLedger};
use crate::scope::TenantScope;
use crate::tenant::{CompanyContext, Permission};
use chrono::{DateTime, Duration, Utc};
use lg_observability::metrics::{MESSAGES_FAILED, MESSAGES_SENT};
use lg_observability::{AuditEventType, AuditLogger, AuditScope};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Window in which an already delivered key is not sent again.
pub const DEFAULT_LEDGER_RETENTION_HOURS: i64 = 20;

/// Result of one message hand-off.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub dedup_key: String,
    pub channel: MessageChannel,
    pub result: Result<DeliveryHandle, TransportError>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Sends messages through a transport, auditing every attempt and
/// recording delivered keys in the ledger.
pub struct NotificationDispatcher {
    transport: Arc<dyn MessageTransport>,
    ledger: Arc<dyn DeliveryLedger>,
    audit: Arc<AuditLogger>,
    scope: TenantScope,
    retention: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        ledger: Arc<dyn DeliveryLedger>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            transport,
            ledger,
            scope: TenantScope::new(audit.clone()),
            audit,
            retention: Duration::hours(DEFAULT_LEDGER_RETENTION_HOURS),
        }
    }

    /// Overrides the ledger retention window. Values below one hour are
    /// raised to one hour.
    pub fn with_retention_hours(mut self, hours: i64) -> Self {
        self.retention = Duration::hours(hours.max(1));
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Drops messages whose key was delivered within the retention window.
    ///
    /// Returns the messages still to send and the number suppressed.
    pub async fn filter_unsent(
        &self,
        ctx: &CompanyContext,
        messages: Vec<AutomatedMessage>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<AutomatedMessage>, usize), DbError> {
        let since = now - self.retention;
        let mut unsent = Vec::with_capacity(messages.len());
        let mut suppressed = 0;

        for message in messages {
            if self
                .ledger
                .was_sent_since(message.company_id, &message.dedup_key, since)
                .await?
            {
                debug!(key = %message.dedup_key, "Message already delivered, suppressing");
                suppressed += 1;
            } else {
                unsent.push(message);
            }
        }

        if suppressed > 0 {
            debug!(
                company_id = ?ctx.company_id(),
                suppressed,
                "Suppressed previously delivered messages"
            );
        }
        Ok((unsent, suppressed))
    }

    /// Hands each message to the transport.
    ///
    /// A failed message never stops the rest. Messages for a company other
    /// than the context's are rejected without reaching the transport, as is
    /// everything when the context may not send notifications. Delivered
    /// keys are recorded in the ledger at `now`, the same clock
    /// [`Self::filter_unsent`] is checked against.
    #[instrument(skip_all, fields(transport = self.transport.name(), count = messages.len()))]
    pub async fn send_messages(
        &self,
        ctx: &CompanyContext,
        messages: &[AutomatedMessage],
        now: DateTime<Utc>,
    ) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(messages.len());
        let denied = if messages.is_empty() {
            None
        } else {
            self.scope
                .authorize(ctx, Permission::SendNotifications, "notifications", "send")
                .await
                .err()
        };

        for message in messages {
            let result = match (&denied, ctx.company_id()) {
                (Some(err), _) => Err(TransportError::from(err.clone())),
                (None, Some(company_id)) if company_id != message.company_id => {
                    Err(TransportError::Rejected(format!(
                        "message for company {} sent under company {}",
                        message.company_id, company_id
                    )))
                }
                (None, _) => self.transport.enqueue(ctx, message).await,
            };

            match &result {
                Ok(handle) => self.on_delivered(ctx, message, handle, now).await,
                Err(err) => self.on_failed(ctx, message, err).await,
            }

            outcomes.push(DeliveryOutcome {
                dedup_key: message.dedup_key.clone(),
                channel: message.channel,
                result,
            });
        }

        let sent = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            sent,
            failed = outcomes.len() - sent,
            "Notification dispatch finished"
        );
        outcomes
    }

    async fn on_delivered(
        &self,
        ctx: &CompanyContext,
        message: &AutomatedMessage,
        handle: &DeliveryHandle,
        now: DateTime<Utc>,
    ) {
        ::metrics::counter!(MESSAGES_SENT, "channel" => message.channel.as_str()).increment(1);

        self.audit
            .log_info(
                AuditScope::Company(message.company_id),
                AuditEventType::NotificationSent,
                format!(
                    "{} sent via {} for {}",
                    message.trigger.as_str(),
                    message.channel,
                    message.reference_id
                ),
                format!(
                    "تم إرسال إشعار {} عبر {} للمرجع {}",
                    message.trigger.as_str(),
                    message.channel,
                    message.reference_id
                ),
                json!({
                    "trigger": message.trigger.as_str(),
                    "level": message.trigger.level(),
                    "channel": message.channel.as_str(),
                    "reference_id": message.reference_id,
                    "dedup_key": message.dedup_key,
                    "delivery_id": handle.id,
                    "actor": ctx.actor_id(),
                }),
            )
            .await;

        if let Err(err) = self
            .ledger
            .record_sent(message.company_id, &message.dedup_key, now)
            .await
        {
            warn!(
                key = %message.dedup_key,
                error = %err,
                "Failed to record delivery in ledger"
            );
        }
    }

    async fn on_failed(&self, ctx: &CompanyContext, message: &AutomatedMessage, err: &TransportError) {
        ::metrics::counter!(MESSAGES_FAILED, "channel" => message.channel.as_str()).increment(1);
        warn!(key = %message.dedup_key, error = %err, "Message delivery failed");

        self.audit
            .log_error(
                AuditScope::Company(message.company_id),
                AuditEventType::NotificationFailed,
                format!(
                    "{} via {} for {} failed: {}",
                    message.trigger.as_str(),
                    message.channel,
                    message.reference_id,
                    err
                ),
                format!(
                    "فشل إرسال إشعار {} عبر {} للمرجع {}",
                    message.trigger.as_str(),
                    message.channel,
                    message.reference_id
                ),
                json!({
                    "trigger": message.trigger.as_str(),
                    "level": message.trigger.level(),
                    "channel": message.channel.as_str(),
                    "reference_id": message.reference_id,
                    "dedup_key": message.dedup_key,
                    "error": err.to_string(),
                    "actor": ctx.actor_id(),
                }),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::mock::MockTransport;
    use crate::automation::TriggerTag;
    use crate::db::mocks::MemoryDeliveryLedger;
    use crate::models::LocalizedText;
    use crate::tenant::{CompanySettings, Role};
    use chrono::TimeZone;
    use lg_observability::{AuditLevel, MemoryAuditSink};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 6, 0, 0).unwrap()
    }

    fn message(company_id: Uuid, reference: &str, trigger: TriggerTag) -> AutomatedMessage {
        let channel = MessageChannel::Whatsapp;
        AutomatedMessage {
            company_id,
            channel,
            target: "+966500000001".to_string(),
            subject: None,
            body: LocalizedText::new("Body", "النص"),
            locale: "ar".to_string(),
            trigger,
            reference_id: reference.to_string(),
            dedup_key: crate::automation::dedup_key(&trigger, reference, channel, "2024-06-10"),
        }
    }

    struct Harness {
        company_id: Uuid,
        ctx: CompanyContext,
        transport: Arc<MockTransport>,
        ledger: Arc<MemoryDeliveryLedger>,
        sink: Arc<MemoryAuditSink>,
        dispatcher: NotificationDispatcher,
    }

    fn harness() -> Harness {
        let company_id = Uuid::new_v4();
        let ctx = CompanyContext::for_company(
            company_id,
            "system",
            Role::SuperAdmin,
            true,
            CompanySettings::default(),
        );
        let transport = Arc::new(MockTransport::new());
        let ledger = Arc::new(MemoryDeliveryLedger::new());
        let sink = Arc::new(MemoryAuditSink::new());
        let audit = Arc::new(AuditLogger::without_tracing(sink.clone()));
        let dispatcher = NotificationDispatcher::new(transport.clone(), ledger.clone(), audit);
        Harness {
            company_id,
            ctx,
            transport,
            ledger,
            sink,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_send_audits_each_attempt() {
        let h = harness();
        let messages = vec![
            message(h.company_id, "p-1", TriggerTag::PaymentReminder),
            message(h.company_id, "p-2", TriggerTag::PaymentEscalation { level: 2 }),
        ];

        let outcomes = h.dispatcher.send_messages(&h.ctx, &messages, now()).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.is_success()));
        assert_eq!(h.transport.sent().await.len(), 2);

        let sent = h
            .sink
            .entries_by_type(&AuditEventType::NotificationSent)
            .await;
        assert_eq!(sent.len(), 2);
        assert!(sent
            .iter()
            .all(|e| e.scope == AuditScope::Company(h.company_id)));
        let escalation = sent
            .iter()
            .find(|e| e.metadata["reference_id"] == "p-2")
            .unwrap();
        assert_eq!(escalation.metadata["trigger"], "payment_escalation");
        assert_eq!(escalation.metadata["level"], 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_messages() {
        let h = harness();
        let first = message(h.company_id, "p-1", TriggerTag::PaymentReminder);
        let second = message(h.company_id, "p-2", TriggerTag::PaymentReminder);
        h.transport.fail_key(&first.dedup_key).await;

        let outcomes = h
            .dispatcher
            .send_messages(&h.ctx, &[first.clone(), second.clone()], now())
            .await;

        assert!(!outcomes[0].is_success());
        assert!(outcomes[1].is_success());

        let failed = h
            .sink
            .entries_by_type(&AuditEventType::NotificationFailed)
            .await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].level, AuditLevel::Error);
        assert_eq!(failed[0].metadata["dedup_key"], first.dedup_key.as_str());

        // Only the delivered key is in the ledger.
        assert_eq!(h.ledger.count_for(h.company_id).await, 1);
    }

    #[tokio::test]
    async fn test_foreign_message_never_reaches_transport() {
        let h = harness();
        let foreign = message(Uuid::new_v4(), "p-9", TriggerTag::PaymentReminder);

        let outcomes = h.dispatcher.send_messages(&h.ctx, &[foreign], now()).await;
        assert!(matches!(
            outcomes[0].result,
            Err(TransportError::Rejected(_))
        ));
        assert!(h.transport.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_ledger_suppresses_resend_within_window() {
        let h = harness();
        let msg = message(h.company_id, "p-1", TriggerTag::PaymentReminder);

        h.dispatcher
            .send_messages(&h.ctx, &[msg.clone()], now())
            .await;

        let (unsent, suppressed) = h
            .dispatcher
            .filter_unsent(&h.ctx, vec![msg.clone()], now() + Duration::hours(1))
            .await
            .unwrap();
        assert!(unsent.is_empty());
        assert_eq!(suppressed, 1);
    }

    #[tokio::test]
    async fn test_ledger_allows_send_after_window() {
        let h = harness();
        let msg = message(h.company_id, "p-1", TriggerTag::PaymentReminder);
        h.ledger
            .record_sent(h.company_id, &msg.dedup_key, now())
            .await
            .unwrap();

        let later = now() + Duration::hours(DEFAULT_LEDGER_RETENTION_HOURS + 1);
        let (unsent, suppressed) = h
            .dispatcher
            .filter_unsent(&h.ctx, vec![msg], later)
            .await
            .unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(suppressed, 0);
    }

    #[tokio::test]
    async fn test_ledger_uses_evaluation_time_not_wall_clock() {
        let h = harness();
        let msg = message(h.company_id, "p-1", TriggerTag::PaymentReminder);
        let future = Utc.with_ymd_and_hms(2099, 1, 10, 6, 0, 0).unwrap();

        h.dispatcher
            .send_messages(&h.ctx, &[msg.clone()], future)
            .await;

        let (unsent, suppressed) = h
            .dispatcher
            .filter_unsent(&h.ctx, vec![msg], future)
            .await
            .unwrap();
        assert!(unsent.is_empty());
        assert_eq!(suppressed, 1);
    }

    #[tokio::test]
    async fn test_viewer_cannot_send() {
        let h = harness();
        let viewer = CompanyContext::for_company(
            h.company_id,
            "viewer-1",
            Role::Viewer,
            false,
            CompanySettings::default(),
        );
        let messages = vec![
            message(h.company_id, "p-1", TriggerTag::PaymentReminder),
            message(h.company_id, "p-2", TriggerTag::PaymentReminder),
        ];

        let outcomes = h.dispatcher.send_messages(&viewer, &messages, now()).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, Err(TransportError::Rejected(_)))));
        assert!(h.transport.sent().await.is_empty());
        assert_eq!(h.ledger.count_for(h.company_id).await, 0);

        let denied = h
            .sink
            .entries_by_type(&AuditEventType::PermissionDenied)
            .await;
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].scope, AuditScope::Company(h.company_id));
        assert_eq!(denied[0].metadata["permission"], "send_notifications");
        assert_eq!(
            h.sink
                .entries_by_type(&AuditEventType::NotificationFailed)
                .await
                .len(),
            2
        );
    }

    #[test]
    fn test_retention_floor() {
        let h = harness();
        let dispatcher = h.dispatcher.with_retention_hours(0);
        assert_eq!(dispatcher.retention(), Duration::hours(1));
    }
}
