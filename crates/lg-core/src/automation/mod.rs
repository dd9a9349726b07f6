//! Notification automation.
//!
//! Turns the payment classification of one company into a queue of
//! outbound messages and hands that queue to a [`MessageTransport`]:
//!
//! - a reminder for every payment within its grace period
//! - an escalation notice for every payment at escalation level 2 or above
//! - a renewal notice for every active contract ending within the look-ahead
//!
//! Building the queue is pure. Identical inputs give an identical queue,
//! sorted by de-duplication key, so a re-run can be filtered against the
//! [`crate::db::DeliveryLedger`] instead of re-sending.

mod dispatch;
pub mod mock;
mod templates;
pub mod transport;

pub use dispatch::{DeliveryOutcome, NotificationDispatcher, DEFAULT_LEDGER_RETENTION_HOURS};
pub use transport::{
    DeliveryHandle, MessageTransport, QueuedDocumentTransport, TransportError, MAIL_COLLECTION,
    NOTIFICATIONS_COLLECTION, WHATSAPP_COLLECTION,
};

use crate::finance::{detect_payment_issues, FinancePolicy};
use crate::models::{
    partition_valid, CompanyRecord, Contract, LocalizedText, MalformedRecordError, Payment,
    TenantContact, TENANT_CONTACTS,
};
use crate::scope::ScopeError;
use crate::tenant::CompanyContext;
use chrono::{DateTime, Utc};
use lg_observability::metrics::MESSAGES_QUEUED;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Escalation level from which overdue tenants are notified.
pub const MIN_NOTIFIED_ESCALATION_LEVEL: u32 = 2;

/// Outbound channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    Whatsapp,
    Email,
    InApp,
}

impl MessageChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageChannel::Whatsapp => "whatsapp",
            MessageChannel::Email => "email",
            MessageChannel::InApp => "in_app",
        }
    }
}

impl fmt::Display for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a message was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerTag {
    /// Payment overdue but within its grace period.
    PaymentReminder,
    /// Payment past grace at the given escalation level.
    PaymentEscalation { level: u32 },
    /// Contract ending within the renewal look-ahead.
    ContractRenewal,
}

impl TriggerTag {
    /// Returns the string representation of the trigger.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerTag::PaymentReminder => "payment_reminder",
            TriggerTag::PaymentEscalation { .. } => "payment_escalation",
            TriggerTag::ContractRenewal => "contract_renewal",
        }
    }

    /// Escalation level, if any.
    pub fn level(&self) -> Option<u32> {
        match self {
            TriggerTag::PaymentEscalation { level } => Some(*level),
            _ => None,
        }
    }
}

/// One message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatedMessage {
    pub company_id: Uuid,
    pub channel: MessageChannel,
    /// Phone number, email address, or user id depending on the channel.
    pub target: String,
    /// Email only.
    pub subject: Option<LocalizedText>,
    pub body: LocalizedText,
    /// Recipient's preferred locale.
    pub locale: String,
    pub trigger: TriggerTag,
    /// Payment or contract the message is about.
    pub reference_id: String,
    pub dedup_key: String,
}

/// Builds the de-duplication key `trigger:reference:channel:discriminator`.
pub fn dedup_key(
    trigger: &TriggerTag,
    reference_id: &str,
    channel: MessageChannel,
    discriminator: &str,
) -> String {
    format!(
        "{}:{}:{}:{}",
        trigger.as_str(),
        reference_id,
        channel.as_str(),
        discriminator
    )
}

/// Output of [`process_automation_queue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationQueue {
    pub company_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// Sorted by `dedup_key`, without duplicates.
    pub messages: Vec<AutomatedMessage>,
    pub skipped: Vec<MalformedRecordError>,
}

impl AutomationQueue {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages produced by one kind of trigger.
    pub fn by_trigger<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a AutomatedMessage> + 'a {
        self.messages.iter().filter(move |m| m.trigger.as_str() == kind)
    }
}

/// Keeps records owned by `company_id`, reporting the rest.
fn own_records<T: CompanyRecord + Clone>(
    records: &[T],
    company_id: Uuid,
    skipped: &mut Vec<MalformedRecordError>,
) -> Vec<T> {
    let mut own = Vec::with_capacity(records.len());
    for record in records {
        if record.company_id() == company_id {
            own.push(record.clone());
        } else {
            warn!(
                kind = T::KIND,
                id = record.id(),
                owner = %record.company_id(),
                "Skipping record owned by another company"
            );
            skipped.push(record.malformed(format!(
                "belongs to company {}, not {}",
                record.company_id(),
                company_id
            )));
        }
    }
    own
}

/// Addressable channels of a contact, WhatsApp first.
fn channels_for(contact: &TenantContact) -> Vec<(MessageChannel, String)> {
    let mut channels = Vec::with_capacity(2);
    if let Some(phone) = contact.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        channels.push((MessageChannel::Whatsapp, phone.to_string()));
    }
    if let Some(email) = contact.email.as_deref().filter(|e| !e.trim().is_empty()) {
        channels.push((MessageChannel::Email, email.to_string()));
    }
    channels
}

struct QueueBuilder<'a> {
    company_id: Uuid,
    contracts: HashMap<&'a str, &'a Contract>,
    contacts: HashMap<&'a str, &'a TenantContact>,
    messages: Vec<AutomatedMessage>,
    skipped: Vec<MalformedRecordError>,
}

impl<'a> QueueBuilder<'a> {
    /// Finds the contact a payment's messages go to.
    fn recipient_for_payment(&mut self, payment: &Payment) -> Option<&'a TenantContact> {
        let Some(contract) = self.contracts.get(payment.contract_id.as_str()).copied() else {
            self.skipped.push(payment.malformed(format!(
                "references unknown contract '{}'",
                payment.contract_id
            )));
            return None;
        };
        self.recipient_for_contract(contract)
    }

    fn recipient_for_contract(&mut self, contract: &Contract) -> Option<&'a TenantContact> {
        match self.contacts.get(contract.tenant_contact_id.as_str()).copied() {
            Some(contact) => Some(contact),
            None => {
                self.skipped.push(contract.malformed(format!(
                    "references unknown tenant contact '{}'",
                    contract.tenant_contact_id
                )));
                None
            }
        }
    }

    fn push_for_contact(
        &mut self,
        contact: &TenantContact,
        trigger: TriggerTag,
        reference_id: &str,
        discriminator: &str,
        subject: LocalizedText,
        body: LocalizedText,
    ) {
        let channels = channels_for(contact);
        if channels.is_empty() {
            self.skipped.push(MalformedRecordError::new(
                TENANT_CONTACTS,
                contact.id.clone(),
                "has neither phone nor email",
            ));
            return;
        }

        for (channel, target) in channels {
            self.messages.push(AutomatedMessage {
                company_id: self.company_id,
                channel,
                target,
                subject: (channel == MessageChannel::Email).then(|| subject.clone()),
                body: body.clone(),
                locale: contact.preferred_locale.clone(),
                trigger,
                reference_id: reference_id.to_string(),
                dedup_key: dedup_key(&trigger, reference_id, channel, discriminator),
            });
        }
    }
}

/// Builds the outbound message queue for the context's company.
///
/// # Errors
///
/// `ScopeError::MissingCompany` when the context is not bound to a single
/// company; queues are always built per company.
pub fn process_automation_queue(
    ctx: &CompanyContext,
    payments: &[Payment],
    contracts: &[Contract],
    contacts: &[TenantContact],
    policy: &FinancePolicy,
    now: DateTime<Utc>,
) -> Result<AutomationQueue, ScopeError> {
    let company_id = ctx.company_id().ok_or_else(|| {
        ScopeError::MissingCompany("automation queues are built for one company".to_string())
    })?;
    let today = now.date_naive();
    let currency = ctx.settings().currency.clone();

    let mut skipped = Vec::new();
    let payments = own_records(payments, company_id, &mut skipped);
    let contracts = own_records(contracts, company_id, &mut skipped);
    let contacts = own_records(contacts, company_id, &mut skipped);

    let (valid_contracts, bad_contracts) = partition_valid(&contracts);
    let (valid_contacts, bad_contacts) = partition_valid(&contacts);
    skipped.extend(bad_contracts);
    skipped.extend(bad_contacts);

    let classification = detect_payment_issues(&payments, policy, now);
    skipped.extend(classification.skipped.iter().cloned());

    let mut builder = QueueBuilder {
        company_id,
        contracts: valid_contracts.iter().map(|&c| (c.id.as_str(), c)).collect(),
        contacts: valid_contacts.iter().map(|&c| (c.id.as_str(), c)).collect(),
        messages: Vec::new(),
        skipped,
    };

    for overdue in &classification.within_grace {
        let payment = &overdue.payment;
        if let Some(contact) = builder.recipient_for_payment(payment) {
            builder.push_for_contact(
                contact,
                TriggerTag::PaymentReminder,
                &payment.id,
                &payment.due_date.to_string(),
                templates::reminder_subject(),
                templates::reminder_body(&contact.name, payment, &currency),
            );
        }
    }

    for entry in &classification.needs_escalation {
        if entry.level < MIN_NOTIFIED_ESCALATION_LEVEL {
            continue;
        }
        let payment = &entry.payment;
        if let Some(contact) = builder.recipient_for_payment(payment) {
            builder.push_for_contact(
                contact,
                TriggerTag::PaymentEscalation { level: entry.level },
                &payment.id,
                &entry.level.to_string(),
                templates::escalation_subject(entry.level),
                templates::escalation_body(
                    &contact.name,
                    payment,
                    &currency,
                    entry.days_overdue,
                    entry.level,
                ),
            );
        }
    }

    let lookahead = i64::from(policy.renewal_lookahead_days);
    for contract in valid_contracts.iter().filter(|c| c.is_active()) {
        let days_left = contract.days_until_end(today);
        if !(0..=lookahead).contains(&days_left) {
            continue;
        }
        if let Some(contact) = builder.recipient_for_contract(contract) {
            builder.push_for_contact(
                contact,
                TriggerTag::ContractRenewal,
                &contract.id,
                &contract.end_date.to_string(),
                templates::renewal_subject(),
                templates::renewal_body(&contact.name, contract, days_left),
            );
        }
    }

    let QueueBuilder {
        mut messages,
        mut skipped,
        ..
    } = builder;

    messages.sort_by(|a, b| a.dedup_key.cmp(&b.dedup_key));
    messages.dedup_by(|a, b| a.dedup_key == b.dedup_key);
    skipped.sort_by(|a, b| (&a.kind, &a.id, &a.reason).cmp(&(&b.kind, &b.id, &b.reason)));
    skipped.dedup();

    ::metrics::counter!(MESSAGES_QUEUED).increment(messages.len() as u64);
    debug!(
        company_id = %company_id,
        messages = messages.len(),
        skipped = skipped.len(),
        "Automation queue built"
    );

    Ok(AutomationQueue {
        company_id,
        generated_at: now,
        messages,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContractStatus, PaymentFrequency, PaymentStatus};
    use crate::tenant::{CompanySettings, Role};
    use chrono::{Days, NaiveDate, TimeZone};
    use rust_decimal::Decimal;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 6, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        now().date_naive()
    }

    struct Fixture {
        company_id: Uuid,
        ctx: CompanyContext,
        contracts: Vec<Contract>,
        contacts: Vec<TenantContact>,
    }

    fn fixture() -> Fixture {
        let company_id = Uuid::new_v4();
        let ctx = CompanyContext::for_company(
            company_id,
            "manager-1",
            Role::Manager,
            false,
            CompanySettings::default(),
        );
        let contracts = vec![Contract {
            id: "c-1".to_string(),
            company_id,
            tenant_contact_id: "t-1".to_string(),
            property_id: "prop-1".to_string(),
            unit_id: "unit-101".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            rent_amount: Decimal::from(3000),
            payment_frequency: PaymentFrequency::Monthly,
            status: ContractStatus::Active,
        }];
        let contacts = vec![TenantContact {
            id: "t-1".to_string(),
            company_id,
            name: "Noura".to_string(),
            phone: Some("+966500000001".to_string()),
            email: Some("noura@example.com".to_string()),
            preferred_locale: "ar".to_string(),
        }];
        Fixture {
            company_id,
            ctx,
            contracts,
            contacts,
        }
    }

    fn overdue_payment(company_id: Uuid, id: &str, days: u64) -> Payment {
        Payment {
            id: id.to_string(),
            company_id,
            contract_id: "c-1".to_string(),
            tenant_name: "Noura".to_string(),
            unit_ref: "unit-101".to_string(),
            due_date: today() - Days::new(days),
            amount: Decimal::from(3000),
            status: PaymentStatus::Due,
            paid_at: None,
            method: None,
        }
    }

    #[test]
    fn test_reminder_goes_to_whatsapp_and_email() {
        let f = fixture();
        let payments = vec![overdue_payment(f.company_id, "p-1", 3)];
        let queue = process_automation_queue(
            &f.ctx,
            &payments,
            &f.contracts,
            &f.contacts,
            &FinancePolicy::default(),
            now(),
        )
        .unwrap();

        assert_eq!(queue.len(), 2);
        let channels: Vec<MessageChannel> = queue.messages.iter().map(|m| m.channel).collect();
        assert!(channels.contains(&MessageChannel::Whatsapp));
        assert!(channels.contains(&MessageChannel::Email));
        for message in &queue.messages {
            assert_eq!(message.trigger, TriggerTag::PaymentReminder);
            assert_eq!(message.company_id, f.company_id);
        }
        let email = queue
            .messages
            .iter()
            .find(|m| m.channel == MessageChannel::Email)
            .unwrap();
        assert!(email.subject.is_some());
        assert_eq!(
            email.dedup_key,
            format!("payment_reminder:p-1:email:{}", today() - Days::new(3))
        );
    }

    #[test]
    fn test_level_one_escalation_is_silent() {
        let f = fixture();
        let payments = vec![overdue_payment(f.company_id, "p-1", 16)];
        let queue = process_automation_queue(
            &f.ctx,
            &payments,
            &f.contracts,
            &f.contacts,
            &FinancePolicy::default(),
            now(),
        )
        .unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_level_two_escalation_is_sent() {
        let f = fixture();
        let payments = vec![overdue_payment(f.company_id, "p-1", 31)];
        let queue = process_automation_queue(
            &f.ctx,
            &payments,
            &f.contracts,
            &f.contacts,
            &FinancePolicy::default(),
            now(),
        )
        .unwrap();
        assert_eq!(queue.by_trigger("payment_escalation").count(), 2);
        assert!(queue
            .messages
            .iter()
            .all(|m| m.trigger == TriggerTag::PaymentEscalation { level: 2 }));
        assert!(queue.messages[0].dedup_key.ends_with(":2"));
    }

    #[test]
    fn test_renewal_within_lookahead() {
        let mut f = fixture();
        f.contracts[0].end_date = today() + Days::new(20);
        let queue = process_automation_queue(
            &f.ctx,
            &[],
            &f.contracts,
            &f.contacts,
            &FinancePolicy::default(),
            now(),
        )
        .unwrap();
        assert_eq!(queue.by_trigger("contract_renewal").count(), 2);

        f.contracts[0].end_date = today() + Days::new(31);
        let queue = process_automation_queue(
            &f.ctx,
            &[],
            &f.contracts,
            &f.contacts,
            &FinancePolicy::default(),
            now(),
        )
        .unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_whatsapp_only_when_contact_has_no_email() {
        let mut f = fixture();
        f.contacts[0].email = None;
        let payments = vec![overdue_payment(f.company_id, "p-1", 2)];
        let queue = process_automation_queue(
            &f.ctx,
            &payments,
            &f.contracts,
            &f.contacts,
            &FinancePolicy::default(),
            now(),
        )
        .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.messages[0].channel, MessageChannel::Whatsapp);
        assert!(queue.messages[0].subject.is_none());
    }

    #[test]
    fn test_unreachable_contact_is_reported() {
        let mut f = fixture();
        f.contacts[0].email = None;
        f.contacts[0].phone = None;
        let payments = vec![
            overdue_payment(f.company_id, "p-1", 2),
            overdue_payment(f.company_id, "p-2", 4),
        ];
        let queue = process_automation_queue(
            &f.ctx,
            &payments,
            &f.contracts,
            &f.contacts,
            &FinancePolicy::default(),
            now(),
        )
        .unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.skipped.len(), 1);
        assert_eq!(queue.skipped[0].kind, TENANT_CONTACTS);
    }

    #[test]
    fn test_foreign_records_are_skipped() {
        let f = fixture();
        let other = Uuid::new_v4();
        let payments = vec![overdue_payment(other, "foreign", 3)];
        let queue = process_automation_queue(
            &f.ctx,
            &payments,
            &f.contracts,
            &f.contacts,
            &FinancePolicy::default(),
            now(),
        )
        .unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.skipped.len(), 1);
        assert_eq!(queue.skipped[0].id, "foreign");
    }

    #[test]
    fn test_queue_is_stable_and_sorted() {
        let f = fixture();
        let mut payments = vec![
            overdue_payment(f.company_id, "p-3", 45),
            overdue_payment(f.company_id, "p-1", 2),
            overdue_payment(f.company_id, "p-2", 4),
        ];
        let first = process_automation_queue(
            &f.ctx,
            &payments,
            &f.contracts,
            &f.contacts,
            &FinancePolicy::default(),
            now(),
        )
        .unwrap();
        payments.reverse();
        let second = process_automation_queue(
            &f.ctx,
            &payments,
            &f.contracts,
            &f.contacts,
            &FinancePolicy::default(),
            now(),
        )
        .unwrap();

        assert_eq!(first, second);
        let keys: Vec<&str> = first.messages.iter().map(|m| m.dedup_key.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(first.len(), 6);
    }

    #[test]
    fn test_duplicate_payments_collapse_to_one_message_per_channel() {
        let f = fixture();
        let payment = overdue_payment(f.company_id, "p-1", 3);
        let queue = process_automation_queue(
            &f.ctx,
            &[payment.clone(), payment],
            &f.contracts,
            &f.contacts,
            &FinancePolicy::default(),
            now(),
        )
        .unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_all_companies_context_cannot_build_queue() {
        let ctx = CompanyContext::all_companies("ops");
        let err = process_automation_queue(&ctx, &[], &[], &[], &FinancePolicy::default(), now())
            .unwrap_err();
        assert!(matches!(err, ScopeError::MissingCompany(_)));
    }
}
