//! Bilingual message templates.

use crate::models::{Contract, LocalizedText, Payment};
use rust_decimal::Decimal;

fn money(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {}", amount, currency)
}

pub(crate) fn reminder_subject() -> LocalizedText {
    LocalizedText::new("Rent payment reminder", "تذكير بسداد الإيجار")
}

pub(crate) fn reminder_body(name: &str, payment: &Payment, currency: &str) -> LocalizedText {
    let amount = money(payment.amount, currency);
    LocalizedText::new(
        format!(
            "Dear {}, your rent payment of {} for unit {} was due on {}. Please settle it before the grace period ends.",
            name, amount, payment.unit_ref, payment.due_date
        ),
        format!(
            "عزيزي {}، استحقت دفعة الإيجار بمبلغ {} للوحدة {} بتاريخ {}. يرجى السداد قبل انتهاء فترة السماح.",
            name, amount, payment.unit_ref, payment.due_date
        ),
    )
}

pub(crate) fn escalation_subject(level: u32) -> LocalizedText {
    LocalizedText::new(
        format!("Overdue rent notice (level {})", level),
        format!("إشعار تأخر سداد الإيجار (المستوى {})", level),
    )
}

pub(crate) fn escalation_body(
    name: &str,
    payment: &Payment,
    currency: &str,
    days_overdue: i64,
    level: u32,
) -> LocalizedText {
    let amount = money(payment.amount, currency);
    LocalizedText::new(
        format!(
            "Dear {}, your rent payment of {} for unit {} is {} days overdue (escalation level {}). Please contact the property office immediately.",
            name, amount, payment.unit_ref, days_overdue, level
        ),
        format!(
            "عزيزي {}، دفعة الإيجار بمبلغ {} للوحدة {} متأخرة {} يوماً (مستوى التصعيد {}). يرجى التواصل مع إدارة العقار فوراً.",
            name, amount, payment.unit_ref, days_overdue, level
        ),
    )
}

pub(crate) fn renewal_subject() -> LocalizedText {
    LocalizedText::new("Your lease is ending soon", "عقد الإيجار على وشك الانتهاء")
}

pub(crate) fn renewal_body(name: &str, contract: &Contract, days_left: i64) -> LocalizedText {
    LocalizedText::new(
        format!(
            "Dear {}, your lease for unit {} ends on {} ({} days from today). Please contact us to arrange a renewal.",
            name, contract.unit_id, contract.end_date, days_left
        ),
        format!(
            "عزيزي {}، ينتهي عقد إيجار الوحدة {} بتاريخ {} (بعد {} يوماً). يرجى التواصل معنا لترتيب التجديد.",
            name, contract.unit_id, contract.end_date, days_left
        ),
    )
}
