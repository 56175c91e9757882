use crate::money::Money;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type ObligationId = u64;
pub type InstanceId = u64;
pub type WalletId = String;
pub type GroupId = String;
pub type UserId = String;

/// An opaque handle to a receipt or proof held by an `AttachmentStore`
pub type AttachmentRef = String;

/// Whether an obligation is money going out or coming in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Expense,
    Earning,
}

/// Records the recurrence of an obligation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Periodicity {
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// A recurring expense or earning definition.
///
/// Obligations own the schedule and the total; the money actually paid or received is
/// tracked per `Instance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obligation {
    pub id: ObligationId,
    pub kind: Kind,
    pub title: String,
    pub total_amount: Money,
    pub currency: String,
    #[serde(default)]
    pub category: String,
    pub wallet_id: WalletId,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    pub owner_id: UserId,
    pub start_date: NaiveDate,
    pub periodicity: Periodicity,
    pub repeat_count: u32,
}

/// One materialised installment of an obligation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: InstanceId,
    pub obligation_id: ObligationId,
    pub due_date: NaiveDate,
    pub expected_amount: Money,
    #[serde(default)]
    pub settled_amount: Money,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachment_ref: Option<AttachmentRef>,
    // An amount typed against a binary earning that did not reach the expected amount.
    // It is never persisted and never counts as settled.
    #[serde(skip)]
    pub received_hint: Option<Money>,
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum ObligationError {
    #[error("obligation {0} has a negative total amount")]
    NegativeTotal(ObligationId),
    #[error("obligation {0} has no currency")]
    MissingCurrency(ObligationId),
    #[error("obligation {0} has no wallet")]
    MissingWallet(ObligationId),
    #[error("obligation {0} does not repeat but has a repeat count of {1}")]
    RepeatWithoutPeriodicity(ObligationId, u32),
}

impl Obligation {
    /// Check the invariants an obligation must hold before it is stored.
    pub fn validate(&self) -> Result<(), ObligationError> {
        if self.total_amount < Money::ZERO {
            return Err(ObligationError::NegativeTotal(self.id));
        }
        if self.currency.trim().is_empty() {
            return Err(ObligationError::MissingCurrency(self.id));
        }
        if self.wallet_id.trim().is_empty() {
            return Err(ObligationError::MissingWallet(self.id));
        }
        if self.periodicity == Periodicity::None && self.repeat_count > 1 {
            return Err(ObligationError::RepeatWithoutPeriodicity(
                self.id,
                self.repeat_count,
            ));
        }

        Ok(())
    }
}

impl Instance {
    /// A new, unsettled instance
    pub fn new(
        id: InstanceId,
        obligation_id: ObligationId,
        due_date: NaiveDate,
        expected_amount: Money,
    ) -> Self {
        Instance {
            id,
            obligation_id,
            due_date,
            expected_amount,
            settled_amount: Money::ZERO,
            settled_at: None,
            attachment_ref: None,
            received_hint: None,
        }
    }

    /// The amount still owed against this instance, never negative
    pub fn outstanding(&self) -> Money {
        self.expected_amount.saturating_sub(self.settled_amount)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Expense => write!(f, "expense"),
            Kind::Earning => write!(f, "earning"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn obligation(id: ObligationId, kind: Kind, total: i64) -> Obligation {
        Obligation {
            id,
            kind,
            title: format!("obligation {}", id),
            total_amount: Money::from_cents(total * 100),
            currency: "EUR".into(),
            category: String::new(),
            wallet_id: "main".into(),
            group_id: None,
            owner_id: "alice".into(),
            start_date: date(2021, 1, 1),
            periodicity: Periodicity::Monthly,
            repeat_count: 3,
        }
    }

    #[test]
    fn validate_negative_total() {
        let mut o = obligation(1, Kind::Expense, 0);
        o.total_amount = -Money::from_cents(1);
        assert_eq!(o.validate(), Err(ObligationError::NegativeTotal(1)));
    }

    #[test]
    fn validate_repeat_without_periodicity() {
        let mut o = obligation(1, Kind::Expense, 10);
        o.periodicity = Periodicity::None;
        assert_eq!(
            o.validate(),
            Err(ObligationError::RepeatWithoutPeriodicity(1, 3))
        );
        o.repeat_count = 1;
        assert_eq!(o.validate(), Ok(()));
    }

    #[test]
    fn validate_missing_currency() {
        let mut o = obligation(2, Kind::Earning, 10);
        o.currency = " ".into();
        assert_eq!(o.validate(), Err(ObligationError::MissingCurrency(2)));
    }

    #[test]
    fn instance_outstanding_never_negative() {
        let mut i = Instance::new(1, 1, date(2021, 1, 1), Money::from_cents(100));
        i.settled_amount = Money::from_cents(150);
        assert_eq!(i.outstanding(), Money::ZERO);
    }

    #[test]
    fn obligation_json_field_names() {
        let json = serde_json::to_value(obligation(7, Kind::Earning, 300)).unwrap();
        assert_eq!(json["kind"], "earning");
        assert_eq!(json["periodicity"], "monthly");
        assert_eq!(json["totalAmount"], "300.00");
        assert_eq!(json["repeatCount"], 3);
    }

    #[test]
    fn instance_hint_is_not_serialized() {
        let mut i = Instance::new(1, 1, date(2021, 1, 1), Money::from_cents(100));
        i.received_hint = Some(Money::from_cents(50));
        let json = serde_json::to_value(&i).unwrap();
        assert!(json.get("receivedHint").is_none());
        assert!(json.get("expectedAmount").is_some());
    }
}
