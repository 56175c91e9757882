use crate::{
    model::{AttachmentRef, Instance, InstanceId, Kind, Obligation, ObligationId},
    money::{Money, Percentage},
};
use chrono::{DateTime, Utc};
use log::{debug, error, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// How settlements against earnings are recorded.
///
/// Expenses always track a cumulative settled amount. Earnings historically only tracked
/// a "received" flag, so a partial amount was shown to the user but never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarningPolicy {
    /// Earnings accumulate partial settlements exactly like expenses
    Cumulative,
    /// Earnings flip to received only when the full outstanding amount is entered
    Binary,
}

impl Default for EarningPolicy {
    fn default() -> Self {
        EarningPolicy::Cumulative
    }
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum SettlementError {
    #[error("settlement of {1} on instance {0} exceeds the remaining amount of {2}")]
    Overpayment(InstanceId, Money, Money), // instance, attempted, outstanding
    #[error("settlement amount must not be negative: {0}")]
    NegativeAmount(Money),
    #[error("instance {0} does not belong to obligation {1}")]
    ForeignInstance(InstanceId, ObligationId),
}

/// The settlement state of a single instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub is_settled: bool,
}

/// Obligation-level KPIs derived from its instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationSummary {
    pub total: Money,
    pub settled: Money,
    pub remaining: Money,
    pub pct_settled: Percentage,
}

/// An instance read together with the obligation it belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceView<'a> {
    pub obligation: &'a Obligation,
    pub instance: &'a Instance,
}

/// Whether an instance has reached its expected amount.
///
/// An instance that expects nothing is never considered settled.
pub fn is_settled(instance: &Instance) -> bool {
    instance.expected_amount.is_positive() && instance.settled_amount >= instance.expected_amount
}

pub fn instance_status(instance: &Instance) -> InstanceStatus {
    InstanceStatus {
        is_settled: is_settled(instance),
    }
}

/// Apply a settlement to `instance`, returning the updated copy.
///
/// Validation happens before anything is changed, so on error the caller still holds the
/// untouched instance. The input is never mutated; merging the result back into a store
/// is the caller's business.
pub fn record_settlement(
    obligation: &Obligation,
    instance: &Instance,
    amount: Money,
    at: DateTime<Utc>,
    attachment: Option<AttachmentRef>,
    policy: EarningPolicy,
) -> Result<Instance, SettlementError> {
    debug!(
        "recording settlement of {} against instance {} ({})",
        amount, instance.id, obligation.kind
    );

    if instance.obligation_id != obligation.id {
        error!("instance {} belongs to another obligation", instance.id);
        return Err(SettlementError::ForeignInstance(instance.id, obligation.id));
    }

    if amount < Money::ZERO {
        error!("refusing negative settlement {}", amount);
        return Err(SettlementError::NegativeAmount(amount));
    }

    // Money is exact to the cent, so "greater than expected + epsilon" is a plain
    // comparison here.
    if instance.settled_amount + amount > instance.expected_amount {
        error!(
            "settlement would overpay instance {}: {} + {} > {}",
            instance.id, instance.settled_amount, amount, instance.expected_amount
        );
        return Err(SettlementError::Overpayment(
            instance.id,
            amount,
            instance.outstanding(),
        ));
    }

    let mut updated = instance.clone();
    if let Some(r) = attachment {
        updated.attachment_ref = Some(r);
    }

    match (obligation.kind, policy) {
        (Kind::Earning, EarningPolicy::Binary) => {
            if instance.settled_amount + amount == instance.expected_amount {
                debug!("full amount received - mark instance {} received", instance.id);
                updated.settled_amount = instance.expected_amount;
                updated.settled_at = Some(at);
                updated.received_hint = None;
            } else {
                debug!(
                    "partial amount {} on binary earning {} kept as a hint only",
                    amount, instance.id
                );
                updated.received_hint = Some(amount);
            }
        }
        _ => {
            updated.settled_amount = instance.settled_amount + amount;
            updated.settled_at = Some(at);
            updated.received_hint = None;
        }
    }

    trace!(
        "instance {} settled {} of {}",
        updated.id,
        updated.settled_amount,
        updated.expected_amount
    );

    Ok(updated)
}

/// Summarise an obligation from its instances.
///
/// Instances of other obligations are ignored. Overpaid instances only count up to their
/// expected amount, so `remaining` can never go negative.
pub fn obligation_summary(obligation: &Obligation, instances: &[Instance]) -> ObligationSummary {
    let settled: Money = instances
        .iter()
        .filter(|i| i.obligation_id == obligation.id)
        .map(|i| i.settled_amount.min(i.expected_amount))
        .sum();

    let total = obligation.total_amount;
    let remaining = total.saturating_sub(settled);

    ObligationSummary {
        total,
        settled,
        remaining,
        pct_settled: Percentage::of(settled, total),
    }
}

/// Whether every instance of the obligation is settled. An obligation with no instances
/// is pending.
pub fn obligation_settled(obligation: &Obligation, instances: &[Instance]) -> bool {
    let mut own = instances
        .iter()
        .filter(|i| i.obligation_id == obligation.id)
        .peekable();

    own.peek().is_some() && own.all(is_settled)
}

/// Pair every instance with its obligation, preserving instance order.
pub fn join<'a>(obligations: &'a [Obligation], instances: &'a [Instance]) -> Vec<InstanceView<'a>> {
    let by_id: HashMap<ObligationId, &Obligation> =
        obligations.iter().map(|o| (o.id, o)).collect();

    instances
        .iter()
        .filter_map(|instance| match by_id.get(&instance.obligation_id) {
            Some(&obligation) => Some(InstanceView {
                obligation,
                instance,
            }),
            None => {
                warn!(
                    "instance {} refers to unknown obligation {}",
                    instance.id, instance.obligation_id
                );
                None
            }
        })
        .collect()
}
