use crate::{
    config::Config,
    granularity::Granularity,
    model::Kind,
    money::{DateRange, Money, Percentage},
    reconcile::InstanceView,
};
use chrono::NaiveDate;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Totals for a filtered set of instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_income: Money,
    pub total_expense: Money,
    pub net: Money,
    pub pct_income_received: Percentage,
    pub pct_expense_paid: Percentage,
    pub currency: String,
}

/// One time series bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    pub label: String,
    pub start: NaiveDate,
    pub income: Money,
    pub expense: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAmount {
    pub category: String,
    pub amount: Money,
}

/// Expected vs. settled amounts for one bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBucket {
    pub label: String,
    pub start: NaiveDate,
    pub expected: Money,
    pub settled: Money,
    pub pending: Money,
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum AggregateError {
    #[error("cannot total amounts in different currencies ({0} and {1})")]
    MixedCurrency(String, String),
}

/// Computes statistics over reconciled instances within a date range.
///
/// Every operation only looks at instances whose due date falls inside `range`, and all of
/// them total expected amounts. That is what keeps the views consistent with each other:
/// the buckets of a time series always add up to the summary of the same input.
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    range: DateRange,
    currency: String,
    uncategorized_label: String,
}

impl AggregationEngine {
    pub fn new(range: DateRange, config: &Config) -> Self {
        AggregationEngine {
            range,
            currency: config.currency.clone(),
            uncategorized_label: config.uncategorized_label.clone(),
        }
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    fn in_range<'v, 'a>(
        &'v self,
        views: &'v [InstanceView<'a>],
    ) -> impl Iterator<Item = &'v InstanceView<'a>> + 'v {
        views
            .iter()
            .filter(move |v| self.range.contains(v.instance.due_date))
    }

    pub fn summary(&self, views: &[InstanceView]) -> Result<Summary, AggregateError> {
        let mut currency: Option<&str> = None;
        let mut income = Money::ZERO;
        let mut income_settled = Money::ZERO;
        let mut expense = Money::ZERO;
        let mut expense_settled = Money::ZERO;

        for view in self.in_range(views) {
            match currency {
                None => currency = Some(view.obligation.currency.as_str()),
                Some(c) if c != view.obligation.currency => {
                    error!(
                        "summary input mixes {} and {}",
                        c, view.obligation.currency
                    );
                    return Err(AggregateError::MixedCurrency(
                        c.to_owned(),
                        view.obligation.currency.clone(),
                    ));
                }
                _ => {}
            }

            let i = view.instance;
            let settled = i.settled_amount.min(i.expected_amount);
            match view.obligation.kind {
                Kind::Earning => {
                    income += i.expected_amount;
                    income_settled += settled;
                }
                Kind::Expense => {
                    expense += i.expected_amount;
                    expense_settled += settled;
                }
            }
        }

        let summary = Summary {
            total_income: income,
            total_expense: expense,
            net: income - expense,
            pct_income_received: Percentage::of(income_settled, income),
            pct_expense_paid: Percentage::of(expense_settled, expense),
            currency: currency.unwrap_or(&self.currency).to_owned(),
        };

        debug!("summary over {:?}: {:?}", self.range, summary);

        Ok(summary)
    }

    /// Income and expense per bucket, with empty buckets included and in ascending order.
    pub fn time_series(&self, views: &[InstanceView], granularity: Granularity) -> Vec<TimeBucket> {
        let starts = granularity.buckets(&self.range);
        let index: HashMap<NaiveDate, usize> =
            starts.iter().enumerate().map(|(i, s)| (*s, i)).collect();

        let mut buckets: Vec<TimeBucket> = starts
            .iter()
            .map(|start| TimeBucket {
                label: granularity.label(*start),
                start: *start,
                income: Money::ZERO,
                expense: Money::ZERO,
            })
            .collect();

        for view in self.in_range(views) {
            let start = granularity.bucket_start(view.instance.due_date);
            // Every in-range date has a bucket, as `buckets` walks the whole range
            if let Some(&i) = index.get(&start) {
                trace!(
                    "instance {} ({}) -> bucket {}",
                    view.instance.id,
                    view.instance.due_date,
                    buckets[i].label
                );
                match view.obligation.kind {
                    Kind::Earning => buckets[i].income += view.instance.expected_amount,
                    Kind::Expense => buckets[i].expense += view.instance.expected_amount,
                }
            }
        }

        debug!(
            "time series by {} over {:?}: {} buckets",
            granularity,
            self.range,
            buckets.len()
        );

        buckets
    }

    /// Expected amounts of one kind grouped by category, in order of first appearance.
    pub fn category_breakdown(&self, views: &[InstanceView], kind: Kind) -> Vec<CategoryAmount> {
        let mut groups: Vec<CategoryAmount> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for view in self.in_range(views).filter(|v| v.obligation.kind == kind) {
            let category = match view.obligation.category.trim() {
                "" => self.uncategorized_label.as_str(),
                c => c,
            };

            match index.get(category) {
                Some(&i) => groups[i].amount += view.instance.expected_amount,
                None => {
                    index.insert(category.to_owned(), groups.len());
                    groups.push(CategoryAmount {
                        category: category.to_owned(),
                        amount: view.instance.expected_amount,
                    });
                }
            }
        }

        groups
    }

    /// Expected, settled and pending amounts of one kind per bucket.
    pub fn status_split(
        &self,
        views: &[InstanceView],
        kind: Kind,
        granularity: Granularity,
    ) -> Vec<StatusBucket> {
        let starts = granularity.buckets(&self.range);
        let index: HashMap<NaiveDate, usize> =
            starts.iter().enumerate().map(|(i, s)| (*s, i)).collect();

        let mut buckets: Vec<StatusBucket> = starts
            .iter()
            .map(|start| StatusBucket {
                label: granularity.label(*start),
                start: *start,
                expected: Money::ZERO,
                settled: Money::ZERO,
                pending: Money::ZERO,
            })
            .collect();

        for view in self.in_range(views).filter(|v| v.obligation.kind == kind) {
            let start = granularity.bucket_start(view.instance.due_date);
            if let Some(&i) = index.get(&start) {
                let instance = view.instance;
                buckets[i].expected += instance.expected_amount;
                buckets[i].settled += instance.settled_amount.min(instance.expected_amount);
            }
        }

        for bucket in buckets.iter_mut() {
            bucket.pending = bucket.expected.saturating_sub(bucket.settled);
        }

        buckets
    }
}
