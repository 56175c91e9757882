use crate::{
    aggregate::{AggregationEngine, CategoryAmount, StatusBucket, Summary, TimeBucket},
    config::Config,
    error::{Error, ValidationError},
    filter::{self, DisplayNames, FilterCriteria},
    granularity::Granularity,
    model::{GroupId, Instance, Kind, Obligation, UserId, WalletId},
    money::DateRange,
    reconcile,
    store::{InstanceStore, ObligationStore, Scope},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parameters shared by every analytics query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsParams {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Falls back to `Config::granularity` when unset
    #[serde(default)]
    pub granularity: Option<Granularity>,
    #[serde(default)]
    pub wallet_id: Option<WalletId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub kind: Option<Kind>,
}

impl AnalyticsParams {
    pub fn new(from: NaiveDate, to: NaiveDate, granularity: Granularity) -> Self {
        AnalyticsParams {
            from,
            to,
            granularity: Some(granularity),
            wallet_id: None,
            user_id: None,
            group_id: None,
            kind: None,
        }
    }

    /// Check the params describe a usable scope: a valid range and at least one of
    /// wallet, user or group.
    pub fn validate(&self) -> Result<DateRange, Error> {
        let range = DateRange::new(self.from, self.to)?;
        if self.wallet_id.is_none() && self.user_id.is_none() && self.group_id.is_none() {
            return Err(ValidationError::MissingScope("wallet, user or group").into());
        }

        Ok(range)
    }

    /// The requested granularity, or the configured one
    pub fn granularity_or(&self, config: &Config) -> Granularity {
        self.granularity.unwrap_or(config.granularity)
    }

    pub fn scope(&self) -> Scope {
        Scope {
            wallet_id: self.wallet_id.clone(),
            user_id: self.user_id.clone(),
            group_id: self.group_id.clone(),
        }
    }

    pub fn criteria(&self) -> FilterCriteria {
        let mut criteria = FilterCriteria::default();
        criteria
            .with_kind(self.kind)
            .with_range(Some(self.from), Some(self.to));
        if let Some(ref wallet) = self.wallet_id {
            criteria.with_wallet(wallet.as_str());
        }
        if let Some(ref user) = self.user_id {
            criteria.with_user(user.as_str());
        }
        if let Some(ref group) = self.group_id {
            criteria.with_group(group.as_str());
        }
        criteria
    }
}

/// A source of aggregated statistics, local or remote.
///
/// Implementations normalise their failures into `Error` before returning.
#[async_trait]
pub trait AnalyticsQuery: Send + Sync {
    async fn get_summary(&self, params: &AnalyticsParams) -> Result<Summary, Error>;
    async fn get_time_series(&self, params: &AnalyticsParams) -> Result<Vec<TimeBucket>, Error>;
    async fn get_categories(
        &self,
        params: &AnalyticsParams,
        kind: Kind,
    ) -> Result<Vec<CategoryAmount>, Error>;
    async fn get_status_split(
        &self,
        params: &AnalyticsParams,
        kind: Kind,
        granularity: Granularity,
    ) -> Result<Vec<StatusBucket>, Error>;
}

/// Computes analytics locally from the obligation and instance stores
pub struct LocalAnalytics<S> {
    store: Arc<S>,
    config: Config,
}

impl<S> LocalAnalytics<S>
where
    S: ObligationStore + InstanceStore,
{
    pub fn new(store: Arc<S>, config: Config) -> Self {
        LocalAnalytics { store, config }
    }

    // Load a snapshot of everything in scope
    async fn load(
        &self,
        params: &AnalyticsParams,
    ) -> Result<(AggregationEngine, Vec<Obligation>, Vec<Instance>), Error> {
        let range = params.validate()?;
        let obligations = self.store.list(&params.scope()).await?;

        let mut instances = Vec::new();
        for obligation in obligations.iter() {
            instances.extend(self.store.list_by_obligation(obligation.id).await?);
        }

        debug!(
            "loaded {} obligations and {} instances for {:?}",
            obligations.len(),
            instances.len(),
            params.scope()
        );

        Ok((
            AggregationEngine::new(range, &self.config),
            obligations,
            instances,
        ))
    }
}

// Join and filter a snapshot into the views the engine aggregates
fn views<'a>(
    obligations: &'a [Obligation],
    instances: &'a [Instance],
    params: &AnalyticsParams,
    config: &Config,
) -> Vec<reconcile::InstanceView<'a>> {
    let joined = reconcile::join(obligations, instances);
    filter::filter(&joined, &params.criteria(), &DisplayNames::for_config(config))
}

#[async_trait]
impl<S> AnalyticsQuery for LocalAnalytics<S>
where
    S: ObligationStore + InstanceStore,
{
    async fn get_summary(&self, params: &AnalyticsParams) -> Result<Summary, Error> {
        let (engine, obligations, instances) = self.load(params).await?;
        Ok(engine.summary(&views(&obligations, &instances, params, &self.config))?)
    }

    async fn get_time_series(&self, params: &AnalyticsParams) -> Result<Vec<TimeBucket>, Error> {
        let (engine, obligations, instances) = self.load(params).await?;
        Ok(engine.time_series(
            &views(&obligations, &instances, params, &self.config),
            params.granularity_or(&self.config),
        ))
    }

    async fn get_categories(
        &self,
        params: &AnalyticsParams,
        kind: Kind,
    ) -> Result<Vec<CategoryAmount>, Error> {
        let (engine, obligations, instances) = self.load(params).await?;
        let views = views(&obligations, &instances, params, &self.config);
        Ok(engine.category_breakdown(&views, kind))
    }

    async fn get_status_split(
        &self,
        params: &AnalyticsParams,
        kind: Kind,
        granularity: Granularity,
    ) -> Result<Vec<StatusBucket>, Error> {
        let (engine, obligations, instances) = self.load(params).await?;
        let views = views(&obligations, &instances, params, &self.config);
        Ok(engine.status_split(&views, kind, granularity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::tests::{date, obligation};
    use crate::money::{CurrencyError, Money};
    use crate::store::MemoryStore;

    async fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());

        let mut food = obligation(0, Kind::Expense, 100);
        food.category = "Food".into();
        let food = store.create(food).await.unwrap();
        let salary = store.create(obligation(0, Kind::Earning, 500)).await.unwrap();
        let mut other = obligation(0, Kind::Expense, 999);
        other.wallet_id = "savings".into();
        let other = store.create(other).await.unwrap();

        for (o, d, cents) in vec![
            (food.id, date(2021, 1, 5), 4000),
            (food.id, date(2021, 3, 20), 6000),
            (salary.id, date(2021, 1, 31), 50000),
            (other.id, date(2021, 1, 10), 99900),
        ] {
            store
                .insert_instance(Instance::new(0, o, d, Money::from_cents(cents)))
                .await
                .unwrap();
        }

        store
    }

    fn params() -> AnalyticsParams {
        let mut params = AnalyticsParams::new(date(2021, 1, 1), date(2021, 3, 31), Granularity::Month);
        params.wallet_id = Some("main".into());
        params
    }

    #[tokio::test]
    async fn summary_is_scoped() {
        let analytics = LocalAnalytics::new(store().await, Config::default());
        let summary = analytics.get_summary(&params()).await.unwrap();
        assert_eq!(summary.total_expense, Money::from_cents(10000));
        assert_eq!(summary.total_income, Money::from_cents(50000));
    }

    #[tokio::test]
    async fn kind_param_filters() {
        let analytics = LocalAnalytics::new(store().await, Config::default());
        let mut params = params();
        params.kind = Some(Kind::Expense);
        let summary = analytics.get_summary(&params).await.unwrap();
        assert_eq!(summary.total_income, Money::ZERO);
    }

    #[tokio::test]
    async fn series_and_categories() {
        let analytics = LocalAnalytics::new(store().await, Config::default());
        let series = analytics.get_time_series(&params()).await.unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series[1].expense, Money::ZERO);

        let categories = analytics
            .get_categories(&params(), Kind::Expense)
            .await
            .unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].amount, Money::from_cents(10000));

        let split = analytics
            .get_status_split(&params(), Kind::Expense, Granularity::Month)
            .await
            .unwrap();
        assert_eq!(split[2].pending, Money::from_cents(6000));
    }

    #[tokio::test]
    async fn missing_scope_is_validation() {
        let analytics = LocalAnalytics::new(store().await, Config::default());
        let params = AnalyticsParams::new(date(2021, 1, 1), date(2021, 3, 31), Granularity::Day);
        assert_eq!(
            analytics.get_summary(&params).await.err(),
            Some(Error::Validation(ValidationError::MissingScope(
                "wallet, user or group"
            )))
        );
    }

    #[tokio::test]
    async fn inverted_range_is_validation() {
        let analytics = LocalAnalytics::new(store().await, Config::default());
        let mut params = params();
        params.to = date(2020, 1, 1);
        assert_eq!(
            analytics.get_time_series(&params).await.err(),
            Some(Error::Validation(ValidationError::Currency(
                CurrencyError::InvertedRange(date(2021, 1, 1), date(2020, 1, 1))
            )))
        );
    }

    #[tokio::test]
    async fn unavailable_store_is_transient() {
        let store = store().await;
        store.set_unavailable(true);
        let analytics = LocalAnalytics::new(store, Config::default());
        let err = analytics.get_summary(&params()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn unset_granularity_uses_config() {
        let mut config = Config::default();
        config.granularity = Granularity::Week;
        let analytics = LocalAnalytics::new(store().await, config);

        let mut params = params();
        params.granularity = None;
        params.to = date(2021, 1, 17);
        let series = analytics.get_time_series(&params).await.unwrap();
        assert_eq!(
            series.iter().map(|b| b.label.as_str()).collect::<Vec<_>>(),
            vec!["2020-W53", "2021-W01", "2021-W02"]
        );
    }

    #[test]
    fn params_json() {
        let params: AnalyticsParams = serde_json::from_str(
            r#"{"from":"2021-01-01","to":"2021-03-31","granularity":"week","groupId":"flat"}"#,
        )
        .unwrap();
        assert_eq!(params.granularity, Some(Granularity::Week));
        assert_eq!(params.group_id.as_deref(), Some("flat"));
        assert_eq!(params.kind, None);
    }
}
