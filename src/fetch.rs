use crate::{
    aggregate::{CategoryAmount, StatusBucket, Summary, TimeBucket},
    analytics::{AnalyticsParams, AnalyticsQuery},
    config::Config,
    error::{Error, ErrorKind},
    granularity::Granularity,
    model::Kind,
};
use log::{debug, warn};
use serde::Serialize;
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::{watch, Mutex};

/// Why a single section of a combined result is missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason")]
pub enum SectionError {
    TimedOut,
    Failed { kind: ErrorKind, message: String },
}

/// One section of a combined result: either its data or a degraded marker
pub type Section<T> = Result<T, SectionError>;

/// Every aggregate view for one request generation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResult {
    pub generation: u64,
    pub summary: Section<Summary>,
    pub time_series: Section<Vec<TimeBucket>>,
    pub income_categories: Section<Vec<CategoryAmount>>,
    pub expense_categories: Section<Vec<CategoryAmount>>,
    pub income_status: Section<Vec<StatusBucket>>,
    pub expense_status: Section<Vec<StatusBucket>>,
}

#[derive(Error, Debug, PartialEq)]
pub enum FetchError {
    #[error("request generation {0} was superseded by a newer request")]
    Superseded(u64),
    #[error("invalid request")]
    Invalid(#[from] Error),
}

impl CombinedResult {
    /// Names of the sections that failed, in display order
    pub fn degraded_sections(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if self.summary.is_err() {
            failed.push("summary");
        }
        if self.time_series.is_err() {
            failed.push("timeSeries");
        }
        if self.income_categories.is_err() {
            failed.push("incomeCategories");
        }
        if self.expense_categories.is_err() {
            failed.push("expenseCategories");
        }
        if self.income_status.is_err() {
            failed.push("incomeStatus");
        }
        if self.expense_status.is_err() {
            failed.push("expenseStatus");
        }
        failed
    }

    pub fn is_complete(&self) -> bool {
        self.degraded_sections().is_empty()
    }

    /// `Error::Partial` naming the failed sections, if any failed
    pub fn check(&self) -> Result<(), Error> {
        match self.degraded_sections() {
            failed if failed.is_empty() => Ok(()),
            failed => Err(Error::Partial(failed)),
        }
    }
}

/// Runs every aggregate query for a scope in parallel and joins the results.
///
/// Each call to `run` starts a new generation. A run whose generation is no longer the
/// latest is abandoned: its outstanding queries are dropped and it never publishes.
pub struct FetchOrchestrator<Q> {
    query: Arc<Q>,
    timeout: Duration,
    granularity: Granularity,
    generation: watch::Sender<u64>,
    published: Mutex<Option<CombinedResult>>,
}

// Resolves once the latest generation differs from `generation`
async fn superseded(mut rx: watch::Receiver<u64>, generation: u64) {
    loop {
        if *rx.borrow_and_update() != generation {
            return;
        }
        if rx.changed().await.is_err() {
            // The orchestrator is gone, so nothing can supersede this run
            std::future::pending::<()>().await;
        }
    }
}

impl<Q: AnalyticsQuery> FetchOrchestrator<Q> {
    pub fn new(query: Arc<Q>, config: &Config) -> Self {
        let (generation, _) = watch::channel(0);
        FetchOrchestrator {
            query,
            timeout: config.query_timeout(),
            granularity: config.granularity,
            generation,
            published: Mutex::new(None),
        }
    }

    /// The most recent generation handed out
    pub fn current_generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// The last combined result that was published
    pub async fn latest(&self) -> Option<CombinedResult> {
        self.published.lock().await.clone()
    }

    /// Fetch every section for `params`.
    ///
    /// Returns `FetchError::Superseded` when another run started before this one finished.
    /// Failing sections don't fail the run; they are marked in the returned result.
    pub async fn run(&self, params: &AnalyticsParams) -> Result<CombinedResult, FetchError> {
        params.validate()?;

        // Every section buckets by the same granularity
        let granularity = params.granularity.unwrap_or(self.granularity);
        let mut resolved = params.clone();
        resolved.granularity = Some(granularity);
        let params = &resolved;

        let mut generation = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            generation = *g;
        });
        let rx = self.generation.subscribe();

        debug!("starting fetch generation {} for {:?}", generation, params);

        let q = &self.query;
        let sections = async {
            let (
                summary,
                time_series,
                income_categories,
                expense_categories,
                income_status,
                expense_status,
            ) = tokio::join!(
                self.section("summary", q.get_summary(params)),
                self.section("timeSeries", q.get_time_series(params)),
                self.section("incomeCategories", q.get_categories(params, Kind::Earning)),
                self.section("expenseCategories", q.get_categories(params, Kind::Expense)),
                self.section(
                    "incomeStatus",
                    q.get_status_split(params, Kind::Earning, granularity)
                ),
                self.section(
                    "expenseStatus",
                    q.get_status_split(params, Kind::Expense, granularity)
                ),
            );

            CombinedResult {
                generation,
                summary,
                time_series,
                income_categories,
                expense_categories,
                income_status,
                expense_status,
            }
        };

        let combined = tokio::select! {
            combined = sections => combined,
            _ = superseded(rx, generation) => {
                debug!("fetch generation {} superseded in flight", generation);
                return Err(FetchError::Superseded(generation));
            }
        };

        // Publish under the lock so a finished older generation can't land after a newer one
        let mut published = self.published.lock().await;
        if self.current_generation() != generation {
            debug!("fetch generation {} finished stale - discarding", generation);
            return Err(FetchError::Superseded(generation));
        }

        let degraded = combined.degraded_sections();
        if !degraded.is_empty() {
            warn!(
                "fetch generation {} is partial, degraded sections: {:?}",
                generation, degraded
            );
        }

        *published = Some(combined.clone());

        Ok(combined)
    }

    async fn section<T, F>(&self, name: &'static str, query: F) -> Section<T>
    where
        F: Future<Output = Result<T, Error>>,
    {
        match tokio::time::timeout(self.timeout, query).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(e)) => {
                warn!("section {} failed: {}", name, e);
                Err(SectionError::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                warn!("section {} timed out after {:?}", name, self.timeout);
                Err(SectionError::TimedOut)
            }
        }
    }
}
