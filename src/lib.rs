pub mod aggregate;
pub mod analytics;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod granularity;
pub mod ledger;
pub mod model;
pub mod money;
pub mod reconcile;
pub mod role;
pub mod store;

pub use aggregate::AggregationEngine;
pub use config::Config;
pub use error::{Error, ErrorKind};
pub use fetch::{CombinedResult, FetchOrchestrator};
pub use granularity::Granularity;
pub use ledger::Ledger;
pub use model::{Instance, Kind, Obligation};
pub use money::{DateRange, Money, Percentage};

// This represents the number of decimal places that a currency can validly express.
// @todo Support the full range of currency precisions specified in ISO 4217.
const CURRENCY_PRECISION: u32 = 2;
