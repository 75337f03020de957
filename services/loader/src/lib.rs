//! LCA disclosure loader.
//!
//! Maps yearly disclosure extracts with drifting column layouts onto one
//! dimensional model (employers, occupations, worksite locations,
//! applications) and loads it idempotently, one fiscal year at a time.

pub mod batch;
pub mod columns;
pub mod config;
pub mod dimensions;
pub mod error;
pub mod filter;
pub mod models;
pub mod naics;
pub mod normalize;
pub mod orchestrator;
pub mod record;
pub mod sites;
pub mod source;
pub mod store;

pub use config::LoaderConfig;
pub use error::{LoadError, StoreError};
pub use orchestrator::{Loader, RunSummary, YearOutcome, YearSelection, YearState};
pub use store::{MemoryStore, PgStore, Store};
