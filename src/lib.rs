pub mod adapters;
pub mod aggregate;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod features;
pub mod ingest;
pub mod processing;
pub mod scoring;
pub mod summary;

pub use adapters::{GameFeed, MemoryStore, NhlApiClient, PostgresStore, TableStore};
pub use aggregate::{AggregationJob, AggregationReport};
pub use config::AppConfig;
pub use coordination::{Shutdown, ShutdownSignal};
pub use error::{FetchError, Result, RinkError};
pub use features::{EventExtractor, ExtractorSettings};
pub use ingest::{Backfill, BackfillRequest, RawGameWriter, Scheduler};
pub use processing::{GameOutcome, Pipeline, ProcessedWriter};
pub use scoring::ShotScorer;
pub use summary::RunSummary;
