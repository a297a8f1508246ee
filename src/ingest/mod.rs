//! Getting raw games in: live polling, backfill, and the raw writer

pub mod backfill;
pub mod raw_store;
pub mod scheduler;

pub use backfill::{Backfill, BackfillReport, BackfillRequest};
pub use raw_store::{RawGameWriter, WriteOutcome, GAMES_TABLE};
pub use scheduler::{CycleReport, FetchDecision, GameTracker, Scheduler, TrackState};
