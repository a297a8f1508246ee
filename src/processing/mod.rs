//! Turning raw game rows into verified shot sets

pub mod pipeline;
pub mod writer;

pub use pipeline::{boxscore_goals, GameOutcome, PassReport, Pipeline};
pub use writer::{ProcessedWriter, SHOTS_TABLE};
