//! Play-by-play parsing and shot feature extraction

pub mod extractor;
pub mod geometry;
pub mod parse;
pub mod setup;
pub mod situation;

pub use extractor::{EventAnomaly, EventExtractor, ExtractionOutput, ExtractionStats, ExtractorSettings};
pub use geometry::{angle_to_net, distance_to_net, DirectionResolver, NET_X};
pub use parse::{parse_clock, parse_game, parse_plays, ParsedGame, TeamContext};
pub use setup::{classify_zone, immediacy, setup_quality};
pub use situation::{Manpower, SituationCode};
