pub mod fetch;
pub mod memory_store;
pub mod nhl_api;
pub mod postgres;
pub mod store;

pub use fetch::{classify_status, CooldownGate, FetchClient, RetryPolicy, StatusClass};
pub use memory_store::MemoryStore;
pub use nhl_api::{header_from_play_by_play, parse_schedule, GameFeed, NhlApiClient, ScheduledGame};
pub use postgres::PostgresStore;
pub use store::{from_row, select_all, to_row, Filter, OrderBy, Query, Row, TableStore};
