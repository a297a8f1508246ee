pub mod event;
pub mod game;
pub mod rates;
pub mod shot;
pub mod state;

pub use event::*;
pub use game::*;
pub use rates::*;
pub use shot::*;
pub use state::*;
