//! Process coordination shared by the long-running loops

pub mod shutdown;

pub use shutdown::{listen_for_signals, shutdown_signal, Shutdown, ShutdownSignal};
