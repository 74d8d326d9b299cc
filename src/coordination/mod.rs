//! Coordination primitives shared by the guardian binary and the supervisor

pub mod shutdown;

pub use shutdown::{listen_for_signals, shutdown_channel, ShutdownHandle, ShutdownSignal, ShutdownToken};
