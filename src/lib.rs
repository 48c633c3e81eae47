//! Records how long a user dwells on each website domain.
//!
//! Page observers measure dwell time and emit events, a single collector inside the daemon keeps
//! the log and pushes new entries to live viewers, and the terminal viewer renders, exports and
//! resets it.

pub mod cli;
pub mod client;
pub mod daemon;
pub mod observer;
pub mod protocol;
pub mod utils;
pub mod viewer;
