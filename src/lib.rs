// src/lib.rs
//
// Study-desk monitor: recognizes who is at the desk, watches the posture of
// monitored people, and raises debounced alerts when bad posture persists.

pub mod capture_limiter;
pub mod config;
pub mod grace_window;
pub mod pipeline;
pub mod posture;
pub mod recognition;
pub mod smoother;
pub mod types;

pub use types::Config;
