//! Shared low-latency building blocks used by the exchange crate.
//!
//! This crate carries no exchange-specific types. It is the ambient
//! stack (logging, timing, lock-free queues, networking) that a
//! low-latency service reaches for regardless of what it's serving.

pub mod hash;
pub mod lf_queue;
pub mod logging;
pub mod net;
pub mod time;
pub mod types;

pub use types::Side;
