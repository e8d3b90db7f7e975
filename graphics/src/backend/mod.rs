//! Device backends.
//!
//! # Available Backends
//!
//! - `dummy`: records submissions, flushes, and peer copies without executing
//!   anything. Used by tests, benchmarks, and the demo.
//!
//! Real backends implement [`DeviceQueue`](crate::device::DeviceQueue) on
//! top of their graphics API and are plugged in by the application.

pub mod dummy;

pub use dummy::{CopyRecord, DummyDevice};
