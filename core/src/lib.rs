//! # Tandem Core
//!
//! Core crate for the Tandem frame scheduler: profiling instrumentation shared
//! by the graph, scheduler, and pipeline layers.

pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logs the core version and, with the `profiling` feature, starts the Tracy
/// client so zones have somewhere to go.
pub fn init() {
    #[cfg(feature = "profiling")]
    let _ = profiling::tracy_client::Client::start();
    log::info!(
        "Tandem Core v{} initialized (profiling: {})",
        VERSION,
        profiling::enabled()
    );
}
