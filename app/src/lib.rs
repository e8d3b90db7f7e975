//! # Tandem App
//!
//! Demo driver for the Tandem scheduler: renders a deferred-style frame on
//! dummy devices, either as one graph on one device or split across a
//! producer and a consumer device.
//!
//! ## Overview
//!
//! - [`AppArgs`] - Trait for parsing command line arguments
//! - [`App`] - Builds the graphs for the chosen pipeline and renders frames
//!
//! ## Example
//!
//! ```ignore
//! use tandem_app::{App, AppArgs, DefaultAppArgs};
//!
//! fn main() {
//!     let args = DefaultAppArgs::parse();
//!     App::run(args).unwrap();
//! }
//! ```

mod app;
mod args;
pub mod scene;

pub use app::{App, RunSummary};
pub use args::{AppArgs, CliMode, CliPipeline, DefaultAppArgs, PipelineKind};

/// App library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
