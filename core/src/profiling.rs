//! Tracy instrumentation for the scheduler.
//!
//! Recording a task node, draining the reconciler and running a producer cycle
//! each open a [`Zone`]; the coordinator marks the end of every presented
//! frame. Build with the `profiling` feature and attach the Tracy UI:
//!
//! ```bash
//! cargo run -p tandem-app --features profiling
//! ```
//!
//! Without the feature a [`Zone`] is zero-sized and the macros expand to
//! nothing that reaches Tracy.

#[cfg(feature = "profiling")]
#[doc(hidden)]
pub use tracy_client;

/// An open profiling zone, closed on drop.
#[must_use = "the zone closes as soon as it is dropped"]
pub struct Zone {
    #[cfg(feature = "profiling")]
    _span: Option<tracy_client::Span>,
}

impl Zone {
    /// Open a zone called `name` at `file:line`.
    ///
    /// Names may be built at runtime, so task nodes are profiled under their
    /// own names.
    #[inline]
    pub fn enter(name: &str, file: &str, line: u32) -> Self {
        #[cfg(feature = "profiling")]
        {
            Self {
                _span: tracy_client::Client::running()
                    .map(|client| client.span_alloc(Some(name), "", file, line, 0)),
            }
        }
        #[cfg(not(feature = "profiling"))]
        {
            let _ = (name, file, line);
            Self {}
        }
    }
}

/// Whether zones reach a Tracy client.
pub const fn enabled() -> bool {
    cfg!(feature = "profiling")
}

/// Mark the end of a presented frame.
#[inline]
pub fn frame_boundary() {
    #[cfg(feature = "profiling")]
    tracy_client::frame_mark();
}

/// Open a zone for the rest of the enclosing block.
///
/// ```ignore
/// fn drain(&mut self) {
///     tandem_core::profile_scope!("reconciler: drain");
///     // ...
/// }
/// ```
#[macro_export]
macro_rules! profile_scope {
    ($name:expr) => {
        let _zone = $crate::profiling::Zone::enter($name, file!(), line!());
    };
}

/// Open a zone named after the enclosing module.
#[macro_export]
macro_rules! profile_function {
    () => {
        let _zone = $crate::profiling::Zone::enter(module_path!(), file!(), line!());
    };
}

/// End-of-frame mark.
#[macro_export]
macro_rules! frame_mark {
    () => {
        $crate::profiling::frame_boundary()
    };
}

// Tracy wants string literals for plot, frame and thread names, so these three
// forward to its own macros.

/// Plot `value` under the literal `name`.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:literal, $value:expr) => {
        $crate::profiling::tracy_client::plot!($name, $value as f64)
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:literal, $value:expr) => {
        let _ = $value;
    };
}

/// Secondary frame mark, one per finished producer cycle.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_frame_mark_named {
    ($name:literal) => {
        $crate::profiling::tracy_client::secondary_frame_mark!($name)
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_frame_mark_named {
    ($name:literal) => {};
}

/// Name the current thread in Tracy.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! set_thread_name {
    ($name:literal) => {
        $crate::profiling::tracy_client::set_thread_name!($name)
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! set_thread_name {
    ($name:literal) => {};
}
