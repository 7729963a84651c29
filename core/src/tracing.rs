//! Tracing utilities for query execution and stream observability.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site. Crates that invoke them must declare their own
//! `tracing` feature, since `cfg` is evaluated at the call site.

/// Emit a debug-level tracing event with the SQL text and parameter count.
///
/// ```ignore
/// hedge_trace_query!(&statement.sql, statement.params.len());
/// ```
#[macro_export]
macro_rules! hedge_trace_query {
    ($sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %$sql, params = $param_count, "hedge.query");
    };
}

/// Emit a trace-level event for a stream session transition.
///
/// ```ignore
/// hedge_trace_stream!("ready", database = %name);
/// ```
#[macro_export]
macro_rules! hedge_trace_stream {
    ($event:literal) => {
        #[cfg(feature = "tracing")]
        tracing::trace!(event = $event, "hedge.stream");
    };
    ($event:literal, $($field:tt)+) => {
        #[cfg(feature = "tracing")]
        tracing::trace!(event = $event, $($field)+, "hedge.stream");
    };
}

/// Emit a debug-level event for replica race and fan-out outcomes.
///
/// ```ignore
/// hedge_trace_race!("winner", replica = idx);
/// ```
#[macro_export]
macro_rules! hedge_trace_race {
    ($event:literal, $($field:tt)+) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(event = $event, $($field)+, "hedge.race");
    };
}

/// Emit a warn-level event for a failure that is swallowed rather than returned.
/// Without the feature the error is still borrowed, so call sites need no
/// discard of their own.
#[macro_export]
macro_rules! hedge_trace_warn {
    ($error:expr, $($field:tt)+) => {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %$error, $($field)+, "hedge.swallowed");
        #[cfg(not(feature = "tracing"))]
        let _ = &$error;
    };
}
