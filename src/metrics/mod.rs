//! Metrics and observability infrastructure for playlake.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `export`: Prometheus recorder and end-of-run textfile export

pub mod events;
pub mod export;

pub use export::MetricsExporter;

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding metric.
///
/// # Example
///
/// ```ignore
/// use playlake::metrics::events::RowsWritten;
///
/// emit!(RowsWritten { table: "songs", count: 100 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
