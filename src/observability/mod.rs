//! Observability for storescope
//!
//! Structured JSON logging of lifecycle events, plus scopes that bracket
//! checkpoints and log scans. Observability is read-only: nothing here
//! changes what an operation does or returns.
//!
//! ```ignore
//! use storescope::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::TableCreated, &[("ident", "collection-7")]);
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::ObservationScope;

fn severity_for(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_warning() {
        Severity::Warn
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(severity_for(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_for(event), event.as_str(), fields);
}
