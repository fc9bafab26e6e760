//! Observability subsystem for litedoc
//!
//! Structured JSON logging over a typed event catalogue.
//!
//! # Principles
//!
//! 1. Observability is read-only: logging never alters results
//! 2. No async or background threads
//! 3. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use litedoc::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::CollectionReady, &[("collection", "users")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log an event at its catalogue severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log an event with fields at its catalogue severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
