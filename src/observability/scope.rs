//! ObservationScope brackets a long-running operation
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` with `duration_ms` on `complete()`
//! - Logs `{name}_FAILED` on `fail()`
//! - Logs `{name}_INCOMPLETE` if dropped without either

use std::time::Instant;

use super::logger::{Logger, Severity};

/// Logs begin/complete events around an operation
///
/// ```ignore
/// let scope = ObservationScope::new("CHECKPOINT");
/// // ... flush tables ...
/// scope.complete_with_fields(&[("tables_written", "3")]);
/// ```
pub struct ObservationScope {
    name: &'static str,
    started: Instant,
    fields: Vec<(&'static str, String)>,
    finished: bool,
}

impl ObservationScope {
    pub fn new(name: &'static str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Create a scope whose fields are repeated on every event it logs
    pub fn with_fields(name: &'static str, fields: &[(&'static str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);
        Self {
            name,
            started: Instant::now(),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            finished: false,
        }
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.finish(Severity::Info, "COMPLETE", extra);
    }

    /// Logs `{name}_FAILED` at ERROR level
    pub fn fail(mut self, reason: &str) {
        self.finish(Severity::Error, "FAILED", &[("reason", reason)]);
    }

    /// Logs `{name}_FAILED` at FATAL level
    pub fn fail_fatal(mut self, reason: &str) {
        self.finish(Severity::Fatal, "FAILED", &[("reason", reason)]);
    }

    fn finish(&mut self, severity: Severity, suffix: &str, extra: &[(&str, &str)]) {
        self.finished = true;
        let duration = self.started.elapsed().as_millis().to_string();
        let mut fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.push(("duration_ms", &duration));
        fields.extend(extra.iter().copied());
        Logger::log(severity, &format!("{}_{}", self.name, suffix), &fields);
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}
