use std::cell::{Cell, RefCell};
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};

use tracing::warn;

use crate::adapt::history::AdaptationAttempt;
use crate::trace::trace::TraceEvent;

/// Appends one JSON line per adaptation attempt. A sink that failed to open
/// drops events; write failures are logged, never raised.
pub struct TraceLogger {
    path: String,
    sink: Option<RefCell<LineWriter<File>>>,
    written: Cell<usize>,
}

impl TraceLogger {
    pub fn new(path: &str) -> Self {
        let sink = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(RefCell::new(LineWriter::new(file))),
            Err(e) => {
                warn!(path, error = %e, "could not open trace file, adaptation trace disabled");
                None
            }
        };

        Self {
            path: path.to_string(),
            sink,
            written: Cell::new(0),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Events successfully appended since this logger was opened.
    pub fn written(&self) -> usize {
        self.written.get()
    }

    pub fn log_attempt(&self, page_url: &str, attempt: &AdaptationAttempt, score: Option<f64>) {
        let event = TraceEvent::from_attempt(page_url, attempt);
        self.log(&match score {
            Some(score) => event.with_score(score),
            None => event,
        });
    }

    pub fn log(&self, event: &TraceEvent) {
        let Some(sink) = &self.sink else {
            return;
        };

        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize trace event");
                return;
            }
        };

        match writeln!(sink.borrow_mut(), "{}", line) {
            Ok(()) => self.written.set(self.written.get() + 1),
            Err(e) => warn!(path = %self.path, error = %e, "failed to write trace event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unopenable_path_disables_logging() {
        let logger = TraceLogger::new("/nonexistent/dir/trace.jsonl");
        assert!(!logger.is_enabled());
        logger.log_attempt("https://a.test", &AdaptationAttempt::failed(1, "#x"), None);
        assert_eq!(logger.written(), 0);
    }

    #[test]
    fn attempts_append_with_score() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        let logger = TraceLogger::new(path.to_str().unwrap());

        logger.log_attempt("https://a.test", &AdaptationAttempt::failed(1, "#x"), None);
        logger.log_attempt("https://a.test", &AdaptationAttempt::failed(2, "#y"), Some(0.5));
        assert_eq!(logger.written(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let last: serde_json::Value = serde_json::from_str(content.lines().last().unwrap()).unwrap();
        assert_eq!(last["original_selector"], "#y");
        assert_eq!(last["score"], 0.5);
    }
}
