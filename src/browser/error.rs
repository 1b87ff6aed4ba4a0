use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    /// The page's navigation context is gone (page closed or navigated away)
    #[error("Page context destroyed: {0}")]
    ContextDestroyed(String),

    /// Selector could not be parsed or evaluated
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// A previously resolved element no longer exists
    #[error("Element '{selector}' is detached from the DOM")]
    Detached { selector: String },

    /// Browser server subprocess failed to spawn
    #[error("Failed to spawn {script} (is Node.js installed?): {source}")]
    SubprocessSpawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to the browser server failed
    #[error("Browser session I/O: {0}")]
    SessionIO(String),

    /// Browser server answered with ok=false or an unexpected payload
    #[error("Browser command '{command}' failed: {error}")]
    SessionProtocol { command: String, error: String },

    #[error("JSON parse error ({context}): {source}")]
    JsonParse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON serialize error ({context}): {source}")]
    JsonSerialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PageError {
    /// Fatal errors mean the page itself is unusable and abort the current
    /// detection pass. Everything else concerns a single selector or element.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PageError::ContextDestroyed(_)
                | PageError::SubprocessSpawn { .. }
                | PageError::SessionIO(_)
                | PageError::SessionProtocol { .. }
        )
    }
}
