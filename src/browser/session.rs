use std::process::Stdio;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::browser::error::PageError;
use crate::browser::page::{DomNode, ElementHandle, HandleInfo, Page};
use crate::element::element_model::BoundingBox;

pub const DEFAULT_SERVER_SCRIPT: &str = "node/browser_server.js";

/// Request sent to the browser server over stdin (one JSON line).
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BrowserRequest {
    Navigate {
        cmd: &'static str,
        url: String,
    },
    Snapshot {
        cmd: &'static str,
    },
    CurrentUrl {
        cmd: &'static str,
    },
    QueryCount {
        cmd: &'static str,
        selector: String,
    },
    /// Probe addressed at the `nth` match of `selector`.
    Element {
        cmd: &'static str,
        selector: String,
        nth: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Quit {
        cmd: &'static str,
    },
}

impl BrowserRequest {
    pub fn navigate(url: &str) -> Self {
        BrowserRequest::Navigate {
            cmd: "navigate",
            url: url.to_string(),
        }
    }

    pub fn snapshot() -> Self {
        BrowserRequest::Snapshot { cmd: "snapshot" }
    }

    pub fn current_url() -> Self {
        BrowserRequest::CurrentUrl { cmd: "current_url" }
    }

    pub fn query_count(selector: &str) -> Self {
        BrowserRequest::QueryCount {
            cmd: "query_count",
            selector: selector.to_string(),
        }
    }

    /// One of `query_visible`, `query_enabled`, `query_text`, `query_box`, `describe`.
    pub fn element(cmd: &'static str, selector: &str, nth: usize) -> Self {
        BrowserRequest::Element {
            cmd,
            selector: selector.to_string(),
            nth,
            name: None,
        }
    }

    pub fn query_attribute(selector: &str, nth: usize, name: &str) -> Self {
        BrowserRequest::Element {
            cmd: "query_attribute",
            selector: selector.to_string(),
            nth,
            name: Some(name.to_string()),
        }
    }

    pub fn quit() -> Self {
        BrowserRequest::Quit { cmd: "quit" }
    }
}

/// Response received from the browser server over stdout (one JSON line).
#[derive(Debug, Deserialize)]
pub struct BrowserResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ready: Option<bool>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, rename = "box")]
    pub bounding_box: Option<BoundingBox>,
}

/// Map a server-side failure onto the page error taxonomy.
fn protocol_error(command: &str, error: String) -> PageError {
    let lower = error.to_lowercase();
    if lower.contains("execution context was destroyed")
        || lower.contains("target closed")
        || lower.contains("has been closed")
    {
        PageError::ContextDestroyed(error)
    } else {
        PageError::SessionProtocol {
            command: command.into(),
            error,
        }
    }
}

/// Re-attribute a failed selector-scoped command to the selector. Apart from
/// a lost context, whatever the server rejects here concerns this selector
/// only: a missing node is `Detached`, anything else is `InvalidSelector`.
fn selector_error(selector: &str, e: PageError) -> PageError {
    match e {
        PageError::SessionProtocol { error, .. } if error.contains("no element") => {
            PageError::Detached {
                selector: selector.to_string(),
            }
        }
        PageError::SessionProtocol { error, .. } => PageError::InvalidSelector {
            selector: selector.to_string(),
            reason: error,
        },
        other => other,
    }
}

/// A persistent browser session backed by a Node.js Playwright server.
///
/// The server keeps one Chromium page open. Commands are sent as NDJSON over
/// stdin and answered one line at a time on stdout.
pub struct BrowserSession {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    current_url: Option<String>,
}

impl BrowserSession {
    /// Spawn the server script and wait for its ready signal.
    pub async fn launch(script: &str) -> Result<Self, PageError> {
        let mut child = Command::new("node")
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PageError::SubprocessSpawn {
                script: script.into(),
                source: e,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            PageError::SessionIO(format!("Failed to capture stdin of {}", script))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            PageError::SessionIO(format!("Failed to capture stdout of {}", script))
        })?;

        let mut reader = BufReader::new(stdout);

        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| PageError::SessionIO(format!("Failed to read ready signal: {}", e)))?;

        let response: BrowserResponse =
            serde_json::from_str(line.trim()).map_err(|e| PageError::JsonParse {
                context: "browser server ready signal".into(),
                source: e,
            })?;

        if !response.ok || response.ready != Some(true) {
            return Err(PageError::SessionProtocol {
                command: "launch".into(),
                error: "Did not receive ready signal from browser server".into(),
            });
        }

        Ok(BrowserSession {
            child,
            stdin,
            reader,
            current_url: None,
        })
    }

    async fn send(&mut self, request: &BrowserRequest) -> Result<BrowserResponse, PageError> {
        let mut json = serde_json::to_string(request).map_err(|e| PageError::JsonSerialize {
            context: "BrowserRequest".into(),
            source: e,
        })?;
        json.push('\n');

        self.stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| PageError::SessionIO(format!("Failed to write to browser server: {}", e)))?;

        self.stdin
            .flush()
            .await
            .map_err(|e| PageError::SessionIO(format!("Failed to flush browser server stdin: {}", e)))?;

        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .await
            .map_err(|e| PageError::SessionIO(format!("Failed to read from browser server: {}", e)))?;

        if line.trim().is_empty() {
            return Err(PageError::SessionIO(
                "Empty response from browser server (process may have died)".into(),
            ));
        }

        serde_json::from_str(line.trim()).map_err(|e| PageError::JsonParse {
            context: "browser server response".into(),
            source: e,
        })
    }

    async fn send_ok(&mut self, request: &BrowserRequest, command: &str) -> Result<BrowserResponse, PageError> {
        let response = self.send(request).await?;
        if !response.ok {
            let error = response.error.unwrap_or_else(|| "Unknown error".into());
            return Err(protocol_error(command, error));
        }
        Ok(response)
    }

    pub async fn navigate(&mut self, url: &str) -> Result<(), PageError> {
        self.send_ok(&BrowserRequest::navigate(url), "navigate").await?;
        self.current_url = Some(url.to_string());
        Ok(())
    }

    pub async fn current_url(&mut self) -> Result<String, PageError> {
        let response = self
            .send_ok(&BrowserRequest::current_url(), "current_url")
            .await?;
        let url = response.url.ok_or_else(|| PageError::SessionProtocol {
            command: "current_url".into(),
            error: "No URL in current_url response".into(),
        })?;
        self.current_url = Some(url.clone());
        Ok(url)
    }

    /// Last known URL, without a browser round trip.
    pub fn last_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub async fn snapshot(&mut self) -> Result<Vec<DomNode>, PageError> {
        let response = self.send_ok(&BrowserRequest::snapshot(), "snapshot").await?;
        let data = response.data.ok_or_else(|| PageError::SessionProtocol {
            command: "snapshot".into(),
            error: "No data in snapshot response".into(),
        })?;
        serde_json::from_value(data).map_err(|e| PageError::JsonParse {
            context: "snapshot nodes".into(),
            source: e,
        })
    }

    pub async fn query_count(&mut self, selector: &str) -> Result<usize, PageError> {
        let response = self
            .send_ok(&BrowserRequest::query_count(selector), "query_count")
            .await
            .map_err(|e| selector_error(selector, e))?;
        Ok(response.count.unwrap_or(0))
    }

    async fn element(&mut self, cmd: &'static str, selector: &str, nth: usize) -> Result<BrowserResponse, PageError> {
        self.send_ok(&BrowserRequest::element(cmd, selector, nth), cmd)
            .await
            .map_err(|e| selector_error(selector, e))
    }

    pub async fn quit(&mut self) -> Result<(), PageError> {
        // Best-effort: the process may already be gone
        if let Err(e) = self.send(&BrowserRequest::quit()).await {
            debug!(error = %e, "browser server quit request failed");
        }
        if let Err(e) = self.child.wait().await {
            warn!(error = %e, "browser server did not exit cleanly");
        }
        Ok(())
    }
}

// ============================================================================
// Page adapter
// ============================================================================

/// `Page` implementation over a live `BrowserSession`.
pub struct SessionPage {
    session: Rc<Mutex<BrowserSession>>,
    url: String,
}

impl SessionPage {
    /// Launch the server, open `url`, and wrap the session.
    pub async fn open(script: &str, url: &str) -> Result<Self, PageError> {
        let mut session = BrowserSession::launch(script).await?;
        session.navigate(url).await?;
        let url = session.current_url().await?;
        Ok(Self {
            session: Rc::new(Mutex::new(session)),
            url,
        })
    }

    pub async fn close(&self) -> Result<(), PageError> {
        self.session.lock().await.quit().await
    }

    fn handle(&self, selector: &str, nth: usize) -> Box<dyn ElementHandle> {
        Box::new(SessionHandle {
            session: Rc::clone(&self.session),
            selector: selector.to_string(),
            nth,
        })
    }
}

#[async_trait(?Send)]
impl Page for SessionPage {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn query(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>, PageError> {
        let count = self.session.lock().await.query_count(selector).await?;
        Ok((count > 0).then(|| self.handle(selector, 0)))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError> {
        let count = self.session.lock().await.query_count(selector).await?;
        Ok((0..count).map(|nth| self.handle(selector, nth)).collect())
    }

    async fn dom_snapshot(&self) -> Result<Vec<DomNode>, PageError> {
        self.session.lock().await.snapshot().await
    }
}

struct SessionHandle {
    session: Rc<Mutex<BrowserSession>>,
    selector: String,
    nth: usize,
}

impl SessionHandle {
    async fn probe(&self, cmd: &'static str) -> Result<BrowserResponse, PageError> {
        self.session
            .lock()
            .await
            .element(cmd, &self.selector, self.nth)
            .await
    }
}

#[async_trait(?Send)]
impl ElementHandle for SessionHandle {
    async fn describe(&self) -> Result<HandleInfo, PageError> {
        let response = self.probe("describe").await?;
        let data = response.data.ok_or_else(|| PageError::SessionProtocol {
            command: "describe".into(),
            error: "No data in describe response".into(),
        })?;
        serde_json::from_value(data).map_err(|e| PageError::JsonParse {
            context: "describe payload".into(),
            source: e,
        })
    }

    async fn is_visible(&self) -> Result<bool, PageError> {
        Ok(self.probe("query_visible").await?.visible.unwrap_or(false))
    }

    async fn is_enabled(&self) -> Result<bool, PageError> {
        Ok(self.probe("query_enabled").await?.enabled.unwrap_or(true))
    }

    async fn bounding_box(&self) -> Result<Option<BoundingBox>, PageError> {
        Ok(self.probe("query_box").await?.bounding_box)
    }

    async fn text_content(&self) -> Result<Option<String>, PageError> {
        Ok(self.probe("query_text").await?.text)
    }

    async fn get_attribute(&self, name: &str) -> Result<Option<String>, PageError> {
        let request = BrowserRequest::query_attribute(&self.selector, self.nth, name);
        let response = self
            .session
            .lock()
            .await
            .send_ok(&request, "query_attribute")
            .await
            .map_err(|e| selector_error(&self.selector, e))?;
        Ok(response.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_request_serializes_cmd_selector_and_nth() {
        let json = serde_json::to_value(BrowserRequest::element("query_visible", "#go", 2)).unwrap();
        assert_eq!(json["cmd"], "query_visible");
        assert_eq!(json["selector"], "#go");
        assert_eq!(json["nth"], 2);
        assert!(json.get("name").is_none());

        let json = serde_json::to_value(BrowserRequest::query_attribute("#go", 0, "class")).unwrap();
        assert_eq!(json["cmd"], "query_attribute");
        assert_eq!(json["name"], "class");
    }

    #[test]
    fn response_parses_box_and_defaults() {
        let r: BrowserResponse = serde_json::from_str(
            r#"{"ok":true,"box":{"x":1.0,"y":2.0,"width":30.0,"height":10.0}}"#,
        )
        .unwrap();
        assert!(r.ok);
        assert_eq!(r.bounding_box.map(|b| b.width), Some(30.0));
        assert_eq!(r.count, None);
    }

    #[test]
    fn destroyed_context_messages_become_fatal() {
        let e = protocol_error(
            "query_visible",
            "Execution context was destroyed, most likely because of a navigation".into(),
        );
        assert!(e.is_fatal());
        assert!(matches!(e, PageError::ContextDestroyed(_)));

        let e = selector_error(
            "##",
            protocol_error("query_count", "'##' is not a valid selector".into()),
        );
        assert!(matches!(e, PageError::InvalidSelector { ref selector, .. } if selector == "##"));
        assert!(!e.is_fatal());
    }

    #[test]
    fn unrecognized_selector_rejections_stay_scoped_to_the_selector() {
        let e = selector_error(
            "foo=bar",
            protocol_error("query_count", "Unknown engine \"foo\" while parsing selector foo=bar".into()),
        );
        assert!(matches!(e, PageError::InvalidSelector { ref selector, .. } if selector == "foo=bar"));
        assert!(!e.is_fatal());

        let e = selector_error(
            "#gone",
            protocol_error("query_text", "no element at index 0 for #gone".into()),
        );
        assert!(matches!(e, PageError::Detached { .. }));

        let e = selector_error(
            "#x",
            protocol_error("query_visible", "Target page, context or browser has been closed".into()),
        );
        assert!(e.is_fatal());
    }
}
