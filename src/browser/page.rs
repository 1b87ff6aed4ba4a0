use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::browser::error::PageError;
use crate::element::element_model::BoundingBox;

/// One element of a flattened DOM snapshot, in document order.
///
/// This is the payload a page's evaluate step returns for the deterministic
/// sweep and for structural / fuzzy adaptation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
    pub index: usize,
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cursor_pointer: bool,
    #[serde(default)]
    pub parent: Option<usize>,
    /// 1-based position among the parent's element children.
    #[serde(default)]
    pub nth_child: usize,
    /// Ancestor trail labels, outermost first.
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

impl DomNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn role(&self) -> Option<&str> {
        self.attr("role")
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attr("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn is_content_editable(&self) -> bool {
        matches!(self.attr("contenteditable"), Some("") | Some("true"))
    }
}

/// Facts about a resolved element that need a DOM evaluation to read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleInfo {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub context: Vec<String>,
}

/// A live reference to one DOM element.
#[async_trait(?Send)]
pub trait ElementHandle {
    async fn describe(&self) -> Result<HandleInfo, PageError>;
    async fn is_visible(&self) -> Result<bool, PageError>;
    async fn is_enabled(&self) -> Result<bool, PageError>;
    async fn bounding_box(&self) -> Result<Option<BoundingBox>, PageError>;
    async fn text_content(&self) -> Result<Option<String>, PageError>;
    async fn get_attribute(&self, name: &str) -> Result<Option<String>, PageError>;
}

/// The browser page capability the detection core consumes.
///
/// All calls go through one page context, so callers issue them one at a time.
#[async_trait(?Send)]
pub trait Page {
    fn url(&self) -> String;

    /// First element matching `selector`, if any.
    async fn query(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>, PageError>;

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError>;

    /// Flatten the whole document into `DomNode`s.
    async fn dom_snapshot(&self) -> Result<Vec<DomNode>, PageError>;
}

/// Does `selector` currently resolve to a visible element?
///
/// Selector-level failures count as "not present"; fatal page errors propagate.
pub async fn probe_visible(page: &dyn Page, selector: &str) -> Result<bool, PageError> {
    let handle = match page.query(selector).await {
        Ok(Some(h)) => h,
        Ok(None) => return Ok(false),
        Err(e) if e.is_fatal() => return Err(e),
        Err(_) => return Ok(false),
    };

    match handle.is_visible().await {
        Ok(visible) => Ok(visible),
        Err(e) if e.is_fatal() => Err(e),
        Err(_) => Ok(false),
    }
}
