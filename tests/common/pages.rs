use std::cell::RefCell;
use std::collections::HashSet;

use async_trait::async_trait;
use element_detection::browser::error::PageError;
use element_detection::browser::html_page::HtmlPage;
use element_detection::browser::page::{DomNode, ElementHandle, Page};

/// Wraps an `HtmlPage` and makes chosen selectors stop resolving, while the
/// DOM snapshot still shows every node. Models a selector that broke between
/// detection and use.
pub struct BrokenSelectorPage {
    inner: HtmlPage,
    broken: RefCell<HashSet<String>>,
    /// Number of `query` calls seen before a selector breaks.
    break_after: usize,
    queries: RefCell<usize>,
}

impl BrokenSelectorPage {
    pub fn new(inner: HtmlPage, broken: &[&str], break_after: usize) -> Self {
        Self {
            inner,
            broken: RefCell::new(broken.iter().map(|s| s.to_string()).collect()),
            break_after,
            queries: RefCell::new(0),
        }
    }
}

#[async_trait(?Send)]
impl Page for BrokenSelectorPage {
    fn url(&self) -> String {
        self.inner.url()
    }

    async fn query(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>, PageError> {
        *self.queries.borrow_mut() += 1;
        if *self.queries.borrow() > self.break_after && self.broken.borrow().contains(selector) {
            return Ok(None);
        }
        self.inner.query(selector).await
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError> {
        if *self.queries.borrow() > self.break_after && self.broken.borrow().contains(selector) {
            return Ok(Vec::new());
        }
        self.inner.query_all(selector).await
    }

    async fn dom_snapshot(&self) -> Result<Vec<DomNode>, PageError> {
        self.inner.dom_snapshot().await
    }
}

/// Page whose attribute reads fail for every element.
pub struct OpaqueAttributesPage {
    pub inner: HtmlPage,
}

struct OpaqueHandle {
    inner: Box<dyn ElementHandle>,
}

#[async_trait(?Send)]
impl ElementHandle for OpaqueHandle {
    async fn describe(&self) -> Result<element_detection::browser::page::HandleInfo, PageError> {
        Err(PageError::Detached {
            selector: "opaque".into(),
        })
    }

    async fn is_visible(&self) -> Result<bool, PageError> {
        self.inner.is_visible().await
    }

    async fn is_enabled(&self) -> Result<bool, PageError> {
        self.inner.is_enabled().await
    }

    async fn bounding_box(
        &self,
    ) -> Result<Option<element_detection::element::element_model::BoundingBox>, PageError> {
        self.inner.bounding_box().await
    }

    async fn text_content(&self) -> Result<Option<String>, PageError> {
        self.inner.text_content().await
    }

    async fn get_attribute(&self, name: &str) -> Result<Option<String>, PageError> {
        self.inner.get_attribute(name).await
    }
}

#[async_trait(?Send)]
impl Page for OpaqueAttributesPage {
    fn url(&self) -> String {
        self.inner.url()
    }

    async fn query(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>, PageError> {
        Ok(self
            .inner
            .query(selector)
            .await?
            .map(|inner| Box::new(OpaqueHandle { inner }) as Box<dyn ElementHandle>))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError> {
        Ok(self
            .inner
            .query_all(selector)
            .await?
            .into_iter()
            .map(|inner| Box::new(OpaqueHandle { inner }) as Box<dyn ElementHandle>)
            .collect())
    }

    async fn dom_snapshot(&self) -> Result<Vec<DomNode>, PageError> {
        self.inner.dom_snapshot().await
    }
}
