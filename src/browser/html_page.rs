use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::browser::error::PageError;
use crate::browser::page::{DomNode, ElementHandle, HandleInfo, Page};
use crate::element::element_model::BoundingBox;
use crate::element::taxonomy::normalize_text;

/// Tags that never render a box.
const NON_RENDERED_TAGS: &[&str] = &[
    "head", "script", "style", "template", "meta", "link", "title", "noscript", "base",
];

/// Ancestors recorded in an element's context trail.
const CONTEXT_TAGS: &[&str] = &[
    "form", "fieldset", "section", "nav", "dialog", "table", "ul", "ol",
];

/// A static page over parsed HTML.
///
/// Used for offline detection of saved pages and as the page double in tests.
/// Layout is not computed, so bounding boxes are always `None` and visibility
/// comes from markup alone (`hidden`, `aria-hidden`, inline `display`/`visibility`,
/// `<input type="hidden">`).
pub struct HtmlPage {
    url: String,
    document: Html,
    alive: Rc<Cell<bool>>,
}

impl HtmlPage {
    pub fn parse(url: impl Into<String>, html: &str) -> Self {
        Self {
            url: url.into(),
            document: Html::parse_document(html),
            alive: Rc::new(Cell::new(true)),
        }
    }

    /// Simulate the page navigating away: every later call on the page or on
    /// handles it produced fails with `ContextDestroyed`.
    pub fn destroy(&self) {
        self.alive.set(false);
    }

    fn ensure_alive(&self) -> Result<(), PageError> {
        ensure_alive(&self.alive)
    }

    fn parse_selector(selector: &str) -> Result<Selector, PageError> {
        Selector::parse(selector).map_err(|e| PageError::InvalidSelector {
            selector: selector.to_string(),
            reason: format!("{:?}", e),
        })
    }

    fn handle_for(&self, el: ElementRef<'_>) -> Box<dyn ElementHandle> {
        Box::new(HtmlHandle {
            info: HandleInfo {
                tag: el.value().name().to_string(),
                attributes: attributes_of(el),
                context: context_trail(el),
            },
            text: element_text(el),
            visible: is_rendered(el),
            enabled: is_enabled(el),
            alive: Rc::clone(&self.alive),
        })
    }
}

fn ensure_alive(alive: &Cell<bool>) -> Result<(), PageError> {
    if alive.get() {
        Ok(())
    } else {
        Err(PageError::ContextDestroyed(
            "Execution context was destroyed, most likely because of a navigation".into(),
        ))
    }
}

#[async_trait(?Send)]
impl Page for HtmlPage {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn query(&self, selector: &str) -> Result<Option<Box<dyn ElementHandle>>, PageError> {
        self.ensure_alive()?;
        let parsed = Self::parse_selector(selector)?;
        Ok(self
            .document
            .select(&parsed)
            .next()
            .map(|el| self.handle_for(el)))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, PageError> {
        self.ensure_alive()?;
        let parsed = Self::parse_selector(selector)?;
        Ok(self
            .document
            .select(&parsed)
            .map(|el| self.handle_for(el))
            .collect())
    }

    async fn dom_snapshot(&self) -> Result<Vec<DomNode>, PageError> {
        self.ensure_alive()?;

        let root = self.document.root_element();
        let elements: Vec<ElementRef<'_>> = root
            .descendants()
            .filter_map(ElementRef::wrap)
            .collect();

        let mut index_of = HashMap::new();
        for (i, el) in elements.iter().enumerate() {
            index_of.insert(el.id(), i);
        }

        let nodes = elements
            .iter()
            .enumerate()
            .map(|(i, el)| {
                let parent = el
                    .parent()
                    .and_then(ElementRef::wrap)
                    .and_then(|p| index_of.get(&p.id()).copied());

                let nth_child = el
                    .prev_siblings()
                    .filter(|n| n.value().is_element())
                    .count()
                    + 1;

                DomNode {
                    index: i,
                    tag: el.value().name().to_string(),
                    attributes: attributes_of(*el),
                    text: element_text(*el),
                    visible: is_rendered(*el),
                    enabled: is_enabled(*el),
                    cursor_pointer: style_value(*el, "cursor").as_deref() == Some("pointer"),
                    parent,
                    nth_child,
                    context: context_trail(*el),
                    bounding_box: None,
                }
            })
            .collect();

        Ok(nodes)
    }
}

struct HtmlHandle {
    info: HandleInfo,
    text: Option<String>,
    visible: bool,
    enabled: bool,
    alive: Rc<Cell<bool>>,
}

#[async_trait(?Send)]
impl ElementHandle for HtmlHandle {
    async fn describe(&self) -> Result<HandleInfo, PageError> {
        ensure_alive(&self.alive)?;
        Ok(self.info.clone())
    }

    async fn is_visible(&self) -> Result<bool, PageError> {
        ensure_alive(&self.alive)?;
        Ok(self.visible)
    }

    async fn is_enabled(&self) -> Result<bool, PageError> {
        ensure_alive(&self.alive)?;
        Ok(self.enabled)
    }

    async fn bounding_box(&self) -> Result<Option<BoundingBox>, PageError> {
        ensure_alive(&self.alive)?;
        Ok(None)
    }

    async fn text_content(&self) -> Result<Option<String>, PageError> {
        ensure_alive(&self.alive)?;
        Ok(self.text.clone())
    }

    async fn get_attribute(&self, name: &str) -> Result<Option<String>, PageError> {
        ensure_alive(&self.alive)?;
        Ok(self.info.attributes.get(name).cloned())
    }
}

// ============================================================================
// Markup-derived facts
// ============================================================================

fn attributes_of(el: ElementRef<'_>) -> BTreeMap<String, String> {
    el.value()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn element_text(el: ElementRef<'_>) -> Option<String> {
    normalize_text(&el.text().collect::<String>())
}

/// Value of one inline style property, lowercased.
fn style_value(el: ElementRef<'_>, property: &str) -> Option<String> {
    let style = el.value().attr("style")?;
    style.split(';').find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        if name.trim().eq_ignore_ascii_case(property) {
            Some(value.trim().to_lowercase())
        } else {
            None
        }
    })
}

fn hides_itself(el: ElementRef<'_>) -> bool {
    let element = el.value();
    let tag = element.name();

    NON_RENDERED_TAGS.contains(&tag)
        || element.attr("hidden").is_some()
        || element.attr("aria-hidden") == Some("true")
        || (tag == "input" && element.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")))
        || style_value(el, "display").as_deref() == Some("none")
        || style_value(el, "visibility").as_deref() == Some("hidden")
}

fn is_rendered(el: ElementRef<'_>) -> bool {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .all(|e| !hides_itself(e))
}

fn is_enabled(el: ElementRef<'_>) -> bool {
    let element = el.value();
    let form_control = matches!(
        element.name(),
        "button" | "input" | "select" | "textarea" | "option" | "fieldset"
    );

    if form_control && element.attr("disabled").is_some() {
        return false;
    }
    if element.attr("aria-disabled") == Some("true") {
        return false;
    }

    !el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "fieldset" && a.value().attr("disabled").is_some())
}

fn context_label(el: ElementRef<'_>) -> Option<String> {
    let element = el.value();
    let tag = element.name();
    let is_dialog_role = element.attr("role") == Some("dialog");

    if !CONTEXT_TAGS.contains(&tag) && !is_dialog_role {
        return None;
    }

    let kind = match tag {
        "ul" | "ol" => "list",
        _ if is_dialog_role => "dialog",
        other => other,
    };

    let child_text = |name: &str| {
        el.children()
            .filter_map(ElementRef::wrap)
            .find(|c| c.value().name() == name)
            .and_then(element_text)
    };

    let heading = || {
        el.descendants()
            .filter_map(ElementRef::wrap)
            .find(|d| matches!(d.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6"))
            .and_then(element_text)
    };

    let label = element
        .attr("aria-label")
        .and_then(normalize_text)
        .or_else(|| if tag == "fieldset" { child_text("legend") } else { None })
        .or_else(|| if tag == "table" { child_text("caption") } else { None })
        .or_else(|| {
            if matches!(kind, "section" | "dialog" | "form") {
                heading()
            } else {
                None
            }
        })
        .or_else(|| element.attr("id").and_then(normalize_text))
        .or_else(|| element.attr("name").and_then(normalize_text));

    Some(match label {
        Some(l) => format!("{}:{}", kind, l),
        None => kind.to_string(),
    })
}

fn context_trail(el: ElementRef<'_>) -> Vec<String> {
    let mut trail: Vec<String> = el
        .ancestors()
        .filter_map(ElementRef::wrap)
        .filter_map(context_label)
        .collect();
    trail.reverse();
    trail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> HtmlPage {
        HtmlPage::parse(
            "https://app.test/",
            &format!("<html><body>{}</body></html>", body),
        )
    }

    #[tokio::test]
    async fn query_resolves_first_match_with_text() {
        let p = page(r#"<button id="a">  Save   draft </button><button>Other</button>"#);
        let handle = p.query("button").await.unwrap().unwrap();
        assert_eq!(handle.text_content().await.unwrap(), Some("Save draft".into()));
        assert_eq!(handle.get_attribute("id").await.unwrap(), Some("a".into()));
        assert_eq!(p.query_all("button").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn hidden_ancestors_hide_descendants() {
        let p = page(
            r#"<div style="display: none"><button id="x">X</button></div>
               <input type="hidden" id="h">
               <button id="y" hidden>Y</button>
               <button id="z">Z</button>"#,
        );
        for (sel, expected) in [("#x", false), ("#h", false), ("#y", false), ("#z", true)] {
            let h = p.query(sel).await.unwrap().unwrap();
            assert_eq!(h.is_visible().await.unwrap(), expected, "{}", sel);
        }
    }

    #[tokio::test]
    async fn disabled_fieldset_disables_controls() {
        let p = page(r#"<fieldset disabled><input id="i"></fieldset><input id="j">"#);
        let i = p.query("#i").await.unwrap().unwrap();
        let j = p.query("#j").await.unwrap().unwrap();
        assert!(!i.is_enabled().await.unwrap());
        assert!(j.is_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn context_trail_uses_legend_and_aria_labels() {
        let p = page(
            r#"<form id="signup"><fieldset><legend>Account</legend>
               <input id="email" type="email"></fieldset></form>
               <nav aria-label="Main"><ul><li><a id="home" href="/">Home</a></li></ul></nav>"#,
        );
        let email = p.query("#email").await.unwrap().unwrap().describe().await.unwrap();
        assert_eq!(email.context, vec!["form:signup", "fieldset:Account"]);

        let home = p.query("#home").await.unwrap().unwrap().describe().await.unwrap();
        assert_eq!(home.context, vec!["nav:Main", "list"]);
    }

    #[tokio::test]
    async fn snapshot_records_structure() {
        let p = page(r#"<div><span>a</span><button style="cursor: pointer">b</button></div>"#);
        let nodes = p.dom_snapshot().await.unwrap();
        let button = nodes.iter().find(|n| n.tag == "button").unwrap();
        let div = nodes.iter().find(|n| n.tag == "div").unwrap();
        assert_eq!(button.parent, Some(div.index));
        assert_eq!(button.nth_child, 2);
        assert!(button.cursor_pointer);
        assert_eq!(nodes[0].tag, "html");
    }

    #[tokio::test]
    async fn invalid_selector_is_not_fatal_but_destroyed_context_is() {
        let p = page("<button>x</button>");
        let err = p.query("button[").await.err().unwrap();
        assert!(!err.is_fatal());

        let handle = p.query("button").await.unwrap().unwrap();
        p.destroy();
        assert!(p.query("button").await.err().unwrap().is_fatal());
        assert!(handle.is_visible().await.err().unwrap().is_fatal());
    }
}
