//! Deterministic DOM heuristics: interactivity scoring and selector synthesis.
//!
//! Operates on a flattened `DomNode` snapshot where each node's `index` and
//! `parent` are positions in the same slice.

use std::collections::HashSet;

use crate::browser::page::DomNode;
use crate::element::element_model::{ElementMetadata, InteractiveElement, join_context};
use crate::element::taxonomy::{element_id, infer_type_from_dom};

/// ARIA roles that make any element interactive.
pub const INTERACTIVE_ROLES: &[&str] = &[
    "button", "link", "tab", "menuitem", "option", "checkbox", "radio",
];

/// Inline handler attributes left behind by frameworks.
pub const CLICK_HANDLER_ATTRS: &[&str] = &[
    "onclick",
    "ng-click",
    "v-on:click",
    "@click",
    "(click)",
    "data-action",
    "data-click",
    "jsaction",
];

/// Class names conventionally used for clickable widgets.
pub const CLICK_CLASSES: &[&str] = &[
    "btn", "button", "clickable", "link", "cursor-pointer", "action",
];

/// Minimum score for a node to count as interactive.
pub const INTERACTIVE_THRESHOLD: u32 = 2;

pub fn interactivity_score(node: &DomNode) -> u32 {
    let mut score = 0;

    let native = match node.tag.as_str() {
        "a" => node.has_attr("href"),
        "button" | "select" | "textarea" | "summary" => true,
        "input" => !node.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")),
        _ => false,
    };
    if native {
        score += 3;
    }

    if node
        .role()
        .is_some_and(|r| INTERACTIVE_ROLES.contains(&r.trim().to_lowercase().as_str()))
    {
        score += 3;
    }

    if node.is_content_editable() {
        score += 3;
    }

    if let Some(tabindex) = node.attr("tabindex") {
        if tabindex.trim().parse::<i32>().is_ok_and(|t| t != -1) {
            score += 1;
        }
    }

    if CLICK_HANDLER_ATTRS.iter().any(|a| node.has_attr(a)) {
        score += 2;
    }

    if node
        .classes()
        .iter()
        .any(|c| CLICK_CLASSES.contains(&c.to_lowercase().as_str()))
    {
        score += 1;
    }

    if node.cursor_pointer {
        score += 1;
    }

    score
}

// ============================================================================
// Selector synthesis
// ============================================================================

fn is_css_ident(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let valid_start = first.is_ascii_alphabetic()
        || first == '_'
        || (first == '-' && value.chars().nth(1).is_some_and(|c| !c.is_ascii_digit()));
    valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn quote_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn id_selector(id: &str) -> String {
    if is_css_ident(id) {
        format!("#{}", id)
    } else {
        format!("[id=\"{}\"]", quote_attr(id))
    }
}

fn unique_by(nodes: &[DomNode], predicate: impl Fn(&DomNode) -> bool) -> bool {
    nodes.iter().filter(|n| predicate(n)).count() == 1
}

fn unique_id(nodes: &[DomNode], node: &DomNode) -> Option<String> {
    let id = node.attr("id").filter(|v| !v.trim().is_empty())?;
    unique_by(nodes, |n| n.attr("id") == Some(id)).then(|| id_selector(id))
}

/// Build a selector for `nodes[index]`, preferring `id`, then
/// `data-testid`, then a class combination that is unique in the snapshot,
/// then a structural `nth-child` path.
pub fn synthesize_selector(nodes: &[DomNode], index: usize) -> String {
    let Some(node) = nodes.get(index) else {
        return String::new();
    };

    if let Some(selector) = unique_id(nodes, node) {
        return selector;
    }

    if let Some(test_id) = node.attr("data-testid").filter(|v| !v.trim().is_empty()) {
        if unique_by(nodes, |n| n.attr("data-testid") == Some(test_id)) {
            return format!("[data-testid=\"{}\"]", quote_attr(test_id));
        }
    }

    let classes = node.classes();
    if !classes.is_empty() && classes.iter().all(|c| is_css_ident(c)) {
        let wanted: HashSet<&str> = classes.iter().copied().collect();
        let unique = unique_by(nodes, |n| {
            n.tag == node.tag && {
                let have: HashSet<&str> = n.classes().into_iter().collect();
                wanted.is_subset(&have)
            }
        });
        if unique {
            return format!("{}.{}", node.tag, classes.join("."));
        }
    }

    structural_path(nodes, index)
}

/// `nth-child` path from the nearest uniquely-identified ancestor (or `html`).
pub fn structural_path(nodes: &[DomNode], index: usize) -> String {
    let mut parts = Vec::new();
    let mut current = Some(index);

    while let Some(i) = current {
        let Some(node) = nodes.get(i) else {
            break;
        };

        if i != index {
            if let Some(anchor) = unique_id(nodes, node) {
                parts.push(anchor);
                break;
            }
        }

        match node.tag.as_str() {
            "html" => {
                parts.push("html".to_string());
                break;
            }
            "body" => parts.push("body".to_string()),
            tag => parts.push(format!("{}:nth-child({})", tag, node.nth_child.max(1))),
        }
        current = node.parent;
    }

    parts.reverse();
    parts.join(" > ")
}

/// Absolute XPath using per-tag sibling positions.
pub fn xpath(nodes: &[DomNode], index: usize) -> String {
    let mut segments = Vec::new();
    let mut current = Some(index);

    while let Some(i) = current {
        let Some(node) = nodes.get(i) else {
            break;
        };
        let position = nodes
            .iter()
            .filter(|n| n.parent == node.parent && n.tag == node.tag && n.index < node.index)
            .count()
            + 1;
        segments.push(format!("{}[{}]", node.tag, position));
        current = node.parent;
    }

    segments.reverse();
    format!("/{}", segments.join("/"))
}

// ============================================================================
// Element construction
// ============================================================================

fn label_for(nodes: &[DomNode], node: &DomNode) -> Option<String> {
    if let Some(label) = node.attr("aria-label").filter(|l| !l.trim().is_empty()) {
        return Some(label.trim().to_string());
    }

    if let Some(id) = node.attr("id") {
        let explicit = nodes
            .iter()
            .find(|n| n.tag == "label" && n.attr("for") == Some(id))
            .and_then(|n| n.text.clone());
        if explicit.is_some() {
            return explicit;
        }
    }

    let mut parent = node.parent;
    while let Some(p) = parent.and_then(|i| nodes.get(i)) {
        if p.tag == "label" {
            return p.text.clone();
        }
        parent = p.parent;
    }

    None
}

/// Visible text of a node, falling back to the `value` of button-like inputs.
pub fn node_text(node: &DomNode) -> Option<String> {
    if node.text.is_some() {
        return node.text.clone();
    }
    let button_input = node.tag == "input"
        && matches!(
            node.attr("type").map(str::to_lowercase).as_deref(),
            Some("submit") | Some("button") | Some("reset")
        );
    if button_input {
        return node.attr("value").map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    }
    None
}

/// Build an `InteractiveElement` for `nodes[index]`.
pub fn element_from_node(nodes: &[DomNode], index: usize, page_url: &str) -> Option<InteractiveElement> {
    let node = nodes.get(index)?;

    let selector = synthesize_selector(nodes, index);
    let element_type = infer_type_from_dom(
        &node.tag,
        node.attr("type"),
        node.role(),
        node.is_content_editable(),
    );
    let text = node_text(node);

    let options = if node.tag == "select" {
        nodes
            .iter()
            .filter(|n| n.tag == "option" && n.parent == Some(index))
            .filter_map(|n| n.text.clone())
            .collect()
    } else {
        Vec::new()
    };

    let parent_selector = node
        .parent
        .and_then(|p| nodes.get(p))
        .filter(|p| p.tag != "html")
        .map(|p| synthesize_selector(nodes, p.index));

    Some(InteractiveElement {
        id: element_id(page_url, element_type, &selector, text.as_deref()),
        element_type,
        selector,
        xpath: Some(xpath(nodes, index)),
        text,
        attributes: node.attributes.clone(),
        is_visible: node.visible,
        is_enabled: node.enabled,
        bounding_box: node.bounding_box,
        parent_selector,
        children: Vec::new(),
        metadata: ElementMetadata {
            label: label_for(nodes, node),
            placeholder: node.attr("placeholder").map(str::to_string),
            required: node.has_attr("required") || node.attr("aria-required") == Some("true"),
            options,
            context: join_context(&node.context),
            ..ElementMetadata::default()
        },
    })
}

/// Deterministic sweep: every node scoring as interactive becomes an element.
pub fn sweep(nodes: &[DomNode], page_url: &str, include_hidden: bool) -> Vec<InteractiveElement> {
    let accepted: Vec<usize> = nodes
        .iter()
        .filter(|n| include_hidden || n.visible)
        .filter(|n| interactivity_score(n) >= INTERACTIVE_THRESHOLD)
        .map(|n| n.index)
        .collect();

    accepted
        .iter()
        .filter_map(|&i| {
            let mut element = element_from_node(nodes, i, page_url)?;
            element.children = accepted
                .iter()
                .filter(|&&c| nodes.get(c).is_some_and(|n| n.parent == Some(i)))
                .map(|&c| synthesize_selector(nodes, c))
                .collect();
            Some(element)
        })
        .collect()
}
