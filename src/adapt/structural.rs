//! Structural-similarity scoring of live DOM nodes against a stale element.

use std::collections::HashSet;

use crate::browser::page::DomNode;
use crate::element::element_model::InteractiveElement;
use crate::element::taxonomy::{infer_type_from_dom, is_compatible};

/// Attributes compared through their own rule, or too volatile to compare.
const SKIPPED_ATTRIBUTES: &[&str] = &["id", "class", "style"];

/// Never candidates.
const SKIPPED_TAGS: &[&str] = &["html", "head", "body"];

pub fn structural_score(original: &InteractiveElement, node: &DomNode) -> u32 {
    let mut score = 0;

    let candidate_type = infer_type_from_dom(
        &node.tag,
        node.attr("type"),
        node.role(),
        node.is_content_editable(),
    );
    if is_compatible(original.element_type, candidate_type) {
        score += 3;
    }

    for (name, value) in &original.attributes {
        if SKIPPED_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        if node.attr(name) == Some(value.as_str()) {
            score += 2;
        }
    }

    let original_classes: HashSet<&str> = original
        .attributes
        .get("class")
        .map(|c| c.split_whitespace().collect())
        .unwrap_or_default();
    let node_classes: HashSet<&str> = node.classes().into_iter().collect();
    score += node_classes.intersection(&original_classes).count() as u32;

    let labels = original.metadata.context_labels();
    score += node
        .context
        .iter()
        .filter(|label| labels.contains(&label.as_str()))
        .count() as u32;

    score
}

/// Highest-scoring visible node, if it beats `threshold`. Ties go to the
/// node that comes first in document order.
pub fn best_structural_match(
    original: &InteractiveElement,
    nodes: &[DomNode],
    threshold: u32,
) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;

    for node in nodes
        .iter()
        .filter(|n| n.visible && !SKIPPED_TAGS.contains(&n.tag.as_str()))
    {
        let score = structural_score(original, node);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((node.index, score));
        }
    }

    best.filter(|(_, score)| *score > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::element_model::{ElementMetadata, ElementType};
    use std::collections::BTreeMap;

    fn original() -> InteractiveElement {
        InteractiveElement {
            id: "x".into(),
            element_type: ElementType::Button,
            selector: "#submit".into(),
            xpath: None,
            text: Some("Submit".into()),
            attributes: BTreeMap::from([
                ("id".to_string(), "submit".to_string()),
                ("class".to_string(), "btn btn-primary".to_string()),
                ("name".to_string(), "go".to_string()),
            ]),
            is_visible: true,
            is_enabled: true,
            bounding_box: None,
            parent_selector: None,
            children: vec![],
            metadata: ElementMetadata {
                context: Some("form:checkout".into()),
                ..Default::default()
            },
        }
    }

    fn node(index: usize, tag: &str, attrs: &[(&str, &str)], text: Option<&str>) -> DomNode {
        DomNode {
            index,
            tag: tag.into(),
            attributes: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            text: text.map(str::to_string),
            visible: true,
            enabled: true,
            nth_child: 1,
            ..Default::default()
        }
    }

    #[test]
    fn score_adds_every_signal() {
        let mut candidate = node(
            0,
            "button",
            &[("id", "submit-v2"), ("class", "btn btn-primary"), ("name", "go")],
            Some("Submit"),
        );
        candidate.context = vec!["form:checkout".into()];
        // type 3 + name 2 + classes 2 + context 1
        assert_eq!(structural_score(&original(), &candidate), 8);
    }

    #[test]
    fn identical_text_alone_adds_nothing() {
        let same_text = node(0, "button", &[], Some("Submit"));
        let other_text = node(1, "button", &[], Some("Cancel"));
        assert_eq!(
            structural_score(&original(), &same_text),
            structural_score(&original(), &other_text)
        );
    }

    #[test]
    fn incompatible_bare_node_scores_low() {
        let candidate = node(0, "div", &[], Some("Other"));
        assert_eq!(structural_score(&original(), &candidate), 0);
    }

    #[test]
    fn match_requires_strictly_more_than_threshold() {
        let nodes = vec![node(0, "button", &[], Some("Else"))];
        assert_eq!(structural_score(&original(), &nodes[0]), 3);
        assert_eq!(best_structural_match(&original(), &nodes, 3), None);
    }

    #[test]
    fn ties_go_to_document_order_and_hidden_nodes_are_skipped() {
        let mut hidden = node(0, "button", &[("class", "btn btn-primary")], Some("Submit"));
        hidden.visible = false;
        let nodes = vec![
            hidden,
            node(1, "button", &[("class", "btn")], Some("Submit")),
            node(2, "button", &[("class", "btn")], Some("Submit")),
        ];
        assert_eq!(best_structural_match(&original(), &nodes, 3), Some((1, 4)));
    }
}
