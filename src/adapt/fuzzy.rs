//! Fuzzy text matching for elements whose visible text drifted.

use crate::browser::page::DomNode;
use crate::detector::heuristics::{INTERACTIVE_ROLES, node_text};
use crate::element::element_model::InteractiveElement;
use crate::element::taxonomy::normalize_text;

/// Tags whose text is worth comparing.
pub const FUZZY_TAGS: &[&str] = &[
    "button", "a", "input", "select", "textarea", "label", "summary",
];

/// Case-insensitive similarity in `[0, 1]`.
///
/// 1.0 for equal strings, 0.8 when one contains the other, otherwise the
/// length of the longest common subsequence over the longer string's length.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let (Some(a), Some(b)) = (normalize_text(a), normalize_text(b)) else {
        return 0.0;
    };
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.8;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longer = a.len().max(b.len());
    lcs_len(&a, &b) as f64 / longer as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

fn is_candidate(node: &DomNode) -> bool {
    node.visible
        && (FUZZY_TAGS.contains(&node.tag.as_str())
            || node
                .role()
                .is_some_and(|r| INTERACTIVE_ROLES.contains(&r.trim().to_lowercase().as_str())))
}

fn candidate_text(node: &DomNode) -> Option<String> {
    node_text(node).or_else(|| node.attr("aria-label").map(str::to_string))
}

/// Best text match among candidate nodes, if it beats `threshold`.
/// Elements without text never match.
pub fn best_fuzzy_match(
    original: &InteractiveElement,
    nodes: &[DomNode],
    threshold: f64,
) -> Option<(usize, f64)> {
    let wanted = original.text.as_deref().filter(|t| !t.trim().is_empty())?;
    let mut best: Option<(usize, f64)> = None;

    for node in nodes.iter().filter(|n| is_candidate(n)) {
        let Some(text) = candidate_text(node) else {
            continue;
        };
        let score = text_similarity(wanted, &text);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((node.index, score));
        }
    }

    best.filter(|(_, score)| *score > threshold)
}
