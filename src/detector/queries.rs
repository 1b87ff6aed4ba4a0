use crate::element::element_model::InteractiveElement;

/// Natural-language queries fanned out on every detection pass.
pub const DETECTION_QUERIES: [&str; 8] = [
    "Find all interactive elements a user can click, type into, or choose from",
    "Find all form input fields and text areas",
    "Find all navigation links and menu items",
    "Find all toggles, switches, checkboxes and radio buttons",
    "Find all submit buttons and primary call-to-action controls",
    "Find all dropdowns, select menus and comboboxes",
    "Find all controls inside open modals or dialogs",
    "Find all controls inside tables such as sort headers, row actions and pagination",
];

/// Broader re-query used when the fan-out found too little.
pub const FALLBACK_QUERY: &str = "List every clickable or editable element on the page, \
including icon-only buttons and elements without visible labels";

pub fn classification_instruction(selector: &str, context: &str) -> String {
    let mut instruction = format!(
        "Classify the element at selector '{}' and describe what kind of interactive element it is",
        selector
    );
    if !context.trim().is_empty() {
        instruction.push_str(&format!(" (found in: {})", context.trim()));
    }
    instruction
}

/// Instruction used to re-acquire an element whose selector stopped resolving.
pub fn reacquisition_instruction(element: &InteractiveElement) -> String {
    let mut instruction = format!(
        "Locate the {} element that previously matched '{}'",
        element.element_type.as_str().replace('_', " "),
        element.selector
    );
    if let Some(text) = element.text.as_deref().filter(|t| !t.trim().is_empty()) {
        instruction.push_str(&format!(" with text \"{}\"", text));
    }
    if let Some(label) = &element.metadata.label {
        instruction.push_str(&format!(" labelled \"{}\"", label));
    }
    if let Some(context) = &element.metadata.context {
        instruction.push_str(&format!(" inside {}", context));
    }
    instruction
}
