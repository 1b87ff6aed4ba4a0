use crate::element::element_model::ElementType;

// ============================================================================
// Description keyword table
// ============================================================================

/// Ordered keyword table mapping free-text AI descriptions to element types.
/// The first row with a matching keyword wins.
pub const DESCRIPTION_KEYWORDS: &[(&[&str], ElementType)] = &[
    (&["button", "click"], ElementType::Button),
    (&["password"], ElementType::PasswordInput),
    (&["email"], ElementType::EmailInput),
    (&["number"], ElementType::NumberInput),
    (&["text", "field"], ElementType::TextInput),
    (&["link", "navigate"], ElementType::Link),
    (&["checkbox"], ElementType::Checkbox),
    (&["radio"], ElementType::Radio),
    (&["select", "dropdown"], ElementType::Select),
    (&["toggle", "switch"], ElementType::Toggle),
];

/// Infer an element type from an observation description.
pub fn infer_type_from_description(description: &str) -> ElementType {
    let lower = description.to_lowercase();

    DESCRIPTION_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, element_type)| *element_type)
        .unwrap_or(ElementType::Unknown)
}

/// Parse a type name as emitted by a model (`"text_input"`, `"Text Input"`,
/// `"checkbox"`), falling back to the keyword table.
pub fn parse_type_name(name: &str) -> ElementType {
    let normalized = name
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_");

    match serde_json::from_value::<ElementType>(serde_json::Value::String(normalized)) {
        Ok(t) => t,
        Err(_) => infer_type_from_description(name),
    }
}

// ============================================================================
// DOM-based inference
// ============================================================================

/// Infer an element type from DOM facts. ARIA role takes precedence over tag.
pub fn infer_type_from_dom(
    tag: &str,
    input_type: Option<&str>,
    role: Option<&str>,
    content_editable: bool,
) -> ElementType {
    if let Some(role) = role {
        let from_role = match role.trim().to_lowercase().as_str() {
            "button" => Some(ElementType::Button),
            "link" => Some(ElementType::Link),
            "tab" => Some(ElementType::Tab),
            "menuitem" | "menuitemcheckbox" | "menuitemradio" => Some(ElementType::MenuItem),
            "option" => Some(ElementType::ListOption),
            "checkbox" => Some(ElementType::Checkbox),
            "radio" => Some(ElementType::Radio),
            "switch" => Some(ElementType::Toggle),
            "slider" => Some(ElementType::Slider),
            "combobox" | "listbox" => Some(ElementType::Dropdown),
            "textbox" => Some(ElementType::TextInput),
            "searchbox" => Some(ElementType::SearchInput),
            _ => None,
        };
        if let Some(t) = from_role {
            return t;
        }
    }

    match tag.to_lowercase().as_str() {
        "a" => ElementType::Link,
        "button" => ElementType::Button,
        "select" => ElementType::Select,
        "textarea" => ElementType::Textarea,
        "summary" => ElementType::Accordion,
        "input" => match input_type.map(|t| t.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("text") => ElementType::TextInput,
            Some("password") => ElementType::PasswordInput,
            Some("email") => ElementType::EmailInput,
            Some("number") => ElementType::NumberInput,
            Some("search") => ElementType::SearchInput,
            Some("tel") => ElementType::TelInput,
            Some("url") => ElementType::UrlInput,
            Some("date") | Some("datetime-local") | Some("datetime") | Some("month")
            | Some("week") => ElementType::DateInput,
            Some("time") => ElementType::TimeInput,
            Some("file") => ElementType::FileInput,
            Some("color") => ElementType::ColorInput,
            Some("range") => ElementType::RangeInput,
            Some("checkbox") => ElementType::Checkbox,
            Some("radio") => ElementType::Radio,
            Some("submit") | Some("button") | Some("reset") => ElementType::Button,
            Some("image") => ElementType::ImageButton,
            // Unrecognised input types still accept text
            Some(_) => ElementType::TextInput,
        },
        _ if content_editable => ElementType::ContentEditable,
        _ => ElementType::Unknown,
    }
}

// ============================================================================
// Compatibility
// ============================================================================

/// Coarse grouping used to decide whether a candidate node could stand in for
/// an element of another type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeFamily {
    Press,
    Navigate,
    TextEntry,
    Temporal,
    Choice,
    Exclusive,
    Picker,
    Range,
    Own(ElementType),
}

fn family(t: ElementType) -> TypeFamily {
    match t {
        ElementType::Button | ElementType::ImageButton | ElementType::DialogTrigger => {
            TypeFamily::Press
        }
        ElementType::Link => TypeFamily::Navigate,
        ElementType::TextInput
        | ElementType::PasswordInput
        | ElementType::EmailInput
        | ElementType::NumberInput
        | ElementType::SearchInput
        | ElementType::TelInput
        | ElementType::UrlInput
        | ElementType::Textarea
        | ElementType::ContentEditable => TypeFamily::TextEntry,
        ElementType::DateInput | ElementType::TimeInput => TypeFamily::Temporal,
        ElementType::Checkbox | ElementType::Toggle => TypeFamily::Choice,
        ElementType::Radio => TypeFamily::Exclusive,
        ElementType::Select | ElementType::Dropdown => TypeFamily::Picker,
        ElementType::Slider | ElementType::RangeInput => TypeFamily::Range,
        other => TypeFamily::Own(other),
    }
}

/// Whether a node of `candidate` type is an acceptable replacement for an
/// element originally typed `original`.
pub fn is_compatible(original: ElementType, candidate: ElementType) -> bool {
    if candidate.is_unknown() {
        return false;
    }
    if original.is_unknown() {
        return true;
    }
    original == candidate || family(original) == family(candidate)
}

// ============================================================================
// Identity
// ============================================================================

/// Stable element id: truncated SHA-1 over page, type, selector and text.
pub fn element_id(page_url: &str, element_type: ElementType, selector: &str, text: Option<&str>) -> String {
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(page_url.as_bytes());
    hasher.update(b"|");
    hasher.update(element_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(selector.as_bytes());
    hasher.update(b"|");
    hasher.update(text.unwrap_or("").as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Collapse runs of whitespace and trim; `None` when nothing remains.
pub fn normalize_text(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
