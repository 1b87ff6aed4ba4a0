use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::adapt::history::AdaptationStrategy;

/// Closed taxonomy of interactive element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Button,
    ImageButton,
    Link,
    TextInput,
    PasswordInput,
    EmailInput,
    NumberInput,
    SearchInput,
    TelInput,
    UrlInput,
    DateInput,
    TimeInput,
    FileInput,
    ColorInput,
    RangeInput,
    Textarea,
    ContentEditable,
    Select,
    Dropdown,
    Checkbox,
    Radio,
    Toggle,
    Tab,
    MenuItem,
    ListOption,
    Slider,
    Accordion,
    DialogTrigger,
    #[default]
    Unknown,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Button => "button",
            ElementType::ImageButton => "image_button",
            ElementType::Link => "link",
            ElementType::TextInput => "text_input",
            ElementType::PasswordInput => "password_input",
            ElementType::EmailInput => "email_input",
            ElementType::NumberInput => "number_input",
            ElementType::SearchInput => "search_input",
            ElementType::TelInput => "tel_input",
            ElementType::UrlInput => "url_input",
            ElementType::DateInput => "date_input",
            ElementType::TimeInput => "time_input",
            ElementType::FileInput => "file_input",
            ElementType::ColorInput => "color_input",
            ElementType::RangeInput => "range_input",
            ElementType::Textarea => "textarea",
            ElementType::ContentEditable => "content_editable",
            ElementType::Select => "select",
            ElementType::Dropdown => "dropdown",
            ElementType::Checkbox => "checkbox",
            ElementType::Radio => "radio",
            ElementType::Toggle => "toggle",
            ElementType::Tab => "tab",
            ElementType::MenuItem => "menu_item",
            ElementType::ListOption => "list_option",
            ElementType::Slider => "slider",
            ElementType::Accordion => "accordion",
            ElementType::DialogTrigger => "dialog_trigger",
            ElementType::Unknown => "unknown",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ElementType::Unknown)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Descriptive and provenance data attached to an element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Ancestor trail (form / fieldset / section / nav / dialog / table / list
    /// labels), outermost first, joined with `CONTEXT_SEPARATOR`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapted_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptation_strategy: Option<AdaptationStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptation_score: Option<f64>,
    #[serde(default)]
    pub ai_detected: bool,
}

pub const CONTEXT_SEPARATOR: &str = " > ";

impl ElementMetadata {
    /// Context trail split back into its individual ancestor labels.
    pub fn context_labels(&self) -> Vec<&str> {
        self.context
            .as_deref()
            .map(|c| {
                c.split(CONTEXT_SEPARATOR)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn join_context(labels: &[String]) -> Option<String> {
    if labels.is_empty() {
        None
    } else {
        Some(labels.join(CONTEXT_SEPARATOR))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveElement {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub is_visible: bool,
    pub is_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(default)]
    pub metadata: ElementMetadata,
}

impl InteractiveElement {
    /// Position used for deduplication: the rounded top-left corner, if known.
    pub fn position(&self) -> Option<(i64, i64)> {
        self.bounding_box
            .map(|b| (b.x.round() as i64, b.y.round() as i64))
    }

    /// Identity used when merging detection paths.
    pub fn dedup_key(&self) -> (String, ElementType, Option<String>, Option<(i64, i64)>) {
        (
            self.selector.clone(),
            self.element_type,
            self.text.clone(),
            self.position(),
        )
    }

    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

impl fmt::Display for InteractiveElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> {}", self.element_type, self.selector)?;
        if let Some(text) = &self.text {
            write!(f, " \"{}\"", text)?;
        }
        if let Some(strategy) = &self.metadata.adaptation_strategy {
            write!(f, " (adapted via {})", strategy)?;
        }
        Ok(())
    }
}

/// An AI hint naming a candidate element. Validated at the observer boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub selector: String,
    pub description: String,
}

impl Observation {
    pub fn new(selector: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionErrorEntry {
    pub selector: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub elements: Vec<InteractiveElement>,
    pub total_found: usize,
    /// Wall-clock duration of the pass in milliseconds.
    pub detection_time: u64,
    pub errors: Vec<DetectionErrorEntry>,
}
