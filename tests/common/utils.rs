use element_detection::browser::html_page::HtmlPage;
use element_detection::element::element_model::{DetectionResult, InteractiveElement, Observation};

pub const PAGE_URL: &str = "https://shop.test/checkout";

pub fn fixture_path(name: &str) -> String {
    let base = std::env::current_dir().unwrap();
    let path = base.join("tests").join("fixtures").join(name);
    path.display().to_string()
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

/// Parse a fixture as a page served at `PAGE_URL`.
pub fn page(name: &str) -> HtmlPage {
    HtmlPage::parse(PAGE_URL, &fixture(name))
}

pub fn obs(selector: &str, description: &str) -> Vec<Observation> {
    vec![Observation::new(selector, description)]
}

pub fn find<'a>(result: &'a DetectionResult, selector: &str) -> Option<&'a InteractiveElement> {
    result.elements.iter().find(|e| e.selector == selector)
}

pub fn selectors(result: &DetectionResult) -> Vec<String> {
    let mut all: Vec<String> = result.elements.iter().map(|e| e.selector.clone()).collect();
    all.sort();
    all
}
