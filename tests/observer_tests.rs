use std::time::Duration;

use element_detection::adapt::engine::{AdaptationConfig, AdaptationEngine};
use element_detection::adapt::history::AdaptationStrategy;
use element_detection::detector::config::DetectionConfig;
use element_detection::detector::primary::PrimaryDetector;
use element_detection::element::element_model::{ElementType, Observation};
use element_detection::observer::observer::{ElementObserver, ObserverError};
use element_detection::observer::ollama::OllamaObserver;
use element_detection::observer::scripted::ScriptedObserver;
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::utils::{find, page};

mod common;

fn ollama_reply(response: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "test-model",
        "response": response.to_string(),
        "done": true
    }))
}

async fn observer_for(server: &MockServer) -> OllamaObserver {
    OllamaObserver::new(&format!("{}/api/generate", server.uri()), "test-model")
}

// ============================================================================
// Ollama observer
// ============================================================================

#[tokio::test]
async fn observe_validates_model_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "test-model", "stream": false, "format": "json"})))
        .respond_with(ollama_reply(json!([
            {"selector": "#submit", "description": "Submit button"},
            {"selector": "", "description": "nothing"},
            {"note": "not an observation"}
        ])))
        .mount(&server)
        .await;

    let observer = observer_for(&server).await;
    let observations = observer.observe("Find all submit buttons").await.unwrap();

    assert_eq!(observations, vec![Observation::new("#submit", "Submit button")]);
}

#[tokio::test]
async fn attach_sends_page_digest_with_each_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("#place-order"))
        .and(body_string_contains("Find all submit buttons"))
        .respond_with(ollama_reply(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let mut observer = observer_for(&server).await;
    observer.attach(&page("checkout.html")).await.unwrap();
    let observations = observer.observe("Find all submit buttons").await.unwrap();

    assert!(observations.is_empty());
}

#[tokio::test]
async fn non_success_status_is_an_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let observer = observer_for(&server).await;
    let err = observer.observe("anything").await.unwrap_err();

    match err {
        ObserverError::Http { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("Expected Http error, got {:?}", other),
    }
}

#[tokio::test]
async fn unparsable_model_output_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "I think it's the blue one"})))
        .mount(&server)
        .await;

    let observer = observer_for(&server).await;
    let err = observer.observe("anything").await.unwrap_err();
    assert!(matches!(err, ObserverError::Malformed(_)));
}

#[tokio::test]
async fn slow_model_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ollama_reply(json!([])).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let observer = observer_for(&server)
        .await
        .with_timeout(Duration::from_millis(50))
        .unwrap();
    let err = observer.observe("anything").await.unwrap_err();
    assert!(matches!(err, ObserverError::Timeout(_)));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_request_error() {
    let observer = OllamaObserver::new("http://127.0.0.1:9/api/generate", "test-model");
    let err = observer.observe("anything").await.unwrap_err();
    assert!(matches!(err, ObserverError::Request(_) | ObserverError::Timeout(_)));
}

#[tokio::test]
async fn classify_parses_type_and_clamps_confidence() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Classify the element at selector '#mystery'"))
        .respond_with(ollama_reply(json!({"type": "Text Input", "confidence": 1.4})))
        .mount(&server)
        .await;

    let observer = observer_for(&server).await;
    let classification = observer.classify("#mystery", "form:checkout").await.unwrap();

    assert_eq!(classification.element_type, ElementType::TextInput);
    assert_eq!(classification.confidence, 1.0);
}

#[tokio::test]
async fn detector_runs_end_to_end_against_ollama() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Find all submit buttons"))
        .respond_with(ollama_reply(json!([
            {"selector": "#place-order", "description": "Place order submit button"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("Find all form input fields"))
        .respond_with(ollama_reply(json!({"elements": [
            {"selector": "#email", "description": "Email text field"},
            {"selector": "#password", "description": "Password field"}
        ]})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let observer = observer_for(&server).await;
    let mut detector = PrimaryDetector::with_observer(Box::new(observer), DetectionConfig::default());
    let page = page("checkout.html");

    let result = detector.detect_interactive_elements(&page).await.unwrap();

    assert_eq!(result.total_found, 3);
    assert_eq!(find(&result, "#password").unwrap().element_type, ElementType::PasswordInput);
    assert_eq!(find(&result, "#place-order").unwrap().element_type, ElementType::Button);
    assert!(result.elements.iter().all(|e| e.metadata.ai_detected));
}

#[tokio::test]
async fn each_detection_pass_describes_the_page_it_runs_on() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Find all submit buttons"))
        .and(body_string_contains("#submit-v2 | <button"))
        .respond_with(ollama_reply(json!([
            {"selector": "#submit-v2", "description": "Submit button"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ollama_reply(json!([])))
        .mount(&server)
        .await;

    let observer = observer_for(&server).await;
    let config = DetectionConfig {
        min_ai_results: 1,
        ..DetectionConfig::default()
    };
    let mut detector = PrimaryDetector::with_observer(Box::new(observer), config);

    let first = detector.detect_interactive_elements(&page("checkout.html")).await.unwrap();
    assert!(find(&first, "#submit-v2").is_none());

    let second = detector.detect_interactive_elements(&page("submit_v2.html")).await.unwrap();
    let submit = find(&second, "#submit-v2").unwrap();
    assert!(submit.metadata.ai_detected);
}

#[tokio::test]
async fn reacquisition_prompt_lists_the_changed_page() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("previously matched '#submit'"))
        .and(body_string_contains("#submit-v2 | <button"))
        .respond_with(ollama_reply(json!([
            {"selector": "#submit-v2", "description": "Submit button"}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ollama_reply(json!([])))
        .mount(&server)
        .await;

    let observer = observer_for(&server).await;
    let detector = PrimaryDetector::with_observer(Box::new(observer), DetectionConfig::default());
    let mut engine = AdaptationEngine::new(detector, AdaptationConfig::default());

    let before = engine
        .detect_interactive_elements(&page("submit_v1.html"))
        .await
        .unwrap();
    let submit = find(&before, "#submit").cloned().unwrap();

    let adapted = engine
        .get_adaptive_element(&page("submit_v2.html"), &submit)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(adapted.selector, "#submit-v2");
    assert_eq!(
        adapted.metadata.adaptation_strategy,
        Some(AdaptationStrategy::AiReacquisition)
    );
}

// ============================================================================
// Scripted observer and default classification
// ============================================================================

#[tokio::test]
async fn scripted_rules_match_case_insensitively_in_order() {
    let observer = ScriptedObserver::new()
        .on("SUBMIT", vec![Observation::new("#a", "Submit button")])
        .on("submit buttons", vec![Observation::new("#b", "Other button")]);

    let observations = observer.observe("Find all submit buttons").await.unwrap();
    assert_eq!(observations[0].selector, "#a");
    assert_eq!(observer.instruction_log().borrow().len(), 1);
}

#[tokio::test]
async fn default_classify_without_hits_is_unknown() {
    let observer = ScriptedObserver::new();
    let classification = observer.classify("#x", "").await.unwrap();

    assert_eq!(classification.element_type, ElementType::Unknown);
    assert_eq!(classification.confidence, 0.0);
}

#[tokio::test]
async fn default_classify_propagates_observer_failure() {
    let observer = ScriptedObserver::new().failing_by_default("offline");
    let err = observer.classify("#x", "").await.unwrap_err();
    assert!(matches!(err, ObserverError::Rejected(_)));
}
