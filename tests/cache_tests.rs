use element_detection::adapt::cache::{AdaptiveCache, DEFAULT_TTL_MS, cache_key, now_ms};
use element_detection::adapt::history::{AdaptationAttempt, AdaptationStrategy};
use element_detection::element::element_model::{ElementMetadata, ElementType, InteractiveElement};
use element_detection::element::taxonomy::element_id;

const URL: &str = "https://shop.test/cart";

fn element(selector: &str, text: Option<&str>) -> InteractiveElement {
    InteractiveElement {
        id: element_id(URL, ElementType::Button, selector, text),
        element_type: ElementType::Button,
        selector: selector.to_string(),
        xpath: None,
        text: text.map(str::to_string),
        attributes: Default::default(),
        is_visible: true,
        is_enabled: true,
        bounding_box: None,
        parent_selector: None,
        children: vec![],
        metadata: ElementMetadata::default(),
    }
}

fn adapted(selector: &str, from: &str) -> InteractiveElement {
    let mut e = element(selector, Some("Pay"));
    e.metadata.adapted_from = Some(from.to_string());
    e.metadata.adaptation_strategy = Some(AdaptationStrategy::StructuralSimilarity);
    e
}

#[test]
fn key_combines_page_type_selector_and_text() {
    let key = cache_key(URL, &element("#pay", Some("Pay now")));
    assert_eq!(key, "https://shop.test/cart::button::#pay::Pay now");

    let untexted = cache_key(URL, &element("#pay", None));
    assert_eq!(untexted, "https://shop.test/cart::button::#pay::");
}

#[test]
fn last_write_wins_and_history_carries_over() {
    let mut cache = AdaptiveCache::default();
    let key = cache.put(URL, element("#pay", Some("Pay")));
    cache.record_attempt(&key, AdaptationAttempt::failed(1, "#pay"));

    let mut newer = element("#pay", Some("Pay"));
    newer.is_enabled = false;
    let same_key = cache.put(URL, newer);

    assert_eq!(key, same_key);
    assert_eq!(cache.len(), 1);
    let snapshot = cache.get(&key).unwrap();
    assert!(!snapshot.element.is_enabled);
    assert_eq!(snapshot.adaptation_history.len(), 1);
    assert_eq!(snapshot.page_url, URL);
}

#[test]
fn snapshots_expire_after_ttl() {
    let mut cache = AdaptiveCache::default();
    let now = now_ms();

    let fresh = cache.put_at(URL, element("#fresh", None), now);
    let stale = cache.put_at(URL, element("#stale", None), now - DEFAULT_TTL_MS - 1);

    assert!(cache.get_valid(&fresh).is_some());
    assert!(cache.get_valid(&stale).is_none());
    // Expired entries still exist until purged
    assert!(cache.get(&stale).is_some());

    assert_eq!(cache.purge_expired(), 1);
    assert!(cache.get(&stale).is_none());
    assert_eq!(cache.len(), 1);
}

#[test]
fn ttl_boundary_is_exclusive() {
    let mut cache = AdaptiveCache::new(1_000);
    let key = cache.put_at(URL, element("#pay", None), 10_000);
    let snapshot = cache.get(&key).unwrap().clone();

    assert!(cache.is_valid_at(&snapshot, 10_999));
    assert!(!cache.is_valid_at(&snapshot, 11_000));
    // Clock skew never makes a snapshot invalid
    assert!(cache.is_valid_at(&snapshot, 9_000));
}

#[test]
fn find_adapted_returns_newest_valid_replacement() {
    let mut cache = AdaptiveCache::default();
    let now = now_ms();

    cache.put_at(URL, adapted("#pay-v2", "#pay"), now - 10);
    cache.put_at(URL, adapted("#pay-v3", "#pay"), now);
    cache.put_at(URL, adapted("#pay-old", "#pay"), now - DEFAULT_TTL_MS - 5);
    cache.put_at("https://other.test", adapted("#pay-elsewhere", "#pay"), now + 5);

    let found = cache.find_adapted(URL, "#pay").unwrap();
    assert_eq!(found.element.selector, "#pay-v3");
    assert!(cache.find_adapted(URL, "#checkout").is_none());
}

#[test]
fn record_attempt_on_unknown_key_is_ignored() {
    let mut cache = AdaptiveCache::default();
    assert!(!cache.record_attempt("nope", AdaptationAttempt::failed(1, "#x")));
    assert!(cache.is_empty());
}

#[test]
fn clear_empties_the_cache() {
    let mut cache = AdaptiveCache::default();
    cache.put(URL, element("#a", None));
    cache.put(URL, element("#b", None));
    assert_eq!(cache.len(), 2);

    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn snapshot_serializes_camel_case() {
    let mut cache = AdaptiveCache::default();
    let key = cache.put_at(URL, adapted("#pay-v2", "#pay"), 42);
    let json = serde_json::to_value(cache.get(&key).unwrap()).unwrap();

    assert_eq!(json["pageUrl"], URL);
    assert_eq!(json["timestamp"], 42);
    assert_eq!(json["element"]["type"], "button");
    assert_eq!(json["element"]["metadata"]["adaptedFrom"], "#pay");
    assert_eq!(
        json["element"]["metadata"]["adaptationStrategy"],
        "structural-similarity"
    );
    assert!(json["adaptationHistory"].as_array().unwrap().is_empty());
}
