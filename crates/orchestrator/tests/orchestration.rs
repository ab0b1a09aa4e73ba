//! End-to-end orchestration scenarios against scripted in-memory adapters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use generation::{
    Capabilities, ContentItem, CooldownTracker, EncodedImage, GenerationRequest, ImageMediaType,
    ImageRecognitionRequest, ManualClock, MealPlanRequest, ProviderAdapter, ProviderDescriptor,
    ProviderFailure, ProviderId, RawProviderResponse, RecoveryStage, RequestKind,
};
use orchestrator::{
    CancellationToken, OrchestrationError, Orchestrator, PriorityPolicy, ProviderRegistry,
};

const TWO_MEALS: &str = r#"Here are your meals:
```json
{"meals": [
  {"name": "Omelette", "ingredients": ["egg", "cheese"], "instructions": ["Whisk", "Fry"], "confidence": 0.9},
  {"name": "Cheese Toast", "ingredients": ["bread", "cheese"], "instructions": ["Toast"]}
]}
```"#;

const WINDOW: Duration = Duration::from_secs(300);

#[derive(Clone)]
enum Reply {
    Text(&'static str),
    Fail(ProviderFailure),
    Hang,
}

struct Scripted {
    id: ProviderId,
    reply: Reply,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ProviderAdapter for Scripted {
    async fn call(&self, _request: &GenerationRequest) -> RawProviderResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Text(text) => RawProviderResponse::text(self.id.clone(), *text),
            Reply::Fail(failure) => RawProviderResponse::failure(self.id.clone(), failure.clone()),
            Reply::Hang => std::future::pending().await,
        }
    }
}

fn id(s: &str) -> ProviderId {
    ProviderId::new(s).unwrap()
}

fn throttled() -> Reply {
    Reply::Fail(ProviderFailure::Throttled { retry_after: None })
}

fn transport() -> Reply {
    Reply::Fail(ProviderFailure::Transport {
        message: "connection reset".into(),
    })
}

fn meal_request() -> GenerationRequest {
    MealPlanRequest::new(["egg", "cheese", "bread"]).into()
}

fn image_request() -> GenerationRequest {
    let image = EncodedImage::new(ImageMediaType::Jpeg, "/9j/4AAQSkZJRg==").unwrap();
    ImageRecognitionRequest::new(image).into()
}

#[derive(Default)]
struct Harness {
    registry: ProviderRegistry,
    calls: HashMap<String, Arc<AtomicUsize>>,
}

impl Harness {
    fn provider(mut self, name: &str, reply: Reply) -> Self {
        self.add(name, Capabilities::MULTIMODAL, true, reply);
        self
    }

    fn text_only(mut self, name: &str, reply: Reply) -> Self {
        self.add(name, Capabilities::TEXT, true, reply);
        self
    }

    fn without_credentials(mut self, name: &str, reply: Reply) -> Self {
        self.add(name, Capabilities::MULTIMODAL, false, reply);
        self
    }

    fn add(&mut self, name: &str, caps: Capabilities, creds: bool, reply: Reply) {
        let calls = Arc::new(AtomicUsize::new(0));
        self.calls.insert(name.to_owned(), calls.clone());
        let descriptor = ProviderDescriptor::new(id(name), name, caps).with_credentials(creds);
        let adapter = Scripted {
            id: id(name),
            reply,
            calls,
        };
        self.registry.register(descriptor, Arc::new(adapter)).unwrap();
    }

    fn build(self, tracker: Arc<CooldownTracker>) -> (Orchestrator, Calls) {
        let orchestrator = Orchestrator::new(self.registry, tracker, PriorityPolicy::new());
        (orchestrator, Calls(self.calls))
    }

    fn build_default(self) -> (Orchestrator, Calls) {
        self.build(Arc::new(CooldownTracker::new(WINDOW)))
    }
}

struct Calls(HashMap<String, Arc<AtomicUsize>>);

impl Calls {
    fn of(&self, name: &str) -> usize {
        self.0[name].load(Ordering::SeqCst)
    }
}

fn manual_tracker() -> (Arc<CooldownTracker>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let tracker = Arc::new(CooldownTracker::with_clock(WINDOW, clock.clone()));
    (tracker, clock)
}

// ---------------------------------------------------------------------------
// Sequential runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_eligible_provider_wins_with_strict_parse() {
    let (o, calls) = Harness::default()
        .provider("p1", Reply::Text(TWO_MEALS))
        .provider("p2", Reply::Text(TWO_MEALS))
        .build_default();

    let result = o.generate(&meal_request(), None).await.unwrap();

    assert_eq!(result.stage(), RecoveryStage::StrictParse);
    assert_eq!(result.provider(), Some(&id("p1")));
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].name(), "Omelette");
    assert_eq!(calls.of("p2"), 0);
}

#[tokio::test]
async fn throttled_provider_is_marked_and_next_one_used() {
    let (o, calls) = Harness::default()
        .provider("p1", throttled())
        .provider("p2", Reply::Text(TWO_MEALS))
        .build_default();

    let result = o.generate(&meal_request(), None).await.unwrap();

    assert_eq!(result.provider(), Some(&id("p2")));
    assert_eq!(calls.of("p1"), 1);
    let status = o.status();
    assert_eq!(status.rate_limited.len(), 1);
    assert_eq!(status.rate_limited[0].provider, id("p1"));
    assert!(status.rate_limited[0].remaining > Duration::ZERO);
    assert_eq!(status.available, vec![id("p2")]);
}

#[tokio::test]
async fn missing_credentials_fail_without_network_calls() {
    let (o, calls) = Harness::default()
        .without_credentials("p1", Reply::Text(TWO_MEALS))
        .build_default();

    let err = o.generate(&meal_request(), None).await.unwrap_err();

    assert_eq!(
        err,
        OrchestrationError::NoCredentials {
            kind: RequestKind::ContentGeneration
        }
    );
    assert_eq!(calls.of("p1"), 0);
}

#[tokio::test]
async fn pseudo_json_is_sanitized() {
    let (o, _calls) = Harness::default()
        .provider("p1", Reply::Text("Sure! {name: 'Soup', ingredients: ['a','b']}"))
        .build_default();

    let result = o.generate(&meal_request(), None).await.unwrap();

    assert_eq!(result.stage(), RecoveryStage::SanitizedParse);
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].name(), "Soup");
}

#[tokio::test]
async fn trailing_commas_never_report_strict_parse() {
    let (o, _calls) = Harness::default()
        .provider(
            "p1",
            Reply::Text(r#"{"meals": [{"name": "Soup", "ingredients": ["a",],},]}"#),
        )
        .build_default();

    let result = o.generate(&meal_request(), None).await.unwrap();

    assert!(result.stage() >= RecoveryStage::SanitizedParse);
}

#[tokio::test]
async fn provider_in_cooldown_is_never_called() {
    let (o, calls) = Harness::default()
        .provider("p1", Reply::Text(TWO_MEALS))
        .provider("p2", Reply::Text(TWO_MEALS))
        .build_default();
    o.tracker().mark_throttled(&id("p1"));

    let result = o.generate(&meal_request(), None).await.unwrap();

    assert_eq!(result.provider(), Some(&id("p2")));
    assert_eq!(calls.of("p1"), 0);
}

#[tokio::test]
async fn all_in_cooldown_reports_minimum_wait() {
    let (tracker, clock) = manual_tracker();
    let (o, calls) = Harness::default()
        .provider("p1", Reply::Text(TWO_MEALS))
        .provider("p2", Reply::Text(TWO_MEALS))
        .build(tracker);
    o.tracker().mark_throttled(&id("p1"));
    clock.advance(Duration::from_secs(100));
    o.tracker().mark_throttled(&id("p2"));

    let err = o.generate(&meal_request(), None).await.unwrap_err();

    assert_eq!(err.retry_after(), Some(Duration::from_secs(200)));
    assert_eq!(calls.of("p1") + calls.of("p2"), 0);
}

#[tokio::test]
async fn providers_throttling_during_the_run_report_rate_limited() {
    let (o, calls) = Harness::default()
        .provider("p1", throttled())
        .provider("p2", throttled())
        .build_default();

    let err = o.generate(&meal_request(), None).await.unwrap_err();

    assert!(matches!(err, OrchestrationError::AllRateLimited { .. }));
    assert!(err.retry_after().unwrap() > Duration::ZERO);
    assert_eq!(calls.of("p1"), 1);
    assert_eq!(calls.of("p2"), 1);

    // A second run skips both without calling them.
    let again = o.generate(&meal_request(), None).await.unwrap_err();
    assert_eq!(again.class(), "all-rate-limited");
    assert_eq!(calls.of("p1"), 1);
}

#[tokio::test]
async fn cooldown_expires_after_window() {
    let (tracker, clock) = manual_tracker();
    let (o, calls) = Harness::default()
        .provider("p1", Reply::Text(TWO_MEALS))
        .build(tracker);
    o.tracker().mark_throttled(&id("p1"));

    clock.advance(WINDOW - Duration::from_millis(1));
    assert!(o.generate(&meal_request(), None).await.is_err());
    assert_eq!(calls.of("p1"), 0);

    clock.advance(Duration::from_millis(1));
    assert!(o.generate(&meal_request(), None).await.is_ok());
    assert_eq!(calls.of("p1"), 1);
}

#[tokio::test]
async fn unrecoverable_responses_are_not_empty_successes() {
    let (o, _calls) = Harness::default()
        .provider("p1", Reply::Text("I cannot help with that."))
        .provider("p2", Reply::Text("Sorry, no."))
        .build_default();

    let err = o.generate(&meal_request(), None).await.unwrap_err();

    match err {
        OrchestrationError::UnrecoverableResponse { attempts } => assert_eq!(attempts.len(), 2),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn mixed_failures_report_all_failed() {
    let (o, _calls) = Harness::default()
        .provider("p1", transport())
        .provider("p2", Reply::Text("no structure here"))
        .provider(
            "p3",
            Reply::Fail(ProviderFailure::Auth {
                message: "bad key".into(),
            }),
        )
        .build_default();

    let err = o.generate(&meal_request(), None).await.unwrap_err();

    match err {
        OrchestrationError::AllFailed { attempts } => {
            let order: Vec<String> = attempts.iter().map(|a| a.provider.to_string()).collect();
            assert_eq!(order, vec!["p1", "p2", "p3"]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn parseable_empty_result_is_success() {
    let (o, _calls) = Harness::default()
        .provider("p1", Reply::Text(r#"{"ingredients": []}"#))
        .build_default();

    let result = o.generate(&image_request(), None).await.unwrap();

    assert!(result.is_empty());
    assert_eq!(result.stage(), RecoveryStage::StrictParse);
}

// ---------------------------------------------------------------------------
// Preferred provider
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preferred_provider_is_tried_first() {
    let (o, calls) = Harness::default()
        .provider("p1", Reply::Text(TWO_MEALS))
        .provider("p2", Reply::Text(TWO_MEALS))
        .build_default();

    let result = o.generate(&meal_request(), Some(&id("p2"))).await.unwrap();

    assert_eq!(result.provider(), Some(&id("p2")));
    assert_eq!(calls.of("p1"), 0);
}

#[tokio::test]
async fn failing_preferred_provider_falls_back_to_default_order() {
    let (o, calls) = Harness::default()
        .provider("p1", Reply::Text(TWO_MEALS))
        .provider("p2", transport())
        .build_default();

    let result = o.generate(&meal_request(), Some(&id("p2"))).await.unwrap();

    assert_eq!(result.provider(), Some(&id("p1")));
    assert_eq!(calls.of("p2"), 1);
}

#[tokio::test]
async fn throttled_preferred_provider_is_skipped_without_penalty() {
    let (o, calls) = Harness::default()
        .provider("p1", Reply::Text(TWO_MEALS))
        .provider("p2", Reply::Text(TWO_MEALS))
        .build_default();
    o.tracker().mark_throttled(&id("p2"));

    let result = o.generate(&meal_request(), Some(&id("p2"))).await.unwrap();

    assert_eq!(result.provider(), Some(&id("p1")));
    assert_eq!(calls.of("p2"), 0);
}

#[tokio::test]
async fn unknown_preferred_provider_is_ignored() {
    let (o, _calls) = Harness::default()
        .provider("p1", Reply::Text(TWO_MEALS))
        .build_default();

    let result = o.generate(&meal_request(), Some(&id("nope"))).await.unwrap();

    assert_eq!(result.provider(), Some(&id("p1")));
}

// ---------------------------------------------------------------------------
// Capabilities and isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn image_requests_only_reach_multimodal_providers() {
    let (o, calls) = Harness::default()
        .text_only("text", Reply::Text(r#"[{"name": "Apple"}]"#))
        .provider("vision", Reply::Text(r#"[{"name": "Apple"}]"#))
        .build_default();

    let result = o.generate(&image_request(), None).await.unwrap();

    assert_eq!(result.provider(), Some(&id("vision")));
    assert_eq!(calls.of("text"), 0);
}

#[tokio::test]
async fn separate_trackers_do_not_share_cooldowns() {
    let (first, _) = Harness::default()
        .provider("p1", throttled())
        .build_default();
    let (second, calls) = Harness::default()
        .provider("p1", Reply::Text(TWO_MEALS))
        .build_default();

    assert!(first.generate(&meal_request(), None).await.is_err());
    assert!(second.generate(&meal_request(), None).await.is_ok());
    assert_eq!(calls.of("p1"), 1);
}

#[tokio::test]
async fn shared_tracker_is_visible_to_both_orchestrators() {
    let tracker = Arc::new(CooldownTracker::new(WINDOW));
    let (first, _) = Harness::default()
        .provider("p1", throttled())
        .build(tracker.clone());
    let (second, calls) = Harness::default()
        .provider("p1", Reply::Text(TWO_MEALS))
        .build(tracker);

    assert!(first.generate(&meal_request(), None).await.is_err());
    let err = second.generate(&meal_request(), None).await.unwrap_err();
    assert_eq!(err.class(), "all-rate-limited");
    assert_eq!(calls.of("p1"), 0);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancellation_aborts_in_flight_call() {
    let (o, calls) = Harness::default()
        .provider("slow", Reply::Hang)
        .provider("p2", Reply::Text(TWO_MEALS))
        .build_default();
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        o.generate_with_cancel(&meal_request(), None, &token),
    )
    .await
    .expect("run should stop once cancelled")
    .unwrap_err();

    assert_eq!(err, OrchestrationError::Cancelled);
    assert_eq!(calls.of("slow"), 1);
    assert_eq!(calls.of("p2"), 0);
}

#[tokio::test]
async fn cancelled_token_stops_before_any_call() {
    let (o, calls) = Harness::default()
        .provider("p1", Reply::Text(TWO_MEALS))
        .build_default();
    let token = CancellationToken::new();
    token.cancel();

    let err = o
        .generate_with_cancel(&meal_request(), None, &token)
        .await
        .unwrap_err();

    assert_eq!(err.class(), "cancelled");
    assert_eq!(calls.of("p1"), 0);
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cross_validation_merges_agreeing_providers() {
    let (o, calls) = Harness::default()
        .provider(
            "a",
            Reply::Text(r#"[{"name": "Tomato", "category": "vegetable", "confidence": 0.8}, {"name": "Kiwi"}]"#),
        )
        .provider(
            "b",
            Reply::Text(r#"{"ingredients": [{"name": "tomato", "category": "fruit", "confidence": 0.6}]}"#),
        )
        .provider(
            "c",
            Reply::Text(r#"{ingredients: [{name: 'TOMATO', category: 'vegetable', confidence: 1.0}]}"#),
        )
        .provider("d", Reply::Text(r#"[{"name": "Plum"}]"#))
        .build_default();

    let merged = o
        .cross_validate(&image_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(calls.of("d"), 0);
    assert_eq!(merged.sources, 3);
    assert_eq!(merged.items.len(), 1);
    assert_eq!(merged.items[0].reported_by, 3);
    match &merged.items[0].item {
        ContentItem::Ingredient(tomato) => {
            assert_eq!(tomato.name, "Tomato");
            assert_eq!(tomato.category, "vegetable");
            assert!((tomato.confidence.as_f64() - 0.8).abs() < 1e-9);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(merged.stage, Some(RecoveryStage::SanitizedParse));
}

#[tokio::test]
async fn cross_validation_marks_throttled_sources() {
    let (o, _calls) = Harness::default()
        .provider("a", throttled())
        .provider("b", Reply::Text(r#"[{"name": "Egg"}]"#))
        .build_default();

    let merged = o
        .cross_validate(&image_request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(merged.sources, 1);
    assert_eq!(merged.providers, vec![id("b")]);
    assert!(!o.tracker().is_eligible(&id("a")));
}

#[tokio::test]
async fn cross_validation_without_successes_uses_failure_taxonomy() {
    let (o, _calls) = Harness::default()
        .provider("a", transport())
        .provider("b", Reply::Text("nothing useful"))
        .build_default();

    let err = o
        .cross_validate(&image_request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.class(), "all-failed");
}

#[tokio::test]
async fn cross_validation_can_be_cancelled() {
    let (o, _calls) = Harness::default()
        .provider("a", Reply::Hang)
        .provider("b", Reply::Text(r#"[{"name": "Egg"}]"#))
        .build_default();
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), o.cross_validate(&image_request(), &token))
        .await
        .expect("run should stop once cancelled")
        .unwrap_err();

    assert_eq!(err, OrchestrationError::Cancelled);
}
