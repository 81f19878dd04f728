#![forbid(unsafe_code)]

//! Log policy checks for the mount runtime.
//!
//! Verifies that each failure class is logged at its documented level and
//! target, with structured fields:
//! - `Conflict` at WARN on `dualmount.registry`
//! - `Stale` at DEBUG
//! - `TransitionTimeout` at WARN on `dualmount.bootstrap`
//! - `ConsistencyViolation` at ERROR, whether refused by the registry or
//!   detected when a transition resolves
//! - notification fan-out inside a `dualmount.notify` span
//!
//! Run:
//!   cargo test -p dualmount-runtime --test tracing_events

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dualmount_runtime::{
    AnchorId, BootstrapConfig, DualMountBootstrap, MountBinding, MountRegistry, OwnerRef,
    YieldPolicy,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use web_time::{Duration, Instant};

// ============================================================================
// Test Infrastructure
// ============================================================================

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: tracing::Level,
    target: String,
    fields: HashMap<String, String>,
    parent_span_name: Option<String>,
}

impl CapturedEvent {
    fn message(&self) -> &str {
        self.fields.get("message").map_or("", String::as_str)
    }
}

struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl<S> tracing_subscriber::Layer<S> for EventCapture
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor(Vec::new());
        event.record(&mut visitor);

        let parent_span_name = ctx
            .current_span()
            .id()
            .and_then(|id| ctx.span(id))
            .map(|span_ref| span_ref.name().to_string());

        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            fields: visitor.0.into_iter().collect(),
            parent_span_name,
        });
    }
}

fn with_captured_events<F>(f: F) -> Vec<CapturedEvent>
where
    F: FnOnce(),
{
    let events = Arc::new(Mutex::new(Vec::new()));
    let layer = EventCapture {
        events: Arc::clone(&events),
    };
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::TRACE)
        .with(layer);
    tracing::subscriber::with_default(subscriber, f);
    let captured = events.lock().unwrap().clone();
    captured
}

fn find<'a>(events: &'a [CapturedEvent], message: &str) -> Vec<&'a CapturedEvent> {
    events.iter().filter(|e| e.message() == message).collect()
}

// ============================================================================
// Level and target policy
// ============================================================================

#[test]
fn conflict_is_logged_at_warn_with_fields() {
    let events = with_captured_events(|| {
        let registry = MountRegistry::with_strict(true);
        registry.register(AnchorId::TOP_BAR, true).unwrap();
        registry.claim(&AnchorId::TOP_BAR, &OwnerRef::Legacy).unwrap();
        let _ = registry.claim(&AnchorId::TOP_BAR, &OwnerRef::NextGen);
    });

    let refused = find(&events, "claim refused");
    assert_eq!(refused.len(), 1);
    let event = refused[0];
    assert_eq!(event.level, tracing::Level::WARN);
    assert_eq!(event.target, "dualmount.registry");
    assert_eq!(event.fields["anchor"], "top-bar");
    assert_eq!(event.fields["owner"], "nextgen");
    assert!(event.fields["error"].contains("held by legacy"));
}

#[test]
fn stale_release_is_logged_at_debug() {
    let events = with_captured_events(|| {
        let registry = MountRegistry::with_strict(true);
        registry.register(AnchorId::FAB, true).unwrap();
        registry.claim(&AnchorId::FAB, &OwnerRef::Legacy).unwrap();
        let _ = registry.release(&AnchorId::FAB, &OwnerRef::Legacy, 0);
    });

    let stale = find(&events, "stale release ignored");
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].level, tracing::Level::DEBUG);
    assert!(
        events
            .iter()
            .all(|e| e.level != tracing::Level::WARN && e.level != tracing::Level::ERROR),
        "a stale release must not be reported as a problem"
    );
}

#[test]
fn cutover_timeout_is_logged_at_warn_on_bootstrap_target() {
    let events = with_captured_events(|| {
        let boot =
            DualMountBootstrap::new(BootstrapConfig::default().with_strict_anchors(true)).unwrap();
        let t0 = Instant::now();
        let _legacy = MountBinding::activate_with(
            boot.registry(),
            AnchorId::FAB,
            OwnerRef::Legacy,
            YieldPolicy::Manual,
        )
        .unwrap();
        boot.request_cutover(&AnchorId::FAB, OwnerRef::NextGen, t0)
            .unwrap();
        boot.tick(t0 + Duration::from_millis(500));
    });

    let timeouts = find(&events, "cutover timed out, forcing release");
    assert_eq!(timeouts.len(), 1);
    assert_eq!(timeouts[0].level, tracing::Level::WARN);
    assert_eq!(timeouts[0].target, "dualmount.bootstrap");
    assert_eq!(
        timeouts[0].fields["error"],
        "anchor fab not released by legacy within 500ms"
    );

    let forced = find(&events, "anchor forcibly released");
    assert_eq!(forced.len(), 1);
    assert_eq!(forced[0].fields["evicted"], "legacy");
}

#[test]
fn consistency_violation_is_logged_at_error() {
    let events = with_captured_events(|| {
        let boot =
            DualMountBootstrap::new(BootstrapConfig::default().with_strict_anchors(true)).unwrap();
        let bindings: Vec<_> = [AnchorId::BOTTOM_NAV, AnchorId::FAB, AnchorId::TOP_BAR]
            .into_iter()
            .map(|id| MountBinding::activate(boot.registry(), id, OwnerRef::Legacy).unwrap())
            .collect();
        assert!(boot.is_ready());
        drop(bindings);
    });

    let violations = find(&events, "required anchor released after ready");
    assert_eq!(violations.len(), 3);
    assert!(violations.iter().all(|e| e.level == tracing::Level::ERROR));
    assert!(violations.iter().all(|e| e.target == "dualmount.registry"));
}

#[test]
fn unowned_required_anchor_after_cutover_is_logged_at_error() {
    let events = with_captured_events(|| {
        let boot =
            DualMountBootstrap::new(BootstrapConfig::default().with_strict_anchors(true)).unwrap();
        let t0 = Instant::now();
        let _bindings: Vec<_> = [AnchorId::BOTTOM_NAV, AnchorId::FAB, AnchorId::TOP_BAR]
            .into_iter()
            .map(|id| MountBinding::activate(boot.registry(), id, OwnerRef::Legacy).unwrap())
            .collect();
        boot.request_cutover(&AnchorId::FAB, OwnerRef::NextGen, t0)
            .unwrap();
        boot.tick(t0 + Duration::from_millis(500));
        boot.shutdown();
    });

    let unowned = find(&events, "required anchor left unowned after transition");
    assert_eq!(unowned.len(), 1);
    assert_eq!(unowned[0].level, tracing::Level::ERROR);
    assert_eq!(unowned[0].target, "dualmount.bootstrap");
    assert_eq!(unowned[0].fields["anchor"], "fab");
}

#[test]
fn bootstrap_reports_ready_once() {
    let events = with_captured_events(|| {
        let boot =
            DualMountBootstrap::new(BootstrapConfig::default().with_strict_anchors(true)).unwrap();
        let _bindings: Vec<_> = [AnchorId::BOTTOM_NAV, AnchorId::FAB, AnchorId::TOP_BAR]
            .into_iter()
            .map(|id| MountBinding::activate(boot.registry(), id, OwnerRef::Legacy).unwrap())
            .collect();
        boot.poll_ready().unwrap();
        boot.shutdown();
    });

    let ready = find(&events, "shell ready");
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].level, tracing::Level::INFO);
    assert_eq!(ready[0].fields["claimed"], "3");
    assert_eq!(find(&events, "registry sealed").len(), 1);
    assert_eq!(find(&events, "registry unsealed").len(), 1);
}

#[test]
fn fan_out_runs_inside_notify_span() {
    let events = with_captured_events(|| {
        let boot =
            DualMountBootstrap::new(BootstrapConfig::default().with_strict_anchors(true)).unwrap();
        let _binding =
            MountBinding::activate(boot.registry(), AnchorId::FAB, OwnerRef::Legacy).unwrap();
        boot.begin_transition(&AnchorId::FAB, Instant::now()).unwrap();
    });

    // The binding's yield happens while the transition is being delivered.
    let yielded = find(&events, "yielded anchor");
    assert_eq!(yielded.len(), 1);
    assert_eq!(yielded[0].target, "dualmount.binding");
    assert_eq!(yielded[0].parent_span_name.as_deref(), Some("dualmount.notify"));

    let propagated = find(&events, "change propagated");
    assert!(!propagated.is_empty());
    assert!(propagated.iter().all(|e| e.target == "dualmount.reactive"));
}
