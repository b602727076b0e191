//! Integration tests for the mediation pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cf_common::{Envelope, Node, PathExpr};
use cf_mediation::{
    mediate_children, CloneMediator, CloneTarget, DropMediator, FaultMediator, FilterMediator,
    FilterPredicate, IterateMediator, LogMediator, MediationConfig, MediationError,
    MediatorWorker, MessageContext, PropertyMediator, PropertyScope, SequenceKey,
    SequenceMediator, SwitchCase, SwitchMediator, MESSAGE_SEQUENCE_PROPERTY,
};
use cf_mediation::{Mediator, Result};
use serde_json::json;

/// Records its label on every invocation and returns a fixed result.
struct Probe {
    label: &'static str,
    result: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    fn new(label: &'static str, result: bool, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            label,
            result,
            log: log.clone(),
        }
    }
}

impl Mediator for Probe {
    fn mediate(&self, _ctx: &mut MessageContext) -> Result<bool> {
        self.log.lock().unwrap().push(self.label.to_string());
        Ok(self.result)
    }
}

/// Always fails with a mediation error.
struct FailingMediator;

impl Mediator for FailingMediator {
    fn mediate(&self, _ctx: &mut MessageContext) -> Result<bool> {
        Err(MediationError::Mediation("boom".to_string()))
    }
}

/// Counts init/destroy cascades.
#[derive(Default)]
struct LifecycleProbe {
    inits: AtomicUsize,
    destroys: AtomicUsize,
}

impl Mediator for LifecycleProbe {
    fn mediate(&self, _ctx: &mut MessageContext) -> Result<bool> {
        Ok(true)
    }

    fn init(&self, _config: &MediationConfig) {
        self.inits.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

/// Appends a tag node to the branch envelope and records how many tags it
/// observed (its own included).
struct TaggingMediator {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Mediator for TaggingMediator {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool> {
        ctx.envelope_mut()
            .body_mut()
            .push_child(Node::with_text("tag", self.label));
        let seen = PathExpr::parse("tag").select(ctx.envelope().body()).len();
        let position = ctx
            .get_property(PropertyScope::Default, MESSAGE_SEQUENCE_PROPERTY)
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string();
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", self.label, seen, position));
        Ok(true)
    }
}

/// Route pipeline logs through the test harness; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

fn empty_config() -> Arc<MediationConfig> {
    init_tracing();
    MediationConfig::builder()
        .main(SequenceMediator::anonymous())
        .build()
        .unwrap()
}

fn context_with(envelope: Envelope) -> MessageContext {
    MessageContext::new(envelope, empty_config())
}

fn order_envelope() -> Envelope {
    Envelope::with_body(
        Node::new("body").child(
            Node::new("orders")
                .child(Node::with_text("order", "o1"))
                .child(Node::with_text("order", "o2"))
                .child(Node::with_text("order", "o3")),
        ),
    )
}

fn tier_envelope(tier: &str) -> Envelope {
    Envelope::with_body(Node::new("body").child(Node::with_text("tier", tier)))
}

// ----------------------------------------------------------------------
// P1: list short-circuit
// ----------------------------------------------------------------------

#[test]
fn list_mediator_short_circuits_on_false() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let children: Vec<Arc<dyn Mediator>> = vec![
        Arc::new(Probe::new("c1", true, &log)),
        Arc::new(Probe::new("c2", false, &log)),
        Arc::new(Probe::new("c3", true, &log)),
    ];

    let mut ctx = context_with(Envelope::new());
    let result = mediate_children(&children, &mut ctx).unwrap();

    assert!(!result);
    assert_eq!(*log.lock().unwrap(), vec!["c1", "c2"]);
}

// ----------------------------------------------------------------------
// P2: filter asymmetry
// ----------------------------------------------------------------------

#[test]
fn filter_false_predicate_continues_pipeline() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let filter = FilterMediator::new(
        FilterPredicate::matches(PathExpr::parse("tier"), "gold").unwrap(),
    )
    .child(Probe::new("child", true, &log));

    let mut ctx = context_with(tier_envelope("silver"));
    assert!(filter.mediate(&mut ctx).unwrap());
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn filter_true_predicate_returns_child_result() {
    let filter = FilterMediator::new(
        FilterPredicate::matches(PathExpr::parse("tier"), "gold").unwrap(),
    )
    .child(DropMediator);

    let mut ctx = context_with(tier_envelope("gold"));
    assert!(!filter.mediate(&mut ctx).unwrap());
}

#[test]
fn filter_pattern_is_full_match_not_substring() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let filter = FilterMediator::new(
        FilterPredicate::matches(PathExpr::parse("tier"), "gold").unwrap(),
    )
    .child(Probe::new("child", true, &log));

    // "goldfish" contains "gold" but does not conform to it.
    let mut ctx = context_with(tier_envelope("goldfish"));
    assert!(filter.mediate(&mut ctx).unwrap());
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn filter_missing_source_is_false_not_error() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let filter = FilterMediator::new(
        FilterPredicate::matches(PathExpr::parse("absent"), ".*").unwrap(),
    )
    .child(Probe::new("child", true, &log));

    let mut ctx = context_with(tier_envelope("gold"));
    assert!(filter.mediate(&mut ctx).unwrap());
    assert!(log.lock().unwrap().is_empty());
}

// ----------------------------------------------------------------------
// P3 / P4: switch dispatch
// ----------------------------------------------------------------------

#[test]
fn switch_executes_first_matching_case_only() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let switch = SwitchMediator::new(PathExpr::parse("tier"))
        .case(SwitchCase::new("silver", Arc::new(Probe::new("seq_a", true, &log))).unwrap())
        .case(SwitchCase::new("gold", Arc::new(Probe::new("seq_b", false, &log))).unwrap())
        .case(SwitchCase::new("go.*", Arc::new(Probe::new("seq_c", true, &log))).unwrap());

    let mut ctx = context_with(tier_envelope("gold"));
    let result = switch.mediate(&mut ctx).unwrap();

    // seq_b wins even though seq_c's pattern also matches, and its result is
    // returned unchanged.
    assert!(!result);
    assert_eq!(*log.lock().unwrap(), vec!["seq_b"]);
}

#[test]
fn switch_falls_back_to_default() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let switch = SwitchMediator::new(PathExpr::parse("tier"))
        .case(SwitchCase::new("silver", Arc::new(Probe::new("seq_a", true, &log))).unwrap())
        .default_case(Arc::new(Probe::new("default", true, &log)));

    let mut ctx = context_with(tier_envelope("bronze"));
    assert!(switch.mediate(&mut ctx).unwrap());
    assert_eq!(*log.lock().unwrap(), vec!["default"]);
}

#[test]
fn switch_without_match_or_default_is_noop_continue() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let switch = SwitchMediator::new(PathExpr::parse("tier"))
        .case(SwitchCase::new("silver", Arc::new(Probe::new("seq_a", true, &log))).unwrap());

    let mut ctx = context_with(tier_envelope("bronze"));
    assert!(switch.mediate(&mut ctx).unwrap());
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn switch_null_source_with_empty_cases_jumps_to_default() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let switch = SwitchMediator::new(PathExpr::parse("absent"))
        .default_case(Arc::new(Probe::new("default", true, &log)));

    let mut ctx = context_with(tier_envelope("gold"));
    assert!(switch.mediate(&mut ctx).unwrap());
    assert_eq!(*log.lock().unwrap(), vec!["default"]);
}

#[test]
fn switch_null_source_with_cases_still_reaches_default() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let switch = SwitchMediator::new(PathExpr::parse("absent"))
        .case(SwitchCase::new(".*", Arc::new(Probe::new("seq_a", true, &log))).unwrap())
        .default_case(Arc::new(Probe::new("default", true, &log)));

    // A null source matches no case, even ".*"; the default still runs via
    // the ordinary fallback path.
    let mut ctx = context_with(tier_envelope("gold"));
    assert!(switch.mediate(&mut ctx).unwrap());
    assert_eq!(*log.lock().unwrap(), vec!["default"]);
}

// ----------------------------------------------------------------------
// P5: clone independence
// ----------------------------------------------------------------------

#[test]
fn clone_branches_are_independent() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let clone = CloneMediator::new(true)
        .target(CloneTarget::new(Arc::new(TaggingMediator {
            label: "t1",
            log: log.clone(),
        })))
        .target(CloneTarget::new(Arc::new(TaggingMediator {
            label: "t2",
            log: log.clone(),
        })));

    let mut ctx = context_with(Envelope::new());
    assert!(clone.mediate(&mut ctx).unwrap());

    // Each branch saw only its own tag, with its own position metadata.
    assert_eq!(*log.lock().unwrap(), vec!["t1:1:1/2", "t2:1:2/2"]);
    // The parent envelope was never touched.
    assert!(!PathExpr::parse("tag").exists(ctx.envelope().body()));
    assert!(ctx
        .get_property(PropertyScope::Default, MESSAGE_SEQUENCE_PROPERTY)
        .is_none());
}

#[test]
fn clone_returns_continue_parent_flag_regardless_of_children() {
    let clone = CloneMediator::new(false)
        .target(CloneTarget::new(Arc::new(DropMediator)))
        .target(CloneTarget::new(Arc::new(FailingMediator)));

    let mut ctx = context_with(Envelope::new());
    assert!(!clone.mediate(&mut ctx).unwrap());
}

#[test]
fn clone_branch_failure_does_not_abort_siblings() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let clone = CloneMediator::new(true)
        .target(CloneTarget::new(Arc::new(FailingMediator)))
        .target(CloneTarget::new(Arc::new(Probe::new("after", true, &log))));

    let mut ctx = context_with(Envelope::new());
    assert!(clone.mediate(&mut ctx).unwrap());
    assert_eq!(*log.lock().unwrap(), vec!["after"]);
}

// ----------------------------------------------------------------------
// P6: iterate detachment
// ----------------------------------------------------------------------

/// Records the order nodes visible in each iterated branch.
struct OrderCollector {
    log: Arc<Mutex<Vec<String>>>,
}

impl Mediator for OrderCollector {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool> {
        let orders = PathExpr::parse("order").select(ctx.envelope().body());
        let texts: Vec<&str> = orders.iter().map(|n| n.text_value()).collect();
        self.log.lock().unwrap().push(texts.join(","));
        Ok(true)
    }
}

#[test]
fn iterate_produces_one_context_per_match() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let iterate = IterateMediator::new(
        PathExpr::parse("orders/order"),
        Arc::new(OrderCollector { log: log.clone() }),
    );

    let mut ctx = context_with(order_envelope());
    assert!(iterate.mediate(&mut ctx).unwrap());

    // Exactly one matched node per branch, in document order.
    assert_eq!(*log.lock().unwrap(), vec!["o1", "o2", "o3"]);
    // The parent's own envelope is untouched.
    assert_eq!(
        PathExpr::parse("orders/order").select(ctx.envelope().body()).len(),
        3
    );
}

/// Records whether the preserved template content is present in the branch.
struct TemplateInspector {
    log: Arc<Mutex<Vec<String>>>,
}

impl Mediator for TemplateInspector {
    fn mediate(&self, ctx: &mut MessageContext) -> Result<bool> {
        let note = PathExpr::parse("orders/note").exists(ctx.envelope().body());
        let orders = PathExpr::parse("orders/order").select(ctx.envelope().body()).len();
        self.log.lock().unwrap().push(format!("note={} orders={}", note, orders));
        Ok(true)
    }
}

#[test]
fn iterate_preserve_payload_keeps_template_without_matches() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let envelope = Envelope::with_body(
        Node::new("body").child(
            Node::new("orders")
                .child(Node::with_text("order", "o1"))
                .child(Node::with_text("order", "o2"))
                .child(Node::with_text("note", "rush")),
        ),
    );

    let iterate = IterateMediator::new(
        PathExpr::parse("orders/order"),
        Arc::new(TemplateInspector { log: log.clone() }),
    )
    .preserve_payload(true)
    .attach_path(PathExpr::parse("orders"));

    let mut ctx = context_with(envelope);
    assert!(iterate.mediate(&mut ctx).unwrap());

    // Template kept the note but the matched orders were detached from it;
    // each branch then got exactly one order attached back.
    assert_eq!(
        *log.lock().unwrap(),
        vec!["note=true orders=1", "note=true orders=1"]
    );
}

#[test]
fn iterate_rejects_non_element_results() {
    // An anonymous text node caught by a wildcard split is a runtime error.
    let envelope = Envelope::with_body(
        Node::new("body").child(
            Node::new("items")
                .child(Node::with_text("item", "i1"))
                .child(Node {
                    name: String::new(),
                    text: Some("bare text".to_string()),
                    attributes: Default::default(),
                    children: Vec::new(),
                }),
        ),
    );

    let iterate = IterateMediator::new(PathExpr::parse("items/*"), Arc::new(DropMediator));
    let mut ctx = context_with(envelope);
    let err = iterate.mediate(&mut ctx).unwrap_err();
    assert!(matches!(err, MediationError::SplitResultNotElement(_)));
}

#[test]
fn iterate_continue_parent_false_suppresses_response() {
    let iterate = IterateMediator::new(
        PathExpr::parse("orders/order"),
        Arc::new(DropMediator),
    )
    .continue_parent(false);

    let mut ctx = context_with(order_envelope());
    assert!(!iterate.mediate(&mut ctx).unwrap());
    assert!(ctx.is_response_suppressed());
}

// ----------------------------------------------------------------------
// P7: sequence init idempotence
// ----------------------------------------------------------------------

#[test]
fn sequence_init_and_destroy_run_once() {
    let probe = Arc::new(LifecycleProbe::default());
    let sequence = SequenceMediator::anonymous().child_arc(probe.clone());
    let config = empty_config();

    sequence.init(&config);
    sequence.init(&config);
    assert_eq!(probe.inits.load(Ordering::SeqCst), 1);

    sequence.destroy();
    sequence.destroy();
    assert_eq!(probe.destroys.load(Ordering::SeqCst), 1);

    // A full cycle may run again after teardown.
    sequence.init(&config);
    assert_eq!(probe.inits.load(Ordering::SeqCst), 2);
}

// ----------------------------------------------------------------------
// Fault-handler stack
// ----------------------------------------------------------------------

#[test]
fn error_handler_recovers_child_failure() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let config = MediationConfig::builder()
        .sequence(
            SequenceMediator::named("on_error").child(Probe::new("handler", true, &log)),
        )
        .unwrap()
        .main(
            SequenceMediator::anonymous()
                .error_handler("on_error")
                .child(Probe::new("before", true, &log))
                .child(FailingMediator)
                .child(Probe::new("after", true, &log)),
        )
        .build()
        .unwrap();

    let mut ctx = MessageContext::new(Envelope::new(), config.clone());
    let result = config.main_sequence().mediate(&mut ctx).unwrap();

    // The handler ran, the failing child stopped the list, and the consumed
    // handler was not popped twice.
    assert!(!result);
    assert_eq!(*log.lock().unwrap(), vec!["before", "handler"]);
    assert_eq!(ctx.fault_stack_depth(), 0);
}

#[test]
fn handler_is_popped_after_clean_completion() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let config = MediationConfig::builder()
        .sequence(
            SequenceMediator::named("on_error").child(Probe::new("handler", true, &log)),
        )
        .unwrap()
        .main(
            SequenceMediator::anonymous()
                .error_handler("on_error")
                .child(Probe::new("only", true, &log)),
        )
        .build()
        .unwrap();

    let mut ctx = MessageContext::new(Envelope::new(), config.clone());
    assert!(config.main_sequence().mediate(&mut ctx).unwrap());
    assert_eq!(*log.lock().unwrap(), vec!["only"]);
    assert_eq!(ctx.fault_stack_depth(), 0);
}

#[test]
fn unhandled_error_propagates_from_top_level() {
    let config = MediationConfig::builder()
        .main(SequenceMediator::anonymous().child(FailingMediator))
        .build()
        .unwrap();

    let mut ctx = MessageContext::new(Envelope::new(), config.clone());
    let err = config.main_sequence().mediate(&mut ctx).unwrap_err();
    assert!(matches!(err, MediationError::Mediation(_)));
}

#[test]
fn unresolved_error_handler_fails_config_build() {
    let result = MediationConfig::builder()
        .main(SequenceMediator::anonymous().error_handler("missing"))
        .build();
    assert!(matches!(result, Err(MediationError::Config(_))));
}

// ----------------------------------------------------------------------
// Sequence indirection
// ----------------------------------------------------------------------

#[test]
fn dynamic_key_resolves_against_registry() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let config = MediationConfig::builder()
        .sequence(SequenceMediator::named("route-a").child(Probe::new("route-a", true, &log)))
        .unwrap()
        .main(SequenceMediator::anonymous().child(SequenceMediator::reference(
            SequenceKey::Dynamic(PathExpr::parse("route")),
        )))
        .build()
        .unwrap();

    let envelope = Envelope::with_body(Node::new("body").child(Node::with_text("route", "route-a")));
    let mut ctx = MessageContext::new(envelope, config.clone());
    assert!(config.main_sequence().mediate(&mut ctx).unwrap());
    assert_eq!(*log.lock().unwrap(), vec!["route-a"]);
}

#[test]
fn unresolvable_static_key_is_sequence_not_found() {
    let config = empty_config();
    let reference =
        SequenceMediator::reference(SequenceKey::Static("nowhere".to_string()));
    let mut ctx = MessageContext::new(Envelope::new(), config);
    let err = reference.mediate(&mut ctx).unwrap_err();
    assert!(matches!(err, MediationError::SequenceNotFound(name) if name == "nowhere"));
}

// ----------------------------------------------------------------------
// Worker containment
// ----------------------------------------------------------------------

#[tokio::test]
async fn worker_contains_mediation_errors() {
    let config = empty_config();
    let ctx = MessageContext::new(Envelope::new(), config);
    let worker = MediatorWorker::with_mediator(Arc::new(FailingMediator), ctx);

    // The spawned task must complete normally even though mediation failed.
    worker.spawn().await.unwrap();
}

#[tokio::test]
async fn worker_defaults_to_main_sequence() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let config = MediationConfig::builder()
        .main(SequenceMediator::anonymous().child(Probe::new("main", true, &log)))
        .build()
        .unwrap();

    let ctx = MessageContext::new(Envelope::new(), config);
    MediatorWorker::new(ctx).spawn().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["main"]);
}

// ----------------------------------------------------------------------
// Leaf mediators
// ----------------------------------------------------------------------

#[test]
fn property_mediator_sets_and_removes() {
    let mut ctx = context_with(Envelope::new());

    let set = PropertyMediator::set(PropertyScope::Transport, "route", json!("fast-lane"));
    assert!(set.mediate(&mut ctx).unwrap());
    assert_eq!(
        ctx.get_property(PropertyScope::Transport, "route"),
        Some(&json!("fast-lane"))
    );
    // The default scope stays untouched.
    assert!(ctx.get_property(PropertyScope::Default, "route").is_none());

    let remove = PropertyMediator::remove(PropertyScope::Transport, "route");
    assert!(remove.mediate(&mut ctx).unwrap());
    assert!(ctx.get_property(PropertyScope::Transport, "route").is_none());
}

#[test]
fn fault_mediator_rewrites_body_and_flags_the_context() {
    let mut ctx = context_with(tier_envelope("gold"));
    assert!(!ctx.is_fault_response());

    let fault = FaultMediator::new("unroutable tier");
    assert!(fault.mediate(&mut ctx).unwrap());

    assert!(ctx.is_fault_response());
    // The original payload is replaced by a single fault node with the
    // configured reason.
    assert!(!PathExpr::parse("tier").exists(ctx.envelope().body()));
    assert_eq!(
        PathExpr::parse("fault/reason").select_string(ctx.envelope().body()),
        Some("unroutable tier".to_string())
    );
}

#[test]
fn log_mediator_is_a_pass_through() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let children: Vec<Arc<dyn Mediator>> = vec![
        Arc::new(LogMediator::with_message("inbound order")),
        Arc::new(Probe::new("after", true, &log)),
    ];

    let mut ctx = context_with(Envelope::new());
    assert!(mediate_children(&children, &mut ctx).unwrap());
    assert_eq!(*log.lock().unwrap(), vec!["after"]);
}

// ----------------------------------------------------------------------
// Property scoping sanity
// ----------------------------------------------------------------------

#[test]
fn properties_are_scoped() {
    let mut ctx = context_with(Envelope::new());
    ctx.set_property(PropertyScope::Default, "k", json!("default"));
    ctx.set_property(PropertyScope::Transport, "k", json!("transport"));

    assert_eq!(
        ctx.get_property(PropertyScope::Default, "k"),
        Some(&json!("default"))
    );
    assert_eq!(
        ctx.get_property(PropertyScope::Transport, "k"),
        Some(&json!("transport"))
    );
    assert!(ctx.get_property(PropertyScope::System, "k").is_none());
}
