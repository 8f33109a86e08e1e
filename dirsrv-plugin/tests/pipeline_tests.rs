use dirsrv_plugin::{
    DirectoryPlugin, HookPoint, Operation, OperationRequest, PluginOutcome, PluginPipeline,
    PluginType, PostOperationHook, PreOperationHook, PreParseHook, SubordinateHook,
    SubordinateStep,
};
use dirsrv_types::{Dn, Entry, ResultCode};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

fn add_op() -> Operation {
    Operation::new(OperationRequest::Add {
        entry: Entry::new(dn("uid=new,o=test")),
    })
}

/// Records every call into a shared journal and returns a fixed outcome.
struct Recorder {
    name: &'static str,
    journal: Arc<Mutex<Vec<String>>>,
    outcome: PluginOutcome,
}

impl Recorder {
    fn new(name: &'static str, journal: &Arc<Mutex<Vec<String>>>, outcome: PluginOutcome) -> Arc<Self> {
        Arc::new(Self {
            name,
            journal: Arc::clone(journal),
            outcome,
        })
    }

    fn record(&self, what: &str) -> PluginOutcome {
        self.journal.lock().push(format!("{}:{what}", self.name));
        self.outcome.clone()
    }
}

impl PreParseHook for Recorder {
    fn pre_parse(&self, _op: &mut Operation) -> PluginOutcome {
        self.record("pre-parse")
    }
}

impl PreOperationHook for Recorder {
    fn pre_operation(&self, _op: &mut Operation) -> PluginOutcome {
        self.record("pre-op")
    }
}

impl PostOperationHook for Recorder {
    fn post_operation(&self, _op: &Operation) -> PluginOutcome {
        self.record("post-op")
    }
}

impl SubordinateHook for Recorder {
    fn subordinate_delete(&self, op: &mut Operation, dn: &Dn) -> PluginOutcome {
        op.subordinate_changes.record_delete(dn.clone());
        self.record("sub-delete")
    }
}

impl DirectoryPlugin for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn as_pre_parse(&self) -> Option<&dyn PreParseHook> {
        Some(self)
    }

    fn as_pre_operation(&self) -> Option<&dyn PreOperationHook> {
        Some(self)
    }

    fn as_post_operation(&self) -> Option<&dyn PostOperationHook> {
        Some(self)
    }

    fn as_subordinate(&self) -> Option<&dyn SubordinateHook> {
        Some(self)
    }
}

struct Panicking;

impl PreOperationHook for Panicking {
    fn pre_operation(&self, _op: &mut Operation) -> PluginOutcome {
        panic!("boom");
    }
}

impl DirectoryPlugin for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn as_pre_operation(&self) -> Option<&dyn PreOperationHook> {
        Some(self)
    }
}

// ── Ordering ──────────────────────────────────────────────────────

#[test]
fn plugins_run_in_registration_order() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let pipeline = PluginPipeline::new();
    for name in ["first", "second", "third"] {
        pipeline
            .register(
                Recorder::new(name, &journal, PluginOutcome::Continue),
                [PluginType::PreOperationAdd],
            )
            .unwrap();
    }

    let mut op = add_op();
    assert!(pipeline.dispatch(HookPoint::PreOperation, &mut op).is_continue());
    assert_eq!(
        *journal.lock(),
        vec!["first:pre-op", "second:pre-op", "third:pre-op"]
    );
    assert_eq!(
        pipeline.plugins_for(PluginType::PreOperationAdd),
        vec!["first", "second", "third"]
    );
}

#[test]
fn first_stop_short_circuits() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let pipeline = PluginPipeline::new();
    pipeline
        .register(
            Recorder::new("ok", &journal, PluginOutcome::Continue),
            [PluginType::PreParseAdd],
        )
        .unwrap();
    pipeline
        .register(
            Recorder::new(
                "stopper",
                &journal,
                PluginOutcome::stop(ResultCode::ConstraintViolation, "bad reference"),
            ),
            [PluginType::PreParseAdd],
        )
        .unwrap();
    pipeline
        .register(
            Recorder::new("never", &journal, PluginOutcome::Continue),
            [PluginType::PreParseAdd],
        )
        .unwrap();

    let mut op = add_op();
    let outcome = pipeline.dispatch(HookPoint::PreParse, &mut op);
    assert_eq!(
        outcome,
        PluginOutcome::stop(ResultCode::ConstraintViolation, "bad reference")
    );
    assert_eq!(*journal.lock(), vec!["ok:pre-parse", "stopper:pre-parse"]);
    assert_eq!(op.result_code, ResultCode::ConstraintViolation);
}

#[test]
fn disconnect_marks_operation() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let pipeline = PluginPipeline::new();
    pipeline
        .register(
            Recorder::new(
                "bouncer",
                &journal,
                PluginOutcome::disconnect(ResultCode::UnwillingToPerform, "go away"),
            ),
            [PluginType::PostOperationAdd],
        )
        .unwrap();

    let mut op = add_op();
    pipeline.dispatch(HookPoint::PostOperation, &mut op);
    assert!(op.disconnect);
    assert_eq!(op.result_code, ResultCode::UnwillingToPerform);
}

// ── Failure isolation ─────────────────────────────────────────────

#[test]
fn panic_becomes_stop_other() {
    let pipeline = PluginPipeline::new();
    pipeline
        .register(Arc::new(Panicking), [PluginType::PreOperationAdd])
        .unwrap();

    let mut op = add_op();
    let outcome = pipeline.dispatch(HookPoint::PreOperation, &mut op);
    let PluginOutcome::Stop { result_code, message } = outcome else {
        panic!("expected stop, got {outcome:?}");
    };
    assert_eq!(result_code, ResultCode::Other);
    assert!(message.contains("boom"), "{message}");
    assert_eq!(op.result_code, ResultCode::Other);
}

// ── Subordinate hooks ─────────────────────────────────────────────

#[test]
fn subordinate_dispatch_uses_current_step() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let pipeline = PluginPipeline::new();
    pipeline
        .register(
            Recorder::new("collector", &journal, PluginOutcome::Continue),
            [PluginType::SubordinateDelete],
        )
        .unwrap();

    let mut op = Operation::new(OperationRequest::Delete {
        dn: dn("ou=people,o=test"),
        subtree: true,
    });
    for child in ["uid=a,ou=people,o=test", "uid=b,ou=people,o=test"] {
        op.set_subordinate_step(Some(SubordinateStep::Deleted { dn: dn(child) }));
        assert!(pipeline.dispatch(HookPoint::SubordinateDelete, &mut op).is_continue());
    }
    op.set_subordinate_step(None);

    assert_eq!(
        op.subordinate_changes.deleted,
        vec![dn("uid=a,ou=people,o=test"), dn("uid=b,ou=people,o=test")]
    );
    assert_eq!(journal.lock().len(), 2);
}

// ── Concurrency ───────────────────────────────────────────────────

#[test]
fn dispatch_is_reentrant_across_threads() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Arc::new(PluginPipeline::new());
    pipeline
        .register(
            Recorder::new("shared", &journal, PluginOutcome::Continue),
            [PluginType::PreOperationAdd],
        )
        .unwrap();

    let handles = (0..8)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let mut op = add_op();
                    assert!(pipeline.dispatch(HookPoint::PreOperation, &mut op).is_continue());
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(journal.lock().len(), 400);
}
