//! Tests for the execution session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jitforge_config::JitConfig;
use jitforge_ir::DataDef;
use jitforge_test::modules::{add_one_module, add_two_module, ghost_module, sum_to_module};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::Layer;

use super::*;
use crate::target::TargetDescriptor;

struct Fixture {
    session: ExecutionSession,
    compiler: CompileLayer,
    linker: ObjectLinkingLayer,
}

impl Fixture {
    fn new() -> Self {
        let target = TargetDescriptor::host(&JitConfig::default()).expect("host target");
        let layout = *target.data_layout();
        Self {
            session: ExecutionSession::new(HostProcessResolver::new(layout)),
            compiler: CompileLayer::new(target),
            linker: ObjectLinkingLayer::new(layout),
        }
    }

    fn mangle(&self, name: &str) -> String {
        mangle(name, self.compiler.target().data_layout())
    }

    fn submit(&mut self, build: fn(&mut Context) -> Module) -> (NamespaceId, Result<()>) {
        let mut context = Context::new();
        let module = build(&mut context);
        let id = self.session.create_namespace(module.name());
        let result = self
            .session
            .add_module(id, module, context, &self.compiler, &self.linker);
        (id, result)
    }
}

#[test]
fn test_namespace_ids_follow_creation_order() {
    let mut fixture = Fixture::new();
    let a = fixture.session.create_namespace("a");
    let b = fixture.session.create_namespace("b");

    assert_eq!(a.index(), 0);
    assert_eq!(b.index(), 1);
    assert_eq!(fixture.session.namespace(b).unwrap().name(), "b");
}

#[test]
fn test_linked_module_symbols_resolve() {
    let mut fixture = Fixture::new();
    let (id, result) = fixture.submit(add_one_module);
    result.unwrap();

    let name = fixture.mangle("add_one");
    let namespace = fixture.session.namespace(id).unwrap();
    assert!(namespace.is_linked());
    assert!(namespace.module().is_some());
    assert!(matches!(
        namespace.state(&name),
        Some(SymbolState::Resolved {
            kind: SymbolKind::Function,
            ..
        })
    ));
    assert!(fixture.session.memory_bytes() > 0);

    match fixture.session.resolve(&name) {
        Resolution::Resolved(symbol) => {
            assert_eq!(symbol.namespace, Some(id));
            assert_ne!(symbol.address, 0);
        }
        other => panic!("expected a resolved symbol, got {other:?}"),
    }
}

#[test]
fn test_failed_module_marks_every_symbol_failed() {
    let mut fixture = Fixture::new();
    let (id, result) = fixture.submit(ghost_module);

    assert_eq!(
        result.unwrap_err(),
        JitError::UnresolvedSymbol("ghost_fn".to_string())
    );
    let namespace = fixture.session.namespace(id).unwrap();
    assert!(namespace.is_failed());
    assert!(!namespace.is_linked());
    assert_eq!(namespace.memory_bytes(), 0);
    for name in ["call_ghost", "bystander"] {
        assert_eq!(
            fixture.session.resolve(&fixture.mangle(name)),
            Resolution::Failed
        );
    }
}

#[test]
fn test_later_module_links_against_earlier() {
    let mut fixture = Fixture::new();
    fixture.submit(add_one_module).1.unwrap();
    let (id, result) = fixture.submit(add_two_module);
    result.unwrap();

    let resolution = fixture.session.resolve(&fixture.mangle("add_two"));
    assert!(matches!(resolution, Resolution::Resolved(s) if s.namespace == Some(id)));
}

#[test]
fn test_later_namespaces_are_invisible() {
    let mut fixture = Fixture::new();
    let early = fixture.session.create_namespace("early");
    fixture.submit(add_one_module).1.unwrap();

    let mut context = Context::new();
    let module = add_two_module(&mut context);
    let err = fixture
        .session
        .add_module(early, module, context, &fixture.compiler, &fixture.linker)
        .unwrap_err();
    assert_eq!(err, JitError::UnresolvedSymbol("add_one".to_string()));
}

#[test]
fn test_local_symbols_are_not_visible() {
    let mut fixture = Fixture::new();
    let (id, result) = fixture.submit(sum_to_module);
    result.unwrap();

    let step = fixture.mangle("step");
    assert!(matches!(
        fixture.session.namespace(id).unwrap().state(&step),
        Some(SymbolState::Resolved { .. })
    ));
    assert_eq!(fixture.session.resolve(&step), Resolution::NotFound);
}

#[test]
fn test_resolved_wins_over_failed_and_pending() {
    let mut fixture = Fixture::new();
    fixture.submit(ghost_module).1.unwrap_err();
    let bystander = fixture.mangle("bystander");

    let pending = fixture.session.create_namespace("pending");
    fixture.session.namespaces[pending.index()].symbols.insert(
        bystander.clone(),
        SymbolEntry {
            state: SymbolState::Materializing,
            exported: true,
        },
    );
    assert_eq!(fixture.session.resolve(&bystander), Resolution::Pending);

    let resolved = fixture.session.create_namespace("resolved");
    fixture.session.namespaces[resolved.index()].symbols.insert(
        bystander.clone(),
        SymbolEntry {
            state: SymbolState::Resolved {
                address: 0x1000,
                kind: SymbolKind::Data,
            },
            exported: true,
        },
    );
    assert!(matches!(
        fixture.session.resolve(&bystander),
        Resolution::Resolved(s) if s.address == 0x1000
    ));
}

#[test]
fn test_unknown_namespace() {
    let mut fixture = Fixture::new();
    let mut context = Context::new();
    let module = add_one_module(&mut context);
    let result = fixture.session.add_module(
        NamespaceId(7),
        module,
        context,
        &fixture.compiler,
        &fixture.linker,
    );
    assert!(matches!(result, Err(JitError::LookupMiss(_))));
}

/// Counts `module_failed` events.
struct FailedModules(Arc<AtomicUsize>);

struct EventName(Option<String>);

impl Visit for EventName {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "event" {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn fmt::Debug) {}
}

impl<S: Subscriber> Layer<S> for FailedModules {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut name = EventName(None);
        event.record(&mut name);
        if name.0.as_deref() == Some("module_failed") {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn duplicate_module(context: &mut Context) -> Module {
    let mut module = add_one_module(context);
    let add_one = context.symbol("add_one");
    module.define_data(DataDef::read_only(add_one, vec![1]));
    module
}

#[test]
fn test_every_failure_is_reported() {
    let failures = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(FailedModules(failures.clone()));

    tracing::subscriber::with_default(subscriber, || {
        let mut fixture = Fixture::new();

        let (id, result) = fixture.submit(duplicate_module);
        assert!(matches!(
            result,
            Err(JitError::DuplicateDefinition { ref symbol, .. }) if symbol == "add_one"
        ));
        assert!(fixture.session.namespace(id).unwrap().is_failed());
        assert_eq!(failures.load(Ordering::SeqCst), 1);

        let (_, result) = fixture.submit(ghost_module);
        assert!(result.is_err());
        assert_eq!(failures.load(Ordering::SeqCst), 2);
    });
}
