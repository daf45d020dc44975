use cadence_core::inflect::studly;
use cadence_dispatch::Dispatcher;
use cadence_events::InMemoryEventBus;
use proptest::prelude::*;

fn dispatcher() -> Dispatcher {
    Dispatcher::builder(InMemoryEventBus::arc()).build()
}

fn type_segment() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,8}"
}

fn method() -> impl Strategy<Value = String> {
    "[a-z]{3,8}(ing|ed)"
}

/// Names the normalizer would treat as a suffix to strip or a segment to swap.
fn reserved(root: &str, name: &str, method: &str) -> bool {
    ["commands", "queries", "models"].contains(&root)
        || ["Model", "Command", "Query", "Event"].contains(&name)
        || name == studly(method)
}

proptest! {
    #[test]
    fn normalized_names_end_with_the_action(
        root in "[a-z]{2,6}",
        name in type_segment(),
        method in method(),
    ) {
        prop_assume!(!reserved(&root, &name, &method));
        let dispatcher = dispatcher();
        let source = format!("{root}::commands::{name}");
        let normalized = dispatcher.normalize_event_name(&method, &source);

        let expected_suffix = format!("::{}", studly(&method));
        prop_assert!(normalized.ends_with(&expected_suffix));
        let expected_prefix = format!("{root}::events::");
        prop_assert!(normalized.starts_with(&expected_prefix));
        prop_assert!(!normalized.contains("::commands::"));
    }

    #[test]
    fn default_names_sit_directly_under_the_event_namespace(
        root in "[a-z]{2,6}",
        name in type_segment(),
        method in method(),
    ) {
        prop_assume!(!reserved(&root, &name, &method));
        let dispatcher = dispatcher();
        let source = format!("{root}::queries::{name}");
        prop_assert_eq!(
            dispatcher.default_event_name(&method, &source),
            format!("{root}::events::{}", studly(&method))
        );
    }

    #[test]
    fn only_progressive_triggers_halt(name in type_segment(), method in method()) {
        let bus = InMemoryEventBus::arc();
        let dispatcher = Dispatcher::builder(bus.clone()).build();
        let source = format!("app::models::{name}");

        dispatcher.trigger(&method, &source, &[]).unwrap();

        let dispatched = bus.dispatched();
        prop_assert_eq!(dispatched.len(), 1);
        prop_assert_eq!(dispatched[0].halt, method.ends_with("ing"));
    }

    #[test]
    fn unregistered_events_resolve_to_the_generic_type(name in type_segment(), method in method()) {
        let dispatcher = dispatcher();
        let source = format!("app::commands::{name}");
        prop_assert_eq!(
            dispatcher.resolve_event_type(&method, &source),
            cadence_events::Event::GENERIC
        );
    }
}
