//! Behavioral tests for the callback registry.

#[cfg(test)]
mod tests {
    use crate::callback::{from_fn, kwargs, thunk, Callback, Kwargs};
    use crate::registry::{CallbackRegistry, DrainSummary};
    use crate::reporting::CollectingReporter;
    use crate::testing::Recorder;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn collecting_registry() -> (CallbackRegistry, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::new());
        let registry = CallbackRegistry::new().with_reporter(reporter.clone());
        (registry, reporter)
    }

    #[test]
    fn test_drain_runs_in_reverse_registration_order() {
        let registry = CallbackRegistry::new();
        let out = Recorder::new();

        for name in ["f1", "f2", "f3"] {
            registry.register(out.line(name)).unwrap();
        }
        let summary = registry.drain().unwrap();

        assert_eq!(out.lines(), ["f3", "f2", "f1"]);
        assert_eq!(summary, DrainSummary { invoked: 3, failed: 0 });
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_register_returns_the_same_callable() {
        let registry = CallbackRegistry::new();
        let cb = thunk("noop", || Ok(()));

        let returned = registry.register(cb.clone()).unwrap();

        assert!(Arc::ptr_eq(&cb, &returned));
    }

    #[test]
    fn test_captured_arguments_are_passed_through() {
        let registry = CallbackRegistry::new();
        let out = Recorder::new();

        registry
            .register_with(out.printer(), vec![json!("one")], Kwargs::new())
            .unwrap();
        registry
            .register_with(out.printer(), vec![json!("two"), json!(2)], Kwargs::new())
            .unwrap();
        let seen = Recorder::new();
        let sink = seen.clone();
        registry
            .register_with(
                from_fn("kw", move |_, kw| {
                    sink.record(format!("{}", kw["level"]));
                    Ok(())
                }),
                Vec::new(),
                kwargs([("level", json!(3))]),
            )
            .unwrap();

        registry.drain().unwrap();

        assert_eq!(out.lines(), ["two 2", "one"]);
        assert_eq!(seen.lines(), ["3"]);
    }

    #[test]
    fn test_clear_then_drain_invokes_nothing() {
        let registry = CallbackRegistry::new();
        let out = Recorder::new();
        registry.register(out.line("stale")).unwrap();
        registry.register(out.line("stale")).unwrap();

        registry.clear();
        let summary = registry.drain().unwrap();

        assert!(out.lines().is_empty());
        assert_eq!(summary.invoked, 0);
    }

    #[test]
    fn test_unregister_removes_every_matching_entry() {
        let registry = CallbackRegistry::new();
        let out = Recorder::new();
        let keep = out.line("keep");
        let dup = out.line("dup");

        registry.register(dup.clone()).unwrap();
        registry.register(keep.clone()).unwrap();
        registry.register(dup.clone()).unwrap();

        assert_eq!(registry.unregister(&dup), 2);
        assert_eq!(registry.unregister(&dup), 0);
        assert_eq!(registry.count(), 1);

        registry.drain().unwrap();
        assert_eq!(out.lines(), ["keep"]);
    }

    #[test]
    fn test_unregister_from_inside_a_callback() {
        let registry = Arc::new(CallbackRegistry::new());
        let out = Recorder::new();
        let victim = out.line("victim");
        registry.register(victim.clone()).unwrap();

        let reg = registry.clone();
        registry
            .register(thunk("remover", move || {
                reg.unregister(&victim);
                Ok(())
            }))
            .unwrap();

        registry.drain().unwrap();
        assert!(out.lines().is_empty());
        registry.clear();
    }

    #[test]
    fn test_failure_does_not_stop_the_drain() {
        let (registry, reporter) = collecting_registry();
        let out = Recorder::new();

        registry.register(out.line("first")).unwrap();
        registry
            .register(thunk("early_failure", || anyhow::bail!("first problem")))
            .unwrap();
        registry.register(out.line("middle")).unwrap();
        registry
            .register(thunk("late_failure", || anyhow::bail!("second problem")))
            .unwrap();

        let err = registry.drain().unwrap_err();

        assert_eq!(out.lines(), ["middle", "first"]);
        // Drain order is late_failure then early_failure, so the last error
        // surfaced is early_failure's.
        assert_eq!(err.callback, "early_failure");
        assert_eq!(err.message, "first problem");
        assert_eq!(err.failed, 2);
        assert_eq!(reporter.callbacks(), ["late_failure", "early_failure"]);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_panicking_callback_is_reported() {
        let (registry, reporter) = collecting_registry();
        let out = Recorder::new();

        registry.register(out.line("after")).unwrap();
        registry
            .register(thunk("panics", || panic!("intentional")))
            .unwrap();

        let err = registry.drain().unwrap_err();

        assert!(err.panicked);
        assert_eq!(err.message, "panicked: intentional");
        assert_eq!(out.lines(), ["after"]);
        assert_eq!(reporter.len(), 1);
    }

    #[test]
    fn test_reentrant_registration_runs_in_the_same_drain() {
        let registry = Arc::new(CallbackRegistry::new());
        let out = Recorder::new();

        registry.register(out.line("outer-first")).unwrap();
        let reg = registry.clone();
        let inner_out = out.clone();
        registry
            .register(thunk("spawner", move || {
                inner_out.record("spawner");
                let nested_out = inner_out.clone();
                let nested_reg = reg.clone();
                reg.register(thunk("nested", move || {
                    nested_out.record("nested");
                    nested_reg.register(nested_out.line("deepest"))?;
                    Ok(())
                }))?;
                Ok(())
            }))
            .unwrap();

        let summary = registry.drain().unwrap();

        assert_eq!(out.lines(), ["spawner", "nested", "deepest", "outer-first"]);
        assert_eq!(summary.invoked, 4);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_captured_values_are_released_after_drain_and_clear() {
        let registry = CallbackRegistry::new();
        let payload = Arc::new(vec![0_u8; 16]);

        let held = payload.clone();
        registry
            .register(thunk("holds", move || {
                let _ = held.len();
                Ok(())
            }))
            .unwrap();
        assert_eq!(Arc::strong_count(&payload), 2);
        registry.drain().unwrap();
        assert_eq!(Arc::strong_count(&payload), 1);

        let held = payload.clone();
        registry
            .register(thunk("holds", move || {
                let _ = held.len();
                Ok(())
            }))
            .unwrap();
        registry.clear();
        assert_eq!(Arc::strong_count(&payload), 1);
    }

    #[test]
    fn test_reference_cycle_through_registry_is_broken_by_drain() {
        let registry = Arc::new(CallbackRegistry::new());
        let weak = Arc::downgrade(&registry);

        let itself = registry.clone();
        registry
            .register(thunk("cycle", move || {
                let _ = itself.count();
                Ok(())
            }))
            .unwrap();
        assert_eq!(Arc::strong_count(&registry), 2);

        registry.drain().unwrap();
        drop(registry);

        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_sealed_registry_rejects_registration() {
        let registry = CallbackRegistry::new();
        registry.register(thunk("before", || Ok(()))).unwrap();

        registry.drain_and_seal().unwrap();

        assert!(registry.is_sealed());
        let err = registry.register(thunk("late", || Ok(()))).unwrap_err();
        assert_eq!(err.callback, "late");
        assert_eq!(err.context, registry.context());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_plain_drain_does_not_seal() {
        let registry = CallbackRegistry::new();
        registry.drain().unwrap();
        assert!(!registry.is_sealed());
        assert!(registry.register(thunk("again", || Ok(()))).is_ok());
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(CallbackRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.register(thunk("t", || Ok(()))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.count(), 800);
        assert_eq!(registry.drain().unwrap().invoked, 800);
    }

    #[test]
    fn test_labels_follow_registration_order() {
        let registry = CallbackRegistry::new();
        let out = Recorder::new();
        registry.register(out.line("a")).unwrap();
        registry.register(thunk("b", || Ok(()))).unwrap();

        let labels = registry.labels();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[1], "b");
    }

    #[test]
    fn test_callables_snapshot_then_unregister() {
        let registry = CallbackRegistry::new();
        let out = Recorder::new();
        registry.register(out.line("keep")).unwrap();
        registry.register(out.line("drop")).unwrap();

        let doomed: Vec<_> = registry
            .callables()
            .into_iter()
            .filter(|cb| cb.name() == "drop")
            .collect();
        assert_eq!(doomed.len(), 1);
        assert_eq!(registry.unregister(&doomed[0]), 1);

        registry.drain().unwrap();
        assert_eq!(out.lines(), ["keep"]);
    }
}
