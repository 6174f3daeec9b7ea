//! # Binding Scenarios
//!
//! Drives single components through the reference-binding lifecycle:
//!
//! 1. **Static rebinding**: unsatisfied → bound → greedy rebind → loss
//! 2. **Dynamic rebinding**: services come and go on a live instance
//! 3. **Cancellation**: disable while an activation is in flight
//! 4. **Failures**: activate errors, acquisition errors, timeouts
//! 5. **State invariants**: idempotence, terminal DISPOSED, bound-set limits

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use component_runtime::{ActivationFailure, DeactivationReason, EngineConfig, LifecycleError};
    use shared_types::{
        keys, Cardinality, ComponentState, PolicyOption, Properties, ReferenceDescription,
        ReferencePolicy, TargetFilter,
    };
    use std::time::Duration;

    const SERVICE: &str = "org.test.Service";

    fn static_greedy() -> ReferenceDescription {
        ReferenceDescription::builder("dep", SERVICE).greedy().build()
    }

    // =========================================================================
    // STATIC REFERENCE SCENARIOS
    // =========================================================================

    async fn scenario_three(h: &Harness) -> (component_runtime::ComponentManager, shared_types::ServiceToken, shared_types::ServiceToken) {
        let c = h
            .register(component("C").immediate(true).reference(static_greedy()).build().unwrap())
            .await;
        assert_eq!(c.state(), ComponentState::Unsatisfied);

        let p1 = h.publish(SERVICE, 0);
        reach(&c, ComponentState::Active).await;
        assert_eq!(bound_ids(&c, 0), vec![p1.id]);

        let p2 = h.publish(SERVICE, 10);
        assert!(
            eventually(|| c.state() == ComponentState::Active && bound_ids(&c, 0) == vec![p2.id]).await,
            "C did not rebind to P2"
        );
        (c, p1, p2)
    }

    #[tokio::test]
    async fn test_mandatory_reference_without_candidates_is_unsatisfied() {
        let h = Harness::new();
        let c = h
            .register(component("C").reference(static_greedy()).build().unwrap())
            .await;

        assert_eq!(c.state(), ComponentState::Unsatisfied);
        assert!(bound_ids(&c, 0).is_empty());
        assert_eq!(h.recorder.activations("C"), 0);
    }

    #[tokio::test]
    async fn test_first_candidate_activates_component() {
        let h = Harness::new();
        let c = h
            .register(component("C").reference(static_greedy()).build().unwrap())
            .await;

        let p1 = h.publish(SERVICE, 0);
        reach(&c, ComponentState::Active).await;

        assert_eq!(bound_ids(&c, 0), vec![p1.id]);
        assert_eq!(h.recorder.activations("C"), 1);
        assert!(h
            .recorder
            .calls()
            .contains(&Call::Bind("C".into(), "dep".into(), p1.id)));
    }

    #[tokio::test]
    async fn test_greedy_static_reference_reactivates_on_better_candidate() {
        let h = Harness::new();
        let (c, p1, p2) = scenario_three(&h).await;

        assert!(eventually(|| h.recorder.activations("C") == 2).await);
        let calls = h.recorder.calls();
        assert!(calls.contains(&Call::Deactivate("C".into(), DeactivationReason::Rebind)));
        assert!(calls.contains(&Call::Unbind("C".into(), "dep".into(), p1.id)));
        assert!(calls.contains(&Call::Bind("C".into(), "dep".into(), p2.id)));
    }

    #[tokio::test]
    async fn test_losing_only_candidate_leaves_component_unsatisfied() {
        let h = Harness::new();
        let (c, p1, p2) = scenario_three(&h).await;

        // P1 goes first; it is not bound, so nothing changes.
        h.unpublish(&p1);
        c.flush().await;
        assert!(eventually(|| c.references()[0].candidates == 1).await);
        assert_eq!(c.state(), ComponentState::Active);

        h.unpublish(&p2);
        reach(&c, ComponentState::Unsatisfied).await;
        assert!(bound_ids(&c, 0).is_empty());
        assert!(!c.references()[0].satisfied);
        assert!(h.recorder.calls().contains(&Call::Deactivate(
            "C".into(),
            DeactivationReason::ReferenceUnsatisfied
        )));
    }

    #[tokio::test]
    async fn test_losing_bound_candidate_rebinds_to_remaining_one() {
        let h = Harness::new();
        let (c, p1, p2) = scenario_three(&h).await;

        h.unpublish(&p2);
        assert!(
            eventually(|| c.state() == ComponentState::Active && bound_ids(&c, 0) == vec![p1.id]).await,
            "C did not fall back to P1"
        );
        assert!(eventually(|| h.recorder.activations("C") == 3).await);
    }

    #[tokio::test]
    async fn test_reluctant_static_reference_keeps_binding() {
        let h = Harness::new();
        let c = h
            .register(
                component("C")
                    .reference(ReferenceDescription::builder("dep", SERVICE).build())
                    .build()
                    .unwrap(),
            )
            .await;

        let p1 = h.publish(SERVICE, 0);
        reach(&c, ComponentState::Active).await;
        h.publish(SERVICE, 50);
        assert!(eventually(|| c.references()[0].candidates == 2).await);

        assert_eq!(bound_ids(&c, 0), vec![p1.id]);
        assert_eq!(h.recorder.activations("C"), 1);
    }

    #[tokio::test]
    async fn test_target_filter_restricts_candidates() {
        let h = Harness::new();
        let reference = ReferenceDescription::builder("dep", SERVICE)
            .target(TargetFilter::eq("region", "eu"))
            .build();
        let c = h
            .register(component("C").reference(reference).build().unwrap())
            .await;

        h.publish_with(SERVICE, Properties::new().with("region", "us"));
        c.flush().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(c.state(), ComponentState::Unsatisfied);

        let eu = h.publish_with(SERVICE, Properties::new().with("region", "eu"));
        reach(&c, ComponentState::Active).await;
        assert_eq!(bound_ids(&c, 0), vec![eu.id]);
    }

    // =========================================================================
    // DYNAMIC REFERENCE SCENARIOS
    // =========================================================================

    #[tokio::test]
    async fn test_optional_dynamic_reference_never_leaves_active() {
        let h = Harness::new();
        let reference = ReferenceDescription::builder("dep", SERVICE)
            .cardinality(Cardinality::OptionalSingle)
            .policy(ReferencePolicy::Dynamic)
            .build();
        let d = h
            .register(component("D").reference(reference).build().unwrap())
            .await;
        assert_eq!(d.state(), ComponentState::Active);

        let p = h.publish(SERVICE, 0);
        assert!(eventually(|| bound_ids(&d, 0) == vec![p.id]).await);
        assert_eq!(d.state(), ComponentState::Active);

        h.unpublish(&p);
        assert!(eventually(|| bound_ids(&d, 0).is_empty()).await);
        assert_eq!(d.state(), ComponentState::Active);

        let calls = h.recorder.calls();
        assert_eq!(h.recorder.activations("D"), 1);
        assert_eq!(h.recorder.deactivations("D"), 0);
        assert!(calls.contains(&Call::Bind("D".into(), "dep".into(), p.id)));
        assert!(calls.contains(&Call::Unbind("D".into(), "dep".into(), p.id)));
    }

    #[tokio::test]
    async fn test_dynamic_greedy_binds_new_before_unbinding_old() {
        let h = Harness::new();
        let reference = ReferenceDescription::builder("dep", SERVICE)
            .policy(ReferencePolicy::Dynamic)
            .policy_option(PolicyOption::Greedy)
            .build();
        let d = h
            .register(component("D").reference(reference).build().unwrap())
            .await;

        let low = h.publish(SERVICE, 0);
        reach(&d, ComponentState::Active).await;
        let high = h.publish(SERVICE, 5);
        assert!(eventually(|| bound_ids(&d, 0) == vec![high.id]).await);
        d.flush().await;

        let calls = h.recorder.calls();
        let bind_high = calls
            .iter()
            .position(|c| *c == Call::Bind("D".into(), "dep".into(), high.id))
            .unwrap();
        let unbind_low = calls
            .iter()
            .position(|c| *c == Call::Unbind("D".into(), "dep".into(), low.id))
            .unwrap();
        assert!(bind_high < unbind_low);
        assert_eq!(h.recorder.activations("D"), 1);
    }

    #[tokio::test]
    async fn test_multiple_dynamic_reference_tracks_all_candidates() {
        let h = Harness::new();
        let reference = ReferenceDescription::builder("deps", SERVICE)
            .cardinality(Cardinality::MandatoryMultiple)
            .policy(ReferencePolicy::Dynamic)
            .build();
        let d = h
            .register(component("D").reference(reference).build().unwrap())
            .await;

        let a = h.publish(SERVICE, 0);
        let b = h.publish(SERVICE, 3);
        let c = h.publish(SERVICE, 1);
        reach(&d, ComponentState::Active).await;
        assert!(eventually(|| bound_ids(&d, 0).len() == 3).await);
        // Highest ranking first.
        assert_eq!(bound_ids(&d, 0), vec![b.id, c.id, a.id]);

        h.unpublish(&b);
        assert!(eventually(|| bound_ids(&d, 0) == vec![c.id, a.id]).await);
        assert_eq!(d.state(), ComponentState::Active);

        h.unpublish(&c);
        h.unpublish(&a);
        reach(&d, ComponentState::Unsatisfied).await;
    }

    // =========================================================================
    // CANCELLATION
    // =========================================================================

    #[tokio::test]
    async fn test_disable_during_activation_ends_disabled_without_leaks() {
        let h = Harness::new();
        let latch = Latch::default();
        h.install(
            "latched",
            Behaviour {
                latch: Some(latch.clone()),
                ..Behaviour::default()
            },
        );
        let d = h
            .register(
                component("D")
                    .implementation("latched")
                    .provides("org.test.Provided")
                    .enabled(false)
                    .build()
                    .unwrap(),
            )
            .await;
        assert_eq!(d.state(), ComponentState::Disabled);

        let enabling = tokio::spawn({
            let d = d.clone();
            async move { d.enable().await }
        });
        latch.entered().await;
        assert_eq!(d.state(), ComponentState::Activating);

        let (disabled, _) = tokio::join!(d.disable(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            latch.release();
        });

        assert_eq!(disabled, Ok(true));
        assert!(within(enabling).await.unwrap().unwrap());
        assert_eq!(d.state(), ComponentState::Disabled);
        assert_eq!(h.published("org.test.Provided"), 0);
        assert_eq!(d.service_id(), None);
    }

    #[tokio::test]
    async fn test_enable_then_disable_always_ends_disabled() {
        let h = Harness::new();
        h.publish(SERVICE, 0);
        for round in 0..10 {
            let m = h
                .register(
                    component(&format!("R{}", round))
                        .reference(static_greedy())
                        .enabled(false)
                        .build()
                        .unwrap(),
                )
                .await;
            let (enabled, disabled) = tokio::join!(m.enable(), m.disable());
            assert_eq!(enabled, Ok(true));
            assert_eq!(disabled, Ok(true));
            assert_eq!(m.state(), ComponentState::Disabled);
        }
    }

    // =========================================================================
    // FAILURES
    // =========================================================================

    #[tokio::test]
    async fn test_activate_failure_reverts_to_unsatisfied_and_records_cause() {
        let h = Harness::new();
        h.install(
            "failing",
            Behaviour {
                fail_activate: true,
                ..Behaviour::default()
            },
        );
        let m = h
            .register(
                component("F")
                    .implementation("failing")
                    .provides("org.test.Provided")
                    .build()
                    .unwrap(),
            )
            .await;

        assert_eq!(m.state(), ComponentState::Unsatisfied);
        assert!(matches!(
            m.last_failure(),
            Some(ActivationFailure::ActivateCallback { .. })
        ));
        assert_eq!(h.published("org.test.Provided"), 0);
        assert_eq!(h.recorder.deactivations("F"), 0);
    }

    #[tokio::test]
    async fn test_unknown_implementation_is_an_instantiation_failure() {
        let h = Harness::new();
        let m = h
            .register(component("X").implementation("nowhere").build().unwrap())
            .await;

        assert_eq!(m.state(), ComponentState::Unsatisfied);
        assert!(matches!(
            m.last_failure(),
            Some(ActivationFailure::Instantiation(_))
        ));
    }

    #[tokio::test]
    async fn test_activation_timeout_is_recorded() {
        let h = Harness::with_config(EngineConfig {
            lock_timeout_ms: 50,
            ..EngineConfig::default()
        });
        h.install(
            "slow",
            Behaviour {
                activate_delay: Some(Duration::from_millis(500)),
                ..Behaviour::default()
            },
        );
        let m = h
            .register(component("S").implementation("slow").build().unwrap())
            .await;

        assert_eq!(m.state(), ComponentState::Unsatisfied);
        assert_eq!(
            m.last_failure(),
            Some(ActivationFailure::Timeout { millis: 50 })
        );
    }

    #[tokio::test]
    async fn test_slow_constructor_counts_against_activation_timeout() {
        let h = Harness::with_config(EngineConfig {
            lock_timeout_ms: 50,
            ..EngineConfig::default()
        });
        h.install(
            "heavy",
            Behaviour {
                construct_delay: Some(Duration::from_millis(400)),
                ..Behaviour::default()
            },
        );
        let started = std::time::Instant::now();
        let m = h
            .register(component("Heavy").implementation("heavy").build().unwrap())
            .await;

        assert!(started.elapsed() < Duration::from_millis(350));
        assert_eq!(m.state(), ComponentState::Unsatisfied);
        assert_eq!(
            m.last_failure(),
            Some(ActivationFailure::Timeout { millis: 50 })
        );
        assert_eq!(h.recorder.activations("Heavy"), 0);
    }

    #[tokio::test]
    async fn test_unavailable_candidate_is_skipped_for_next_best() {
        let h = Harness::new();
        h.install(
            "broken",
            Behaviour {
                fail_activate: true,
                ..Behaviour::default()
            },
        );
        // Delayed provider that fails when first consumed.
        let broken = h
            .register(
                component("Broken")
                    .implementation("broken")
                    .provides(SERVICE)
                    .immediate(false)
                    .property(keys::SERVICE_RANKING, 10i64)
                    .build()
                    .unwrap(),
            )
            .await;
        assert_eq!(broken.state(), ComponentState::Registered);
        let fallback = h.publish(SERVICE, 0);

        let c = h
            .register(component("C").reference(static_greedy()).build().unwrap())
            .await;

        reach(&c, ComponentState::Active).await;
        assert_eq!(bound_ids(&c, 0), vec![fallback.id]);
        assert_eq!(broken.state(), ComponentState::Unsatisfied);
    }

    #[tokio::test]
    async fn test_bind_failure_without_alternative_leaves_unsatisfied() {
        let h = Harness::new();
        h.install(
            "picky",
            Behaviour {
                fail_bind: true,
                ..Behaviour::default()
            },
        );
        h.publish(SERVICE, 0);
        let m = h
            .register(
                component("P")
                    .implementation("picky")
                    .reference(static_greedy())
                    .build()
                    .unwrap(),
            )
            .await;

        assert_eq!(m.state(), ComponentState::Unsatisfied);
        assert_eq!(
            m.last_failure(),
            Some(ActivationFailure::ReferenceUnsatisfied {
                reference: "dep".to_string()
            })
        );
    }

    // =========================================================================
    // STATE INVARIANTS
    // =========================================================================

    #[tokio::test]
    async fn test_enable_on_enabled_component_is_noop() {
        let h = Harness::new();
        let m = h.register(component("A").build().unwrap()).await;

        assert_eq!(m.state(), ComponentState::Active);
        assert_eq!(m.enable().await, Ok(false));
        assert_eq!(h.recorder.activations("A"), 1);
    }

    #[tokio::test]
    async fn test_disposed_is_terminal() {
        let h = Harness::new();
        let m = h.register(component("A").build().unwrap()).await;

        assert!(m.dispose().await);
        assert!(!m.dispose().await);
        assert!(matches!(m.enable().await, Err(LifecycleError::Disposed { .. })));
        assert!(matches!(m.disable().await, Err(LifecycleError::Disposed { .. })));
        assert_eq!(m.state(), ComponentState::Disposed);
        assert_eq!(
            h.recorder.calls().last(),
            Some(&Call::Deactivate("A".into(), DeactivationReason::Disposed))
        );
    }

    #[tokio::test]
    async fn test_single_cardinality_never_binds_more_than_one() {
        let h = Harness::new();
        let reference = ReferenceDescription::builder("dep", SERVICE)
            .policy(ReferencePolicy::Dynamic)
            .greedy()
            .build();
        let m = h
            .register(component("M").reference(reference).build().unwrap())
            .await;

        let watcher = tokio::spawn({
            let m = m.clone();
            async move {
                let mut worst = 0;
                for _ in 0..200 {
                    worst = worst.max(m.references()[0].bound.len());
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                worst
            }
        });

        let mut tokens = Vec::new();
        for rank in 0..8 {
            tokens.push(h.publish(SERVICE, rank));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for token in tokens.iter().take(7) {
            h.unpublish(token);
        }

        assert!(within(watcher).await.unwrap() <= 1);
        assert!(eventually(|| bound_ids(&m, 0) == vec![tokens[7].id]).await);
    }

    #[tokio::test]
    async fn test_active_implies_mandatory_references_satisfied() {
        let h = Harness::new();
        let m = h
            .register(
                component("M")
                    .reference(static_greedy())
                    .reference(
                        ReferenceDescription::builder("other", "org.test.Other")
                            .cardinality(Cardinality::MandatoryMultiple)
                            .policy(ReferencePolicy::Dynamic)
                            .build(),
                    )
                    .build()
                    .unwrap(),
            )
            .await;

        let check = |m: &component_runtime::ComponentManager| {
            m.state() != ComponentState::Active || m.references().iter().all(|r| r.satisfied)
        };

        let a = h.publish(SERVICE, 0);
        m.flush().await;
        assert!(check(&m));
        let b = h.publish("org.test.Other", 0);
        reach(&m, ComponentState::Active).await;
        assert!(check(&m));
        h.unpublish(&b);
        reach(&m, ComponentState::Unsatisfied).await;
        assert!(check(&m));
        h.publish("org.test.Other", 0);
        reach(&m, ComponentState::Active).await;
        h.unpublish(&a);
        reach(&m, ComponentState::Unsatisfied).await;
        assert!(check(&m));
    }
}
