//! # Factories, Configuration and Delayed Services
//!
//! ## Flows Tested:
//!
//! 1. **Component factories**: FACTORY state, `new_instance`, bulk disposal
//! 2. **Factory configurations**: instances follow configuration records
//! 3. **Configuration policy**: require/optional/ignore, modified callback
//! 4. **Delayed components**: activation on first use, release on last unget

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use component_runtime::{DeactivationReason, EngineConfig, LifecycleError};
    use shared_types::{
        keys, ComponentState, ConfigurationPolicy, Properties, ReferenceDescription,
    };
    use std::time::Duration;

    // =========================================================================
    // COMPONENT FACTORIES
    // =========================================================================

    #[tokio::test]
    async fn test_factory_component_publishes_factory_and_creates_instances() {
        let h = Harness::new();
        let root = h
            .register(component("Worker").factory("org.test.worker").build().unwrap())
            .await;

        assert_eq!(root.state(), ComponentState::Factory);
        assert_eq!(h.published(component_runtime::service::FACTORY_INTERFACE), 1);
        assert_eq!(h.recorder.activations("Worker"), 0);

        let instance = h
            .registry
            .new_instance("org.test.worker", Properties::new().with("task", "index"))
            .await
            .unwrap();
        assert_eq!(instance.state(), ComponentState::Active);
        assert!(instance.is_factory_instance());
        assert_eq!(instance.properties().get_str("task"), Some("index"));
        assert_eq!(h.recorder.activations("Worker"), 1);
        assert_eq!(root.factory().unwrap().instances().len(), 1);
    }

    #[tokio::test]
    async fn test_disabling_factory_disposes_instances_and_closes_it() {
        let h = Harness::new();
        let root = h
            .register(component("Worker").factory("org.test.worker").build().unwrap())
            .await;
        let factory = root.factory().unwrap();
        let first = factory.new_instance(Properties::new()).await.unwrap();
        let second = factory.new_instance(Properties::new()).await.unwrap();

        root.disable().await.unwrap();

        assert_eq!(first.state(), ComponentState::Disposed);
        assert_eq!(second.state(), ComponentState::Disposed);
        assert!(h.registry.get_component(first.id()).is_none());
        assert_eq!(h.published(component_runtime::service::FACTORY_INTERFACE), 0);
        assert!(matches!(
            factory.new_instance(Properties::new()).await,
            Err(LifecycleError::FactoryClosed(_))
        ));
        assert!(matches!(
            h.registry.new_instance("org.test.worker", Properties::new()).await,
            Err(LifecycleError::FactoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_factory_instances_run_full_lifecycle() {
        let h = Harness::new();
        h.register(
            component("Needy")
                .factory("org.test.needy")
                .reference(ReferenceDescription::builder("dep", "org.test.Dep").build())
                .build()
                .unwrap(),
        )
        .await;

        let instance = h
            .registry
            .new_instance("org.test.needy", Properties::new())
            .await
            .unwrap();
        assert_eq!(instance.state(), ComponentState::Unsatisfied);

        h.publish("org.test.Dep", 0);
        reach(&instance, ComponentState::Active).await;
    }

    #[tokio::test]
    async fn test_factory_configurations_create_and_dispose_instances() {
        let h = Harness::with_config(EngineConfig {
            factory_enabled: true,
            lock_timeout_ms: 1000,
            ..EngineConfig::default()
        });
        let root = h
            .register(
                component("Configured")
                    .factory("org.test.configured")
                    .build()
                    .unwrap(),
            )
            .await;
        let factory = root.factory().unwrap();

        let pid = h
            .configuration
            .create_factory_configuration("Configured", Properties::new().with("slot", 1i64));
        assert!(eventually(|| factory.instances().len() == 1).await);
        let instance = factory.instances().remove(0);
        reach(&instance, ComponentState::Active).await;
        assert_eq!(instance.properties().get_number("slot"), Some(1));

        h.configuration
            .update_factory("Configured", &pid, Properties::new().with("slot", 2i64));
        assert!(
            eventually(|| factory
                .instances()
                .first()
                .is_some_and(|m| m.properties().get_number("slot") == Some(2)))
            .await
        );
        assert_eq!(instance.state(), ComponentState::Disposed);

        h.configuration.delete(&pid);
        assert!(eventually(|| factory.instances().is_empty()).await);
    }

    // =========================================================================
    // CONFIGURATION POLICY
    // =========================================================================

    #[tokio::test]
    async fn test_required_configuration_gates_activation() {
        let h = Harness::new();
        let m = h
            .register(
                component("Gated")
                    .configuration_policy(ConfigurationPolicy::Require)
                    .configuration_pid("org.test.gated")
                    .build()
                    .unwrap(),
            )
            .await;
        assert_eq!(m.state(), ComponentState::Unsatisfied);

        h.configuration
            .update("org.test.gated", Properties::new().with("port", 8080i64));
        reach(&m, ComponentState::Active).await;
        assert_eq!(m.properties().get_number("port"), Some(8080));
        assert_eq!(
            m.properties().get_str(keys::SERVICE_PID),
            Some("org.test.gated")
        );

        h.configuration.delete("org.test.gated");
        reach(&m, ComponentState::Unsatisfied).await;
        assert!(h.recorder.calls().contains(&Call::Deactivate(
            "Gated".into(),
            DeactivationReason::ConfigurationDeleted
        )));
    }

    #[tokio::test]
    async fn test_modified_callback_keeps_instance() {
        let h = Harness::new();
        let m = h
            .register(
                component("Tunable")
                    .modified("modified")
                    .provides("org.test.Tunable")
                    .build()
                    .unwrap(),
            )
            .await;
        assert_eq!(m.state(), ComponentState::Active);

        h.configuration
            .update("Tunable", Properties::new().with("level", 3i64));
        assert!(eventually(|| h.recorder.count(|c| *c == Call::Modified("Tunable".into())) == 1).await);
        assert_eq!(h.recorder.activations("Tunable"), 1);
        assert_eq!(m.properties().get_number("level"), Some(3));

        let published = h
            .services
            .tokens()
            .into_iter()
            .find(|t| t.provides("org.test.Tunable"))
            .unwrap();
        assert_eq!(published.properties.get_number("level"), Some(3));
    }

    #[tokio::test]
    async fn test_configuration_change_without_modified_reactivates() {
        let h = Harness::new();
        let m = h.register(component("Rigid").build().unwrap()).await;

        h.configuration
            .update("Rigid", Properties::new().with("level", 1i64));
        assert!(eventually(|| h.recorder.activations("Rigid") == 2).await);
        reach(&m, ComponentState::Active).await;
        assert!(h.recorder.calls().contains(&Call::Deactivate(
            "Rigid".into(),
            DeactivationReason::ConfigurationModified
        )));
    }

    #[tokio::test]
    async fn test_ignored_configuration_is_never_read() {
        let h = Harness::new();
        h.configuration
            .update("Deaf", Properties::new().with("level", 9i64));
        let m = h
            .register(
                component("Deaf")
                    .configuration_policy(ConfigurationPolicy::Ignore)
                    .build()
                    .unwrap(),
            )
            .await;

        assert_eq!(m.state(), ComponentState::Active);
        assert_eq!(m.properties().get_number("level"), None);
        h.configuration
            .update("Deaf", Properties::new().with("level", 10i64));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(h.recorder.activations("Deaf"), 1);
    }

    // =========================================================================
    // DELAYED COMPONENTS
    // =========================================================================

    fn delayed_provider() -> shared_types::ComponentDescription {
        component("Lazy")
            .provides("org.test.Lazy")
            .immediate(false)
            .build()
            .unwrap()
    }

    fn lazy_consumer() -> shared_types::ComponentDescription {
        component("User")
            .reference(ReferenceDescription::builder("lazy", "org.test.Lazy").build())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_delayed_component_registers_without_activating() {
        let h = Harness::new();
        let lazy = h.register(delayed_provider()).await;

        assert_eq!(lazy.state(), ComponentState::Registered);
        assert_eq!(h.published("org.test.Lazy"), 1);
        assert_eq!(h.recorder.activations("Lazy"), 0);
    }

    #[tokio::test]
    async fn test_delayed_component_follows_its_consumers() {
        let h = Harness::new();
        let lazy = h.register(delayed_provider()).await;
        let service_id = lazy.service_id();
        let user = h.register(lazy_consumer()).await;

        reach(&user, ComponentState::Active).await;
        assert_eq!(lazy.state(), ComponentState::Active);
        assert_eq!(lazy.service_id(), service_id);

        user.disable().await.unwrap();
        reach(&lazy, ComponentState::Registered).await;
        assert!(h.recorder.calls().contains(&Call::Deactivate(
            "Lazy".into(),
            DeactivationReason::NoConsumers
        )));
        assert_eq!(h.published("org.test.Lazy"), 1);
    }

    #[tokio::test]
    async fn test_keep_instances_holds_delayed_component_active() {
        let h = Harness::with_config(EngineConfig {
            keep_instances: true,
            lock_timeout_ms: 1000,
            ..EngineConfig::default()
        });
        let lazy = h.register(delayed_provider()).await;
        let user = h.register(lazy_consumer()).await;
        reach(&user, ComponentState::Active).await;

        user.disable().await.unwrap();
        lazy.flush().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(lazy.state(), ComponentState::Active);
    }

    #[tokio::test]
    async fn test_unsatisfied_delayed_component_withdraws_registration() {
        let h = Harness::new();
        let lazy = h
            .register(
                component("LazyNeedy")
                    .provides("org.test.LazyNeedy")
                    .immediate(false)
                    .reference(ReferenceDescription::builder("dep", "org.test.Dep").build())
                    .build()
                    .unwrap(),
            )
            .await;
        assert_eq!(lazy.state(), ComponentState::Unsatisfied);

        let dep = h.publish("org.test.Dep", 0);
        reach(&lazy, ComponentState::Registered).await;
        assert_eq!(h.published("org.test.LazyNeedy"), 1);

        h.unpublish(&dep);
        reach(&lazy, ComponentState::Unsatisfied).await;
        assert_eq!(h.published("org.test.LazyNeedy"), 0);
    }
}
