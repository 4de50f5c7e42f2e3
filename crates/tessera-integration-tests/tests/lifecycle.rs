//! Module lifecycle observed through the event dispatcher.

use std::sync::Arc;

use tessera_events::ModuleEventKind;
use tessera_runtime::{ModuleSpec, ModuleState, RuntimeError};
use tessera_test::{ActivatorCalls, RecordingActivator, TestHost, service_module};

#[tokio::test]
async fn full_lifecycle_visits_every_state_in_order() {
    let host = TestHost::new();
    let calls = Arc::new(ActivatorCalls::default());
    host.activators()
        .register_instance("Rec", Arc::new(RecordingActivator::new(Arc::clone(&calls))));
    let (events, _) = host.record_events();

    let module = host
        .runtime()
        .install_module(ModuleSpec::new(service_module("alpha", "1.0.0", "X", &[])).with_activator("Rec"))
        .await
        .unwrap();
    assert_eq!(module.state(), ModuleState::Resolved);
    module.start().await.unwrap();
    assert_eq!(module.state(), ModuleState::Active);
    module.stop().await.unwrap();
    assert_eq!(module.state(), ModuleState::Installed);
    module.uninstall().await.unwrap();
    assert_eq!(module.state(), ModuleState::Uninstalled);

    assert_eq!(
        events.kinds(),
        vec![
            ModuleEventKind::Installed,
            ModuleEventKind::Resolved,
            ModuleEventKind::Starting,
            ModuleEventKind::Started,
            ModuleEventKind::Stopping,
            ModuleEventKind::Stopped,
            ModuleEventKind::Uninstalled,
        ]
    );
    assert_eq!(calls.calls(), vec!["start:alpha", "stop:alpha"]);
    assert!(host.runtime().is_empty());
}

#[tokio::test]
async fn second_start_fires_nothing() {
    let host = TestHost::new();
    let module = host
        .runtime()
        .install_module(ModuleSpec::new(service_module("alpha", "1.0.0", "X", &[])))
        .await
        .unwrap();
    module.start().await.unwrap();
    let (events, _) = host.record_events();

    module.start().await.unwrap();
    assert!(events.kinds().is_empty());
    assert_eq!(module.state(), ModuleState::Active);
}

#[tokio::test]
async fn failed_start_returns_to_installed_with_wrapped_error() {
    let host = TestHost::new();
    let calls = Arc::new(ActivatorCalls::default());
    host.activators().register_instance(
        "Broken",
        Arc::new(RecordingActivator::new(Arc::clone(&calls)).failing_start()),
    );
    let module = host
        .runtime()
        .install_module(ModuleSpec::new(service_module("alpha", "1.0.0", "X", &[])).with_activator("Broken"))
        .await
        .unwrap();
    let (events, _) = host.record_events();

    let err = module.start().await.unwrap_err();
    match err {
        RuntimeError::ActivationFailure { module: identity, source } => {
            assert_eq!(identity.symbolic_name(), "alpha");
            assert!(source.to_string().contains("refused"));
        },
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(module.state(), ModuleState::Installed);
    assert!(module.context().is_none());
    assert_eq!(
        events.kinds(),
        vec![
            ModuleEventKind::Starting,
            ModuleEventKind::Stopping,
            ModuleEventKind::Stopped,
        ]
    );
}

#[tokio::test]
async fn async_listeners_see_per_module_order() {
    let host = TestHost::new();
    let recorder = Arc::new(tessera_test::RecordingListener::new());
    host.runtime().add_module_listener(
        Arc::clone(&recorder) as _,
        tessera_events::ListenerTier::Asynchronous,
    );

    let a = host
        .runtime()
        .install_module(ModuleSpec::new(service_module("a", "1.0.0", "A", &[])))
        .await
        .unwrap();
    let b = host
        .runtime()
        .install_module(ModuleSpec::new(service_module("b", "1.0.0", "B", &[])))
        .await
        .unwrap();
    a.start().await.unwrap();
    b.start().await.unwrap();
    a.uninstall().await.unwrap();
    host.runtime().flush_events().await;

    let for_a: Vec<_> = recorder
        .transitions()
        .into_iter()
        .filter(|(name, _)| name == "a")
        .map(|(_, kind)| kind)
        .collect();
    assert_eq!(
        for_a,
        vec![
            ModuleEventKind::Installed,
            ModuleEventKind::Resolved,
            ModuleEventKind::Starting,
            ModuleEventKind::Started,
            ModuleEventKind::Stopping,
            ModuleEventKind::Stopped,
            ModuleEventKind::Uninstalled,
        ]
    );
    assert_eq!(recorder.events().len(), 11);
}

#[tokio::test]
async fn shutdown_uninstalls_everything() {
    let host = TestHost::new();
    for name in ["a", "b", "c"] {
        let module = host
            .runtime()
            .install_module(ModuleSpec::new(service_module(name, "1.0.0", name, &[])))
            .await
            .unwrap();
        module.start().await.unwrap();
    }
    host.runtime().shutdown().await;
    assert!(host.runtime().is_empty());
    assert!(host.environment().runtime_store().is_empty());
}
