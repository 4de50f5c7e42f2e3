//! Provisioning from a persistent repository into a live runtime.

use std::sync::Arc;

use tessera_provision::{ProvisionError, Provisioner};
use tessera_resource::Resource;
use tessera_runtime::ModuleState;
use tessera_test::{
    ActivatorCalls, RecordingActivator, RecordingInstaller, TestHost, service_module,
    service_requirement, version,
};

fn publish(host: &TestHost, resource: Resource) {
    host.repository().add_resource(resource).unwrap();
}

#[tokio::test]
async fn transitive_closure_installs_dependencies_first() {
    let host = TestHost::new();
    publish(&host, service_module("app", "1.0.0", "app", &["db", "log"]));
    publish(&host, service_module("db", "1.0.0", "db", &[]));
    publish(&host, service_module("log", "1.0.0", "log", &[]));
    let (events, _) = host.record_events();

    let handles = host.provision(&[service_requirement("app")]).await.unwrap();
    let order: Vec<&str> = handles
        .iter()
        .map(|h| h.resource().identity().symbolic_name())
        .collect();
    assert_eq!(order.len(), 3);
    assert_eq!(order[2], "app");
    assert!(order.contains(&"db") && order.contains(&"log"));

    let started: Vec<String> = events
        .transitions()
        .into_iter()
        .filter(|(_, kind)| *kind == tessera_events::ModuleEventKind::Started)
        .map(|(name, _)| name)
        .collect();
    assert_eq!(started.last().map(String::as_str), Some("app"));

    for module in host.runtime().modules() {
        assert_eq!(module.state(), ModuleState::Active);
    }

    for handle in handles.iter().rev() {
        handle.uninstall().await.unwrap();
    }
    assert!(host.runtime().is_empty());
    assert!(host.environment().runtime_store().is_empty());
}

#[tokio::test]
async fn installed_providers_are_reused() {
    let host = TestHost::new();
    publish(&host, service_module("log", "1.0.0", "log", &[]));
    publish(&host, service_module("app", "1.0.0", "app", &["log"]));

    let first = host.provision(&[service_requirement("log")]).await.unwrap();
    assert_eq!(first.len(), 1);

    let second = host.provision(&[service_requirement("app")]).await.unwrap();
    let names: Vec<&str> = second
        .iter()
        .map(|h| h.resource().identity().symbolic_name())
        .collect();
    assert_eq!(names, vec!["app"]);
    assert_eq!(host.runtime().len(), 2);
}

#[tokio::test]
async fn highest_repository_version_is_chosen() {
    let host = TestHost::new();
    publish(&host, service_module("log", "1.0.0", "log", &[]));
    publish(&host, service_module("log", "1.2.0", "log", &[]));

    let handles = host.provision(&[service_requirement("log")]).await.unwrap();
    assert_eq!(handles[0].resource().identity().version(), &version("1.2.0"));
}

#[tokio::test]
async fn failed_start_rolls_back_earlier_installs() {
    let host = TestHost::new();
    let calls = Arc::new(ActivatorCalls::default());
    host.activators().register_instance(
        "Broken",
        Arc::new(RecordingActivator::new(Arc::clone(&calls)).failing_start()),
    );
    publish(&host, service_module("log", "1.0.0", "log", &[]));
    publish(
        &host,
        Resource::builder()
            .identity("app", version("1.0.0"))
            .provides(tessera_test::SERVICE_NAMESPACE, "app")
            .activator("Broken")
            .require(
                tessera_resource::Requirement::builder(tessera_test::SERVICE_NAMESPACE)
                    .filter("(service=log)"),
            )
            .build()
            .unwrap(),
    );

    let err = host
        .provision(&[service_requirement("app")])
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Install { ref resource, .. } if resource.symbolic_name() == "app"));
    assert!(host.runtime().is_empty());
    assert!(host.environment().runtime_store().is_empty());
    assert_eq!(calls.count("start"), 1);
}

#[tokio::test]
async fn unsatisfied_inner_requirement_aborts_everything() {
    let host = TestHost::new();
    publish(&host, service_module("app", "1.0.0", "app", &["missing"]));

    let err = host
        .provision(&[service_requirement("app")])
        .await
        .unwrap_err();
    match err {
        ProvisionError::UnsatisfiedRequirement { requirement, requirer } => {
            assert!(requirement.contains("missing"));
            assert_eq!(requirer.unwrap().symbolic_name(), "app");
        },
        other => panic!("unexpected error: {other}"),
    }
    assert!(host.runtime().is_empty());
}

#[tokio::test]
async fn cycle_is_reported_not_broken() {
    let host = TestHost::new();
    publish(&host, service_module("a", "1.0.0", "a", &["b"]));
    publish(&host, service_module("b", "1.0.0", "b", &["a"]));

    let err = host
        .provision(&[service_requirement("a")])
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::ResolutionCycle { .. }));
    assert!(host.runtime().is_empty());
}

#[tokio::test]
async fn host_installer_rollback_runs_in_reverse() {
    let host = TestHost::new();
    publish(&host, service_module("app", "1.0.0", "app", &["db"]));
    publish(&host, service_module("db", "1.0.0", "db", &["log"]));
    publish(&host, service_module("log", "1.0.0", "log", &[]));
    let installer = Arc::new(RecordingInstaller::new().failing_on("app"));

    let provisioner = Provisioner::new(
        Arc::clone(host.environment()) as _,
        Arc::clone(host.repository()) as _,
        Arc::clone(&installer) as _,
    );
    assert!(
        provisioner
            .provision_resources(&[service_requirement("app")])
            .await
            .is_err()
    );
    assert_eq!(installer.installed(), vec!["log", "db"]);
    assert_eq!(installer.uninstalled(), vec!["db", "log"]);
}

#[tokio::test]
async fn plan_installs_nothing() {
    let host = TestHost::new();
    publish(&host, service_module("app", "1.0.0", "app", &["log"]));
    publish(&host, service_module("log", "1.0.0", "log", &[]));

    let plan = host.provisioner().plan(&[service_requirement("app")]).unwrap();
    let names: Vec<&str> = plan.identities().iter().map(|id| id.symbolic_name()).collect();
    assert_eq!(names, vec!["log", "app"]);
    assert_eq!(plan.wires.len(), 2);
    assert!(host.runtime().is_empty());
}
