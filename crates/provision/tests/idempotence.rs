//! Re-running provisioning and teardown against the same project.

mod common;

use std::sync::Arc;

use hoist_cloud::{CloudProvider, FirewallRule, PortRule};
use hoist_provision::plan::{apply, plan, plan_destroy, Action};
use hoist_provision::scripts::ScriptRenderer;
use hoist_provision::{Blueprint, Provisioner, ResourceKind, Teardown};

use common::{config, FakeCloud};

fn blueprint(config: &hoist_provision::DeployConfig) -> Blueprint {
    let script = ScriptRenderer::new().unwrap().startup_script(config).unwrap();
    Blueprint::from_config(config, Some(script))
}

#[tokio::test]
async fn setup_twice_creates_nothing_new() {
    let cloud = FakeCloud::new();
    let config = config(&[]);

    let first = Provisioner::for_config(Arc::new(cloud.clone()), &config)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(first.created.len(), 12);
    assert!(first.existing.is_empty());
    assert_eq!(first.external_ip.as_deref(), Some("34.10.20.1"));

    let calls_after_first = cloud.calls();

    let second = Provisioner::for_config(Arc::new(cloud.clone()), &config)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert!(second.created.is_empty());
    assert_eq!(second.existing.len(), 12);
    assert_eq!(second.external_ip, first.external_ip);
    assert_eq!(cloud.calls(), calls_after_first, "second run must not mutate");
}

#[tokio::test]
async fn setup_wires_instance_to_derived_resources() {
    let cloud = FakeCloud::new();
    let config = config(&[("DNS_ZONE", "example-zone"), ("DOMAIN", "app.example.com")]);

    let report = Provisioner::for_config(Arc::new(cloud.clone()), &config)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.created.len(), 14);

    let instance = cloud.get_instance("app-server").await.unwrap();
    assert_eq!(instance.public_ip.as_deref(), Some("34.10.20.1"));
    assert_eq!(instance.tags, vec!["app-server"]);
    assert_eq!(
        instance.service_account.as_deref(),
        Some("app-server-sa@demo-project.iam.gserviceaccount.com")
    );
    assert!(instance.startup_script().unwrap().contains("git clone"));

    let record = cloud
        .get_dns_record("example-zone", "app.example.com.", "A")
        .await
        .unwrap();
    assert_eq!(record.rrdatas, vec!["34.10.20.1"]);

    cloud.with(|s| {
        let roles = &s.bindings["serviceAccount:app-server-sa@demo-project.iam.gserviceaccount.com"];
        assert!(roles.contains("roles/logging.logWriter"));
        assert!(roles.contains("roles/monitoring.metricWriter"));
        assert!(s.services.contains("dns.googleapis.com"));
    });
}

#[tokio::test]
async fn firewall_rules_expose_only_documented_ports() {
    let cloud = FakeCloud::new();
    let config = config(&[("ALLOWED_SOURCE_RANGES", "203.0.113.0/24")]);
    Provisioner::for_config(Arc::new(cloud.clone()), &config)
        .unwrap()
        .run()
        .await
        .unwrap();

    cloud.with(|s| {
        let mut ports: Vec<u16> = s
            .firewalls
            .values()
            .flat_map(FirewallRule::exposed_ports)
            .map(|p| p.parse().unwrap())
            .collect();
        ports.sort_unstable();
        assert_eq!(ports, vec![22, 80, 443, 3000, 5050, 5432, 8000, 8080, 11434]);
        assert!(s
            .firewalls
            .values()
            .all(|r| r.source_ranges == vec!["203.0.113.0/24".to_string()]
                && r.target_tags == vec!["app-server".to_string()]));
    });
}

#[tokio::test]
async fn plan_after_apply_has_no_changes() {
    let cloud = FakeCloud::new();
    let config = config(&[]);
    let blueprint = blueprint(&config);

    let initial = plan(&blueprint, &cloud).await.unwrap();
    assert!(initial.changes.iter().all(|c| c.action == Action::Create));
    assert_eq!(initial.summary(), "12 to add, 0 to change, 0 to destroy");

    let outputs = apply(&initial, &blueprint, &cloud).await.unwrap();
    assert_eq!(outputs.external_ip.as_deref(), Some("34.10.20.1"));

    let again = plan(&blueprint, &cloud).await.unwrap();
    assert!(again.is_empty(), "{:#?}", again.changes);
    assert!(again.changes.iter().all(|c| c.action == Action::NoChange));
    assert_eq!(again.summary(), "0 to add, 0 to change, 0 to destroy");
}

#[tokio::test]
async fn imperative_and_declarative_paths_agree() {
    let cloud = FakeCloud::new();
    let config = config(&[]);
    Provisioner::for_config(Arc::new(cloud.clone()), &config)
        .unwrap()
        .run()
        .await
        .unwrap();

    let result = plan(&blueprint(&config), &cloud).await.unwrap();
    assert!(result.is_empty(), "{:#?}", result.changes);
}

#[tokio::test]
async fn plan_updates_changed_firewall_and_script() {
    let cloud = FakeCloud::new();
    let config = config(&[]);
    let blueprint = blueprint(&config);
    apply(&plan(&blueprint, &cloud).await.unwrap(), &blueprint, &cloud)
        .await
        .unwrap();

    cloud.with(|s| {
        let rule = s.firewalls.get_mut("app-server-allow-web").unwrap();
        rule.allowed = vec![PortRule::tcp(&[80])];
        let instance = s.instances.get_mut("app-server").unwrap();
        instance
            .metadata
            .insert(hoist_cloud::STARTUP_SCRIPT_KEY.to_string(), "#!/bin/sh\n".to_string());
    });

    let drifted = plan(&blueprint, &cloud).await.unwrap();
    assert_eq!(drifted.summary(), "0 to add, 2 to change, 0 to destroy");

    apply(&drifted, &blueprint, &cloud).await.unwrap();
    let calls = cloud.calls();
    assert!(calls.contains(&"update_firewall app-server-allow-web".to_string()));
    assert!(calls.contains(&"update_startup_script app-server".to_string()));
    assert!(plan(&blueprint, &cloud).await.unwrap().is_empty());
}

#[tokio::test]
async fn machine_type_change_is_reported_not_applied() {
    let cloud = FakeCloud::new();
    let blueprint_small = blueprint(&config(&[]));
    apply(&plan(&blueprint_small, &cloud).await.unwrap(), &blueprint_small, &cloud)
        .await
        .unwrap();

    let bigger = blueprint(&config(&[("MACHINE_TYPE", "e2-standard-8")]));
    let result = plan(&bigger, &cloud).await.unwrap();
    assert_eq!(result.drift().count(), 1);
    assert!(result.is_empty());

    let before = cloud.calls();
    apply(&result, &bigger, &cloud).await.unwrap();
    assert_eq!(cloud.calls(), before);
    let instance = cloud.get_instance("app-server").await.unwrap();
    assert_eq!(instance.instance_type, "e2-standard-4");
}

#[tokio::test]
async fn cleanup_removes_everything_and_is_repeatable() {
    let cloud = FakeCloud::new();
    let config = config(&[("DNS_ZONE", "example-zone"), ("DOMAIN", "app.example.com")]);
    let setup = Provisioner::for_config(Arc::new(cloud.clone()), &config)
        .unwrap()
        .run()
        .await
        .unwrap();

    let teardown = Teardown::new(Arc::new(cloud.clone()), &config);
    let first = teardown.run().await.unwrap();
    assert!(cloud.is_empty());

    let created_non_api: Vec<_> = setup
        .created
        .iter()
        .filter(|id| id.kind != ResourceKind::Api)
        .cloned()
        .collect();
    assert_eq!(first.deleted.len(), created_non_api.len());
    for id in &created_non_api {
        assert!(first.deleted.contains(id), "{id} not deleted");
    }
    assert_eq!(first.deleted.first().unwrap().kind, ResourceKind::DnsRecord);
    assert_eq!(first.deleted.last().unwrap().kind, ResourceKind::ServiceAccount);

    // APIs stay enabled.
    assert!(cloud.with(|s| s.services.contains("compute.googleapis.com")));

    let second = teardown.run().await.unwrap();
    assert!(second.deleted.is_empty());
    assert_eq!(second.absent.len(), created_non_api.len());
}

#[tokio::test]
async fn cleanup_on_empty_project_is_safe() {
    // A fresh project: no APIs enabled, so every resource read is rejected.
    let cloud = FakeCloud::new();
    let config = config(&[("DNS_ZONE", "example-zone"), ("DOMAIN", "app.example.com")]);
    let report = Teardown::new(Arc::new(cloud.clone()), &config)
        .run()
        .await
        .unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(report.absent.len(), 10);
    assert!(cloud.calls().is_empty());

    let destroy = plan_destroy(&blueprint(&config), &cloud).await.unwrap();
    assert!(destroy.changes.is_empty());
}

#[tokio::test]
async fn cleanup_after_partial_setup_removes_what_exists() {
    // Setup got as far as compute; IAM was never enabled.
    let cloud = FakeCloud::new();
    let config = config(&[]);
    cloud.with(|s| {
        s.services.insert("compute.googleapis.com".to_string());
    });
    cloud.create_firewall(&hoist_provision::firewall::firewall_rules(&config)[0])
        .await
        .unwrap();

    let report = Teardown::new(Arc::new(cloud.clone()), &config)
        .run()
        .await
        .unwrap();
    assert_eq!(report.deleted.len(), 1);
    assert_eq!(report.deleted[0].name, "app-server-allow-ssh");
    assert_eq!(report.absent.last().unwrap().kind, ResourceKind::ServiceAccount);
    assert!(cloud.is_empty());
}

#[tokio::test]
async fn stale_dns_record_is_replaced() {
    let cloud = FakeCloud::new();
    let config = config(&[("DNS_ZONE", "example-zone"), ("DOMAIN", "app.example.com")]);
    let blueprint = blueprint(&config);
    apply(&plan(&blueprint, &cloud).await.unwrap(), &blueprint, &cloud)
        .await
        .unwrap();

    cloud.with(|s| {
        let key = ("example-zone".to_string(), "app.example.com.".to_string());
        s.records.get_mut(&key).unwrap().rrdatas = vec!["198.51.100.7".to_string()];
    });

    let stale = plan(&blueprint, &cloud).await.unwrap();
    assert_eq!(stale.summary(), "0 to add, 1 to change, 0 to destroy");
    assert!(stale.drift().next().is_none());

    apply(&stale, &blueprint, &cloud).await.unwrap();
    let record = cloud
        .get_dns_record("example-zone", "app.example.com.", "A")
        .await
        .unwrap();
    assert_eq!(record.rrdatas, vec!["34.10.20.1"]);
    assert!(plan(&blueprint, &cloud).await.unwrap().is_empty());
}

#[tokio::test]
async fn destroy_plan_lists_existing_resources_in_reverse() {
    let cloud = FakeCloud::new();
    let config = config(&[]);
    let blueprint = blueprint(&config);
    apply(&plan(&blueprint, &cloud).await.unwrap(), &blueprint, &cloud)
        .await
        .unwrap();

    let destroy = plan_destroy(&blueprint, &cloud).await.unwrap();
    assert_eq!(destroy.summary(), "0 to add, 0 to change, 9 to destroy");
    assert_eq!(destroy.changes[0].resource.kind, ResourceKind::Instance);

    apply(&destroy, &blueprint, &cloud).await.unwrap();
    assert!(cloud.is_empty());
    assert!(plan_destroy(&blueprint, &cloud).await.unwrap().changes.is_empty());
}

#[tokio::test]
async fn disabled_api_plans_dependents_as_creates() {
    let cloud = FakeCloud::new();
    let blueprint = blueprint(&config(&[]));
    let result = plan(&blueprint, &cloud as &dyn CloudProvider).await.unwrap();
    let firewall_actions: Vec<_> = result
        .changes
        .iter()
        .filter(|c| c.resource.kind == ResourceKind::FirewallRule)
        .map(|c| c.action.clone())
        .collect();
    assert_eq!(firewall_actions.len(), 6);
    assert!(firewall_actions.iter().all(|a| *a == Action::Create));
}
