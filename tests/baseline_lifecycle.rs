//! End-to-end baseline operations through the provider interface, against
//! an in-memory OME.

use ome_provider::baseline::RESOURCE_TYPE;
use ome_provider::client::fake::{FakeOme, TaskAssignment};
use ome_provider::client::models::{
    Baseline, BaselineTarget, DeviceComplianceReport, JOB_STATUS_RUNNING,
};
use ome_provider::testing::{
    assert_error_contains, assert_plan_changes_attribute, assert_plan_no_changes,
    assert_plan_replaces, assert_plan_updates_in_place, assert_warning_contains, ProviderTester,
};
use ome_provider::{OmeProvider, ProviderError};
use serde_json::{json, Value};

fn inventory() -> FakeOme {
    FakeOme::new()
        .with_device(10, "SVC1", &[33])
        .with_device(20, "SVC2", &[33])
        .with_device(30, "SVC3", &[33])
        .with_compliance_template(7, "tpl1")
        .with_compliance_template(8, "tpl2")
}

async fn tester(fake: &FakeOme) -> ProviderTester<OmeProvider> {
    let tester = ProviderTester::new(OmeProvider::with_connector(fake.clone()));
    tester
        .configure(json!({"host": "ome.lab", "username": "admin", "password": "pw"}))
        .await
        .unwrap();
    tester
}

fn by_tags() -> Value {
    json!({
        "baseline_name": "b1",
        "ref_template_name": "tpl1",
        "device_servicetags": ["SVC1", "SVC2"],
        "schedule": false
    })
}

async fn create(tester: &ProviderTester<OmeProvider>, config: Value) -> Value {
    let plan = tester.plan_create(RESOURCE_TYPE, config).await.unwrap();
    tester
        .create(RESOURCE_TYPE, plan.planned_state)
        .await
        .unwrap()
        .state
}

#[tokio::test(start_paused = true)]
async fn create_by_tags_without_schedule() {
    let fake = inventory();
    fake.set_task_assignment(TaskAssignment::AfterReads(2));
    let tester = tester(&fake).await;

    let state = create(&tester, by_tags()).await;

    let payload = fake.last_payload().unwrap();
    assert_eq!(
        payload.baseline_targets,
        vec![BaselineTarget::device(10), BaselineTarget::device(20)]
    );
    assert!(payload.notification_settings.is_none());
    assert_eq!(fake.count_calls("baseline("), 2);

    assert_eq!(state["device_servicetags"], json!(["SVC1", "SVC2"]));
    assert_eq!(state["device_ids"], json!([]));
    assert_eq!(state["ref_template_id"], 7);
    assert!(state["task_id"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn create_with_schedule_and_email() {
    let fake = inventory();
    let tester = tester(&fake).await;

    let state = create(
        &tester,
        json!({
            "baseline_name": "b1",
            "ref_template_name": "tpl1",
            "device_servicetags": ["SVC1"],
            "schedule": true,
            "notify_on_schedule": true,
            "cron": "0 0 * * *",
            "email_addresses": ["ops@x.io"],
            "output_format": "pdf"
        }),
    )
    .await;

    let wire = serde_json::to_value(fake.last_payload().unwrap()).unwrap();
    assert_eq!(wire["NotificationSettings"]["NotificationType"], "NOTIFY_ON_SCHEDULE");
    assert_eq!(wire["NotificationSettings"]["OutputFormat"], "PDF");
    assert_eq!(wire["NotificationSettings"]["Schedule"]["Cron"], "0 0 * * *");
    assert_eq!(state["output_format"], "pdf");
}

#[tokio::test]
async fn invalid_email_is_rejected_before_any_call() {
    let fake = inventory();
    let tester = tester(&fake).await;
    let config = json!({
        "baseline_name": "b1",
        "ref_template_name": "tpl1",
        "device_servicetags": ["SVC1"],
        "schedule": true,
        "email_addresses": ["not-an-address"]
    });

    let diagnostics = tester
        .resource_diagnostics(RESOURCE_TYPE, config.clone())
        .await
        .unwrap();
    assert_error_contains(&diagnostics, "not-an-address");

    let err = tester.create(RESOURCE_TYPE, config).await.unwrap_err();
    assert!(matches!(err, ProviderError::Validation(ref m) if m.contains("not-an-address")));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn incapable_device_blocks_creation() {
    let fake = FakeOme::new()
        .with_device(10, "SVC1", &[1, 2])
        .with_device(20, "SVC2", &[33])
        .with_compliance_template(7, "tpl1");
    let tester = tester(&fake).await;

    let err = tester.create(RESOURCE_TYPE, by_tags()).await.unwrap_err();

    assert!(matches!(err, ProviderError::FailedPrecondition(ref m) if m.contains("SVC1")));
    assert!(!err.to_string().contains("SVC2"));
    assert_eq!(fake.mutations(), 0);
    let (opened, closed) = fake.sessions();
    assert_eq!(opened, closed);
}

#[tokio::test(start_paused = true)]
async fn timeout_with_partial_failure_warns() {
    let fake = inventory();
    fake.set_default_job_status(JOB_STATUS_RUNNING);
    let tester = tester(&fake).await;
    let mut config = by_tags();
    config["partial_failure"] = json!(true);

    let plan = tester.plan_create(RESOURCE_TYPE, config).await.unwrap();
    let created = tester.create(RESOURCE_TYPE, plan.planned_state).await.unwrap();

    assert!(created.state["id"].as_i64().is_some());
    assert_warning_contains(&created.diagnostics, "did not complete within 600 seconds");
    assert_eq!(fake.count_calls("job("), 30);
}

#[tokio::test(start_paused = true)]
async fn timeout_without_partial_failure_fails() {
    let fake = inventory();
    fake.set_default_job_status(JOB_STATUS_RUNNING);
    let tester = tester(&fake).await;

    let err = tester.create(RESOURCE_TYPE, by_tags()).await.unwrap_err();

    assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
}

#[tokio::test]
async fn update_while_job_running_is_refused() {
    let fake = inventory().with_baseline(Baseline {
        id: 5,
        name: "b1".into(),
        template_id: 7,
        template_name: Some("tpl1".into()),
        task_id: 777,
        baseline_targets: vec![BaselineTarget::device(10)],
        ..Baseline::default()
    });
    fake.script_job(777, [JOB_STATUS_RUNNING]);
    let tester = tester(&fake).await;
    let prior = json!({
        "id": 5,
        "baseline_name": "b1",
        "ref_template_id": 7,
        "ref_template_name": "tpl1",
        "device_servicetags": ["SVC1"],
        "task_id": 777
    });

    let plan = tester
        .plan_update(RESOURCE_TYPE, prior.clone(), by_tags())
        .await
        .unwrap();
    let err = tester
        .update(RESOURCE_TYPE, prior, plan.planned_state)
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::FailedPrecondition(ref m) if m.contains("777")));
    assert!(fake.last_payload().is_none());
    assert_eq!(fake.mutations(), 0);
}

#[tokio::test]
async fn reapplying_the_same_config_plans_nothing() {
    let fake = inventory();
    fake.set_reverse_targets(true);
    let tester = tester(&fake).await;

    let state = tester
        .lifecycle_create(RESOURCE_TYPE, by_tags())
        .await
        .unwrap();
    assert_eq!(state["device_servicetags"], json!(["SVC1", "SVC2"]));

    let plan = tester
        .plan_update(RESOURCE_TYPE, state.clone(), by_tags())
        .await
        .unwrap();
    assert_plan_no_changes(&plan);

    let refreshed = tester.read(RESOURCE_TYPE, state.clone()).await.unwrap().state;
    assert_eq!(refreshed, state);
}

#[tokio::test]
async fn target_change_updates_in_place() {
    let fake = inventory();
    let tester = tester(&fake).await;
    let state = tester
        .lifecycle_create(RESOURCE_TYPE, by_tags())
        .await
        .unwrap();
    let mut config = by_tags();
    config["device_servicetags"] = json!(["SVC3", "SVC1"]);

    let plan = tester
        .plan_update(RESOURCE_TYPE, state.clone(), config.clone())
        .await
        .unwrap();
    assert_plan_updates_in_place(&plan);
    assert_plan_changes_attribute(&plan, "device_servicetags");

    let updated = tester
        .lifecycle_update(RESOURCE_TYPE, state.clone(), config)
        .await
        .unwrap();

    assert_eq!(updated["id"], state["id"]);
    assert_eq!(updated["device_servicetags"], json!(["SVC3", "SVC1"]));
    assert_eq!(
        fake.last_payload().unwrap().baseline_targets,
        vec![BaselineTarget::device(30), BaselineTarget::device(10)]
    );
}

#[tokio::test]
async fn template_change_forces_replacement() {
    let fake = inventory();
    let tester = tester(&fake).await;
    let state = tester
        .lifecycle_create(RESOURCE_TYPE, by_tags())
        .await
        .unwrap();
    let mut config = by_tags();
    config["ref_template_name"] = json!("tpl2");

    let plan = tester
        .plan_update(RESOURCE_TYPE, state, config)
        .await
        .unwrap();

    assert_plan_replaces(&plan);
}

#[tokio::test]
async fn import_then_plan_is_stable() {
    let fake = inventory().with_baseline(Baseline {
        id: 5,
        name: "b1".into(),
        template_id: 7,
        template_name: Some("tpl1".into()),
        task_id: 40,
        baseline_targets: vec![BaselineTarget::device(20), BaselineTarget::device(10)],
        ..Baseline::default()
    });
    let tester = tester(&fake).await;

    let imported = tester.import_resource(RESOURCE_TYPE, "b1").await.unwrap();
    assert_eq!(imported.len(), 1);
    let state = imported[0].state.clone();
    assert_eq!(state["id"], 5);
    assert_eq!(state["device_servicetags"], json!(["SVC2", "SVC1"]));

    let plan = tester
        .plan_update(RESOURCE_TYPE, state, by_tags())
        .await
        .unwrap();
    assert_plan_no_changes(&plan);
}

#[tokio::test]
async fn read_of_deleted_baseline_removes_state() {
    let fake = inventory();
    let tester = tester(&fake).await;
    let state = tester
        .lifecycle_create(RESOURCE_TYPE, by_tags())
        .await
        .unwrap();
    fake.remove_baseline(state["id"].as_i64().unwrap());

    let refreshed = tester.read(RESOURCE_TYPE, state).await.unwrap();

    assert!(refreshed.state.is_null());
}

#[tokio::test]
async fn unknown_service_tag_is_named() {
    let fake = inventory();
    let tester = tester(&fake).await;
    let mut config = by_tags();
    config["device_servicetags"] = json!(["SVC1", "NOPE"]);

    let err = tester.create(RESOURCE_TYPE, config).await.unwrap_err();

    assert!(matches!(err, ProviderError::NotFound(ref m) if m.contains("NOPE")));
}

#[tokio::test]
async fn every_operation_releases_its_session() {
    let fake = inventory();
    let tester = tester(&fake).await;

    let state = tester
        .lifecycle_create(RESOURCE_TYPE, by_tags())
        .await
        .unwrap();
    let _ = tester.create(RESOURCE_TYPE, by_tags()).await;
    tester.lifecycle_delete(RESOURCE_TYPE, state).await.unwrap();

    let (opened, closed) = fake.sessions();
    assert_eq!(opened, 4);
    assert_eq!(opened, closed);
}

#[tokio::test]
async fn rejected_login_surfaces_as_permission_denied() {
    let fake = inventory();
    fake.set_reject_login(true);
    let tester = tester(&fake).await;

    let err = tester.create(RESOURCE_TYPE, by_tags()).await.unwrap_err();

    assert!(matches!(err, ProviderError::PermissionDenied(_)));
    assert_eq!(fake.mutations(), 0);
}

#[tokio::test]
async fn compliance_report_data_source() {
    let fake = inventory().with_baseline(Baseline {
        id: 5,
        name: "b1".into(),
        ..Baseline::default()
    });
    fake.set_compliance(
        5,
        vec![DeviceComplianceReport {
            id: 10,
            service_tag: "SVC1".into(),
            compliance_status: "NOT_COMPLIANT".into(),
            ..DeviceComplianceReport::default()
        }],
    );
    let tester = tester(&fake).await;

    let report = tester
        .read_data_source(
            "ome_configuration_report_info",
            json!({"baseline_name": "b1", "fetch_attributes": true}),
        )
        .await
        .unwrap();

    assert_eq!(report["id"], 5);
    assert_eq!(report["compliance_report_device"][0]["device_servicetag"], "SVC1");
    assert_eq!(report["compliance_report_device"][0]["device_compliance_details"], "");
}
