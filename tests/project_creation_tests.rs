//! End-to-end project creation against the in-memory stores
//!
//! Drives the public router and orchestrator the way the CLI does, with the
//! SEO extension wired in, and checks the recorded state plus what is left
//! behind in each store.

use project_orchestrator::external::{InMemorySeoBootstrapper, Operation};
use project_orchestrator::project::{Backend, ExtensionStatus, ProjectSettings, Resource};
use project_orchestrator::{
    ClientError, InMemoryBackends, OverallStatus, Phase, PhaseStatus, ProjectConfig, ProjectError,
    ProjectOrchestrator, ProjectOrchestratorRouter, SeoExtension,
};
use serde_json::json;
use std::sync::Arc;

fn router_with_seo() -> (ProjectOrchestratorRouter, InMemoryBackends, Arc<InMemorySeoBootstrapper>) {
    let backends = InMemoryBackends::new();
    let seo = Arc::new(InMemorySeoBootstrapper::new());
    let orchestrator = ProjectOrchestrator::in_memory(&backends)
        .with_extension(Arc::new(SeoExtension::new(seo.clone())))
        .unwrap();
    (ProjectOrchestratorRouter::new(orchestrator), backends, seo)
}

fn seo_config(name: &str) -> ProjectConfig {
    ProjectConfig::new(name)
        .with_description(json!({"audience": "home baristas"}))
        .with_setting("seo_enabled", true)
        .with_setting("bootstrap_seo_terrain", true)
        .with_setting("seed_topics", json!(["espresso", "grinders"]))
}

#[tokio::test]
async fn test_content_project_with_seo_terrain() {
    let (router, backends, seo) = router_with_seo();

    let state = router.create_project(seo_config("Coffee Blog")).await.unwrap();

    assert_eq!(state.overall_status(), Some(OverallStatus::Success));
    assert!(state.phases().all(|(_, status)| status == PhaseStatus::Completed));
    assert!(seo.contains(state.id()));

    let outcome = &state.extension_results()[0];
    assert_eq!(outcome.name, "seo");
    assert_eq!(outcome.status, ExtensionStatus::Completed);
    let output = outcome.output.as_ref().unwrap();
    assert_eq!(output["keywords_found"], json!(6));
    assert_eq!(output["opportunities_found"], json!(2));

    let seo_data = state.extension_data("seo").unwrap();
    assert_eq!(seo_data["location"], json!("United States"));
    assert_eq!(seo_data["language"], json!("en"));

    let record = router.get_project(state.id()).await.unwrap().unwrap();
    assert_eq!(record.name, "Coffee Blog");
    assert_eq!(Some(record.schema_name.as_str()), state.schema_name());
    assert_eq!(record.description, json!({"audience": "home baristas"}));
    assert_eq!(backends.journal.count(Backend::Database, Operation::Validate), 1);
}

#[tokio::test]
async fn test_seo_skipped_when_not_enabled() {
    let (router, _backends, seo) = router_with_seo();

    let state = router.create_project(ProjectConfig::new("Plain")).await.unwrap();

    assert_eq!(state.overall_status(), Some(OverallStatus::Success));
    assert!(!seo.contains(state.id()));
    assert_eq!(
        state.extension_data("seo"),
        Some(&json!({"status": "skipped", "reason": "not_enabled"}))
    );
}

#[tokio::test]
async fn test_seo_failure_only_degrades_the_project() {
    let (router, backends, seo) = router_with_seo();
    seo.fail_with(ClientError::transient("keyword service unavailable"));

    let state = router.create_project(seo_config("Tea Blog")).await.unwrap();

    assert_eq!(state.overall_status(), Some(OverallStatus::PartialSuccess));
    assert!(backends.journal.backends_for(Operation::Delete).is_empty());
    assert!(backends.holds_any(state.id()));
    assert_eq!(state.errors().len(), 1);
    assert_eq!(state.errors()[0].phase, Phase::Extensions);
}

#[tokio::test]
async fn test_failed_terrain_bootstrap_leaves_no_seo_module() {
    let (router, _backends, seo) = router_with_seo();
    seo.fail_terrain_with(ClientError::transient("keyword api throttled"));

    let state = router.create_project(seo_config("Half Set Up")).await.unwrap();

    assert_eq!(state.overall_status(), Some(OverallStatus::PartialSuccess));
    assert_eq!(state.extension_results()[0].status, ExtensionStatus::Failed);
    assert!(!seo.contains(state.id()));
}

#[tokio::test]
async fn test_failed_terrain_bootstrap_then_rollback_leaves_nothing() {
    let (router, backends, seo) = router_with_seo();
    seo.fail_terrain_with(ClientError::transient("keyword api throttled"));
    backends
        .templates
        .fail_on(Operation::Validate, ClientError::mismatch("no templates adapted"));

    let state = router.create_project(seo_config("Rolled Back")).await.unwrap();

    assert_eq!(state.overall_status(), Some(OverallStatus::Failure));
    assert!(!seo.contains(state.id()));
    assert!(!backends.holds_any(state.id()));
}

#[tokio::test]
async fn test_template_failure_compensates_in_reverse_order() {
    let (router, backends, _seo) = router_with_seo();
    backends
        .templates
        .fail_on(Operation::Create, ClientError::permanent("catalog unavailable"));

    let state = router.create_project(seo_config("Doomed")).await.unwrap();

    assert_eq!(state.overall_status(), Some(OverallStatus::Failure));
    assert_eq!(state.failed_phase(), Some(Phase::Templates));
    assert_eq!(state.phase_status(Phase::Extensions), PhaseStatus::NotStarted);
    assert_eq!(state.phase_status(Phase::Validation), PhaseStatus::NotStarted);
    assert_eq!(
        backends.journal.backends_for(Operation::Delete),
        vec![Backend::VectorStore, Backend::Database]
    );
    assert!(!backends.holds_any(state.id()));
    assert!(router.get_project(state.id()).await.unwrap().is_none());

    let cleaned: Vec<&Resource> = state.cleanup_report().iter().map(|r| &r.resource).collect();
    assert_eq!(
        cleaned,
        vec![
            &Resource::Backend(Backend::VectorStore),
            &Resource::Backend(Backend::Database)
        ]
    );
}

#[tokio::test]
async fn test_validation_failure_compensates_everything() {
    let (router, backends, _seo) = router_with_seo();
    backends
        .vectors
        .fail_on(Operation::Validate, ClientError::mismatch("collection owned elsewhere"));

    let state = router.create_project(ProjectConfig::new("Mismatched")).await.unwrap();

    assert_eq!(state.overall_status(), Some(OverallStatus::Failure));
    assert_eq!(state.failed_phase(), Some(Phase::Validation));
    assert_eq!(
        backends.journal.backends_for(Operation::Delete),
        vec![Backend::Templates, Backend::VectorStore, Backend::Database]
    );
    assert!(matches!(
        state.errors()[0].error,
        ProjectError::ResourceValidate {
            resource: Resource::Backend(Backend::VectorStore),
            ..
        }
    ));
}

#[tokio::test]
async fn test_duplicate_project_name_fails_without_touching_the_original() {
    let (router, backends, _seo) = router_with_seo();

    let first = router.create_project(ProjectConfig::new("Shared")).await.unwrap();
    let second = router.create_project(ProjectConfig::new("Shared")).await.unwrap();

    assert_eq!(first.overall_status(), Some(OverallStatus::Success));
    assert_eq!(second.overall_status(), Some(OverallStatus::Failure));
    assert_eq!(second.failed_phase(), Some(Phase::Database));
    // Nothing was created for the second project, so nothing is deleted
    assert!(backends.journal.backends_for(Operation::Delete).is_empty());
    assert!(backends.holds_any(first.id()));
    assert!(backends.relational.contains(first.id()));
    assert_eq!(backends.relational.len(), 1);
}

#[tokio::test]
async fn test_concurrent_creations_stay_independent() {
    let backends = InMemoryBackends::new();
    let orchestrator = ProjectOrchestrator::in_memory(&backends);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .create_project(ProjectConfig::new(format!("Project {i}")))
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let state = handle.await.unwrap().unwrap();
        assert_eq!(state.overall_status(), Some(OverallStatus::Success));
        ids.push(*state.id());
    }

    ids.sort_by_key(|id| id.to_string());
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(backends.relational.len(), 8);
    assert_eq!(backends.journal.count(Backend::Templates, Operation::Create), 8);
}

#[tokio::test]
async fn test_template_adaptation_follows_content_types() {
    let backends = InMemoryBackends::new();
    let orchestrator = ProjectOrchestrator::in_memory(&backends);
    let settings = ProjectSettings {
        content_types: vec!["article".to_string()],
        ..ProjectSettings::default()
    };

    let state = orchestrator
        .create_project(ProjectConfig::new("Articles").with_settings(settings))
        .await
        .unwrap();

    let templates = state.handles().templates.as_ref().unwrap();
    assert!(templates.adapted.iter().any(|t| t == "article_outline"));
    assert!(!templates.adapted.iter().any(|t| t == "product_description"));
    assert!(templates.skipped > 0);
}

#[tokio::test]
async fn test_unknown_project_type_is_rejected_before_any_call() {
    let (router, backends, _seo) = router_with_seo();

    let result = router
        .create_project(ProjectConfig::new("Odd").with_project_type("podcast"))
        .await;

    assert!(result.is_err());
    assert!(backends.journal.is_empty());
}

#[tokio::test]
async fn test_state_serializes_phases_in_execution_order() {
    let (router, _backends, _seo) = router_with_seo();

    let state = router.create_project(ProjectConfig::new("Serialized")).await.unwrap();
    let value = serde_json::to_value(&state).unwrap();

    assert_eq!(value["overall_status"], json!("success"));
    let rendered = serde_json::to_string(&value["phase_status"]).unwrap();
    let database = rendered.find("database").unwrap();
    let validation = rendered.find("validation").unwrap();
    assert!(database < validation);
}
