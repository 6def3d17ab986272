// Property-based testing of phase ordering and compensation
// Injects a failure at an arbitrary point and checks the state and the store journal

use project_orchestrator::external::Operation;
use project_orchestrator::project::Backend;
use project_orchestrator::{
    ClientError, InMemoryBackends, OverallStatus, Phase, PhaseStatus, ProjectConfig,
    ProjectOrchestrator, ProjectState,
};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Injection {
    None,
    Create(Backend),
    Validate(Backend),
}

fn backend_strategy() -> impl Strategy<Value = Backend> {
    prop_oneof![
        Just(Backend::Database),
        Just(Backend::VectorStore),
        Just(Backend::Templates),
    ]
}

fn injection_strategy() -> impl Strategy<Value = Injection> {
    prop_oneof![
        Just(Injection::None),
        backend_strategy().prop_map(Injection::Create),
        backend_strategy().prop_map(Injection::Validate),
    ]
}

fn error_strategy() -> impl Strategy<Value = ClientError> {
    prop_oneof![
        "[a-z ]{1,16}".prop_map(ClientError::transient),
        "[a-z ]{1,16}".prop_map(ClientError::permanent),
        (1u64..60_000).prop_map(|timeout_ms| ClientError::Timeout { timeout_ms }),
    ]
}

fn inject(backends: &InMemoryBackends, backend: Backend, operation: Operation, error: ClientError) {
    match backend {
        Backend::Database => backends.relational.fail_on(operation, error),
        Backend::VectorStore => backends.vectors.fail_on(operation, error),
        Backend::Templates => backends.templates.fail_on(operation, error),
    }
}

fn run(injection: Injection, error: ClientError, cleanup_failure: Option<Backend>) -> (ProjectState, InMemoryBackends) {
    let backends = InMemoryBackends::new();
    match injection {
        Injection::None => {}
        Injection::Create(backend) => inject(&backends, backend, Operation::Create, error.clone()),
        Injection::Validate(backend) => inject(&backends, backend, Operation::Validate, error.clone()),
    }
    if let Some(backend) = cleanup_failure {
        inject(&backends, backend, Operation::Delete, ClientError::transient("delete refused"));
    }

    let orchestrator = ProjectOrchestrator::in_memory(&backends);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let state = runtime
        .block_on(orchestrator.create_project(ProjectConfig::new("Property Project")))
        .unwrap();
    (state, backends)
}

fn phase_index(phase: Phase) -> usize {
    Phase::ALL.iter().position(|p| *p == phase).unwrap()
}

proptest! {
    #[test]
    fn prop_phases_before_failure_complete_and_after_never_start(
        injection in injection_strategy(),
        error in error_strategy(),
    ) {
        let (state, _backends) = run(injection, error, None);

        let failed = match injection {
            Injection::None => None,
            Injection::Create(backend) => Some(backend.phase()),
            Injection::Validate(_) => Some(Phase::Validation),
        };
        prop_assert_eq!(state.failed_phase(), failed);

        for (phase, status) in state.phases() {
            let expected = match failed {
                None => PhaseStatus::Completed,
                Some(f) if phase_index(phase) < phase_index(f) => PhaseStatus::Completed,
                Some(f) if phase == f => PhaseStatus::Failed,
                Some(_) => PhaseStatus::NotStarted,
            };
            prop_assert_eq!(status, expected, "phase {:?}", phase);
        }

        // Every phase that completed on a success path carries its handle
        for backend in Backend::ALL {
            prop_assert_eq!(
                state.handles().is_set(backend),
                state.phase_status(backend.phase()) == PhaseStatus::Completed
            );
        }
    }

    #[test]
    fn prop_compensation_deletes_created_backends_in_reverse_exactly_once(
        injection in injection_strategy(),
        error in error_strategy(),
        cleanup_failure in proptest::option::of(backend_strategy()),
    ) {
        let (state, backends) = run(injection, error, cleanup_failure);

        let created: Vec<Backend> = Backend::ALL
            .iter()
            .copied()
            .filter(|b| state.phase_status(b.phase()) == PhaseStatus::Completed)
            .collect();
        let deleted = backends.journal.backends_for(Operation::Delete);

        if matches!(injection, Injection::None) {
            prop_assert!(deleted.is_empty());
            prop_assert_eq!(state.overall_status(), Some(OverallStatus::Success));
            return Ok(());
        }

        let expected: Vec<Backend> = created.iter().rev().copied().collect();
        prop_assert_eq!(&deleted, &expected);
        prop_assert_eq!(state.cleanup_report().len(), expected.len());

        let cleanup_failed = cleanup_failure.is_some_and(|b| expected.contains(&b));
        let status = state.overall_status();
        if cleanup_failed {
            prop_assert_eq!(status, Some(OverallStatus::PartialFailure));
            prop_assert!(backends.holds_any(state.id()));
        } else {
            prop_assert_eq!(status, Some(OverallStatus::Failure));
            prop_assert!(!backends.holds_any(state.id()));
        }
    }
}
