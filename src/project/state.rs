// Project state: the single mutable record threaded through every phase

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::errors::{ProjectError, TransitionError};
use super::types::{
    CleanupRecord, ExtensionOutcome, ExtensionStatus, OverallStatus, Phase, PhaseStatus,
    ProjectConfig, ProjectId, ResourceHandle, ResourceHandles,
};

/// One entry of the append-only error log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub phase: Phase,
    pub error: ProjectError,
    pub at: DateTime<Utc>,
}

/// Mutable record of one creation call.
///
/// Fields are private so that the id stays fixed, handles only appear together
/// with their phase completing, and phases only move forward.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectState {
    id: ProjectId,
    config: ProjectConfig,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_phases")]
    phase_status: BTreeMap<Phase, PhaseStatus>,
    handles: ResourceHandles,
    extension_results: Vec<ExtensionOutcome>,
    extension_data: Map<String, Value>,
    cleanup: Vec<CleanupRecord>,
    errors: Vec<ErrorRecord>,
    overall_status: Option<OverallStatus>,
}

// BTreeMap keys are ordered by declaration order of Phase, which is execution order
fn serialize_phases<S: Serializer>(
    phases: &BTreeMap<Phase, PhaseStatus>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(phases.len()))?;
    for (phase, status) in phases {
        map.serialize_entry(phase.as_str(), status)?;
    }
    map.end()
}

impl ProjectState {
    pub fn new(config: ProjectConfig) -> Self {
        Self {
            id: ProjectId::new(),
            config,
            created_at: Utc::now(),
            finished_at: None,
            phase_status: Phase::ALL
                .iter()
                .map(|phase| (*phase, PhaseStatus::NotStarted))
                .collect(),
            handles: ResourceHandles::default(),
            extension_results: Vec::new(),
            extension_data: Map::new(),
            cleanup: Vec::new(),
            errors: Vec::new(),
            overall_status: None,
        }
    }

    pub fn id(&self) -> &ProjectId {
        &self.id
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn phase_status(&self, phase: Phase) -> PhaseStatus {
        self.phase_status
            .get(&phase)
            .copied()
            .unwrap_or(PhaseStatus::NotStarted)
    }

    /// Phase statuses in execution order
    pub fn phases(&self) -> impl Iterator<Item = (Phase, PhaseStatus)> + '_ {
        self.phase_status.iter().map(|(p, s)| (*p, *s))
    }

    pub fn failed_phase(&self) -> Option<Phase> {
        self.phases()
            .find(|(_, status)| *status == PhaseStatus::Failed)
            .map(|(phase, _)| phase)
    }

    pub fn handles(&self) -> &ResourceHandles {
        &self.handles
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.handles.schema.as_ref().map(|h| h.schema_name.as_str())
    }

    pub fn collection_name(&self) -> Option<&str> {
        self.handles
            .collection
            .as_ref()
            .map(|h| h.collection_name.as_str())
    }

    pub fn extension_results(&self) -> &[ExtensionOutcome] {
        &self.extension_results
    }

    pub fn has_failed_extensions(&self) -> bool {
        self.extension_results
            .iter()
            .any(|o| o.status == ExtensionStatus::Failed)
    }

    pub fn extension_data(&self, key: &str) -> Option<&Value> {
        self.extension_data.get(key)
    }

    /// Shared channel between extensions
    pub fn set_extension_data(&mut self, key: impl Into<String>, value: Value) {
        self.extension_data.insert(key.into(), value);
    }

    pub fn cleanup_report(&self) -> &[CleanupRecord] {
        &self.cleanup
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn overall_status(&self) -> Option<OverallStatus> {
        self.overall_status
    }

    pub(crate) fn begin(&mut self, phase: Phase) -> Result<(), TransitionError> {
        if let Some(failed) = self.failed_phase() {
            return Err(TransitionError::AfterFailure { phase, failed });
        }
        self.advance(phase, PhaseStatus::InProgress)
    }

    /// Attach a backend handle and complete its phase in one step
    pub(crate) fn complete_with(&mut self, handle: ResourceHandle) -> Result<(), TransitionError> {
        let phase = handle.backend().phase();
        self.advance(phase, PhaseStatus::Completed)?;
        self.handles.attach(handle);
        Ok(())
    }

    pub(crate) fn complete(&mut self, phase: Phase) -> Result<(), TransitionError> {
        self.advance(phase, PhaseStatus::Completed)
    }

    pub(crate) fn fail(&mut self, phase: Phase, error: ProjectError) -> Result<(), TransitionError> {
        self.record_error(phase, error);
        self.advance(phase, PhaseStatus::Failed)
    }

    pub(crate) fn record_error(&mut self, phase: Phase, error: ProjectError) {
        self.errors.push(ErrorRecord {
            phase,
            error,
            at: Utc::now(),
        });
    }

    pub(crate) fn record_extension(&mut self, outcome: ExtensionOutcome) {
        self.extension_results.push(outcome);
    }

    pub(crate) fn record_cleanup(&mut self, record: CleanupRecord) {
        self.cleanup.push(record);
    }

    pub(crate) fn finish(&mut self, status: OverallStatus) -> Result<(), TransitionError> {
        if self.overall_status.is_some() {
            return Err(TransitionError::AlreadyFinished);
        }
        self.overall_status = Some(status);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn advance(&mut self, phase: Phase, to: PhaseStatus) -> Result<(), TransitionError> {
        let from = self.phase_status(phase);
        if !from.can_advance_to(to) {
            return Err(TransitionError::InvalidTransition { phase, from, to });
        }
        self.phase_status.insert(phase, to);
        Ok(())
    }
}
