//! 工作流执行上下文
//!
//! 每次转移都消费旧上下文、产出新上下文，阶段之间只通过这里传递数据

use chrono::{DateTime, Utc};

use crate::error::{FailureKind, FailureRecord, Stage};
use crate::models::{ArtifactRef, DocumentEvent, Section, SectionResult};
use crate::workflow::state::{StateTransition, WorkflowState};

/// 单个阶段成功时的产出
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    Validated,
    Extracted(Vec<Section>),
    Summarized(Vec<SectionResult>),
    Aggregated(ArtifactRef),
}

/// 执行上下文
#[derive(Debug, Clone)]
pub struct ExecutionCtx {
    execution_id: String,
    document: DocumentEvent,
    state: WorkflowState,
    sections: Vec<Section>,
    section_results: Vec<SectionResult>,
    artifact: Option<ArtifactRef>,
    failure: Option<FailureRecord>,
    transitions: Vec<StateTransition>,
    started_at: DateTime<Utc>,
}

impl ExecutionCtx {
    pub fn new(execution_id: impl Into<String>, document: DocumentEvent) -> Self {
        Self {
            execution_id: execution_id.into(),
            document,
            state: WorkflowState::CheckFileType,
            sections: Vec::new(),
            section_results: Vec::new(),
            artifact: None,
            failure: None,
            transitions: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn document(&self) -> &DocumentEvent {
        &self.document
    }

    pub fn document_id(&self) -> &str {
        &self.document.document_id
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section_results(&self) -> &[SectionResult] {
        &self.section_results
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        self.failure.as_ref()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// 应用一个阶段的结果，得到下一个状态的上下文
    ///
    /// 终态上调用不会发生任何转移。
    pub fn apply(self, step: Result<StageOutput, FailureRecord>) -> Self {
        let next = match &step {
            Ok(_) => self.state.on_success(),
            Err(_) => self.state.on_failure(),
        };
        let Some(next) = next else {
            return self;
        };

        let mut ctx = self;
        match step {
            Ok(StageOutput::Validated) => {}
            Ok(StageOutput::Extracted(sections)) => ctx.sections = sections,
            Ok(StageOutput::Summarized(results)) => ctx.section_results = results,
            Ok(StageOutput::Aggregated(artifact)) => ctx.artifact = Some(artifact),
            Err(failure) => ctx.failure = Some(failure),
        }
        ctx.transitions.push(StateTransition {
            from: ctx.state,
            to: next,
            at: Utc::now(),
        });
        ctx.state = next;
        ctx
    }

    /// 失败发生时所处的阶段
    pub fn current_stage(&self) -> Stage {
        match self.state {
            WorkflowState::CheckFileType => Stage::Validate,
            WorkflowState::ExtractText => Stage::Extract,
            WorkflowState::FanOutSummarize => Stage::Summarize,
            WorkflowState::AggregateSummaries
            | WorkflowState::NotifyCompletion
            | WorkflowState::NotifyFailure => Stage::Aggregate,
        }
    }

    /// 终态对应的执行结果
    pub fn outcome(&self) -> ExecutionOutcome {
        match (self.state, &self.artifact, &self.failure) {
            (WorkflowState::NotifyCompletion, Some(artifact), _) => ExecutionOutcome::Completed {
                execution_id: self.execution_id.clone(),
                document_id: self.document.document_id.clone(),
                artifact: artifact.clone(),
                section_count: self.section_results.len(),
                failed_sections: self.section_results.iter().filter(|r| r.is_failed()).count(),
            },
            (_, _, Some(failure)) => ExecutionOutcome::Failed {
                execution_id: self.execution_id.clone(),
                document_id: self.document.document_id.clone(),
                failure: failure.clone(),
            },
            (state, _, None) => ExecutionOutcome::Failed {
                execution_id: self.execution_id.clone(),
                document_id: self.document.document_id.clone(),
                failure: FailureRecord {
                    stage: self.current_stage(),
                    kind: FailureKind::PermanentTask,
                    cause: format!("执行停在 {} 状态但没有结果", state),
                    document_id: self.document.document_id.clone(),
                },
            },
        }
    }
}

/// 一次执行的终态结果，通知内容完全由它决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed {
        execution_id: String,
        document_id: String,
        artifact: ArtifactRef,
        section_count: usize,
        failed_sections: usize,
    },
    Failed {
        execution_id: String,
        document_id: String,
        failure: FailureRecord,
    },
}

impl ExecutionOutcome {
    pub fn execution_id(&self) -> &str {
        match self {
            ExecutionOutcome::Completed { execution_id, .. }
            | ExecutionOutcome::Failed { execution_id, .. } => execution_id,
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            ExecutionOutcome::Completed { document_id, .. }
            | ExecutionOutcome::Failed { document_id, .. } => document_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { .. })
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        match self {
            ExecutionOutcome::Failed { failure, .. } => Some(failure),
            ExecutionOutcome::Completed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionCtx {
        ExecutionCtx::new("exec-1", DocumentEvent::new("report.pdf", "inbox/report.pdf"))
    }

    #[test]
    fn test_failure_stamps_record_and_moves_to_notify_failure() {
        let record = FailureRecord::validation(Stage::Validate, "report.pdf", "类型不对");
        let ctx = ctx().apply(Err(record.clone()));

        assert_eq!(ctx.state(), WorkflowState::NotifyFailure);
        assert_eq!(ctx.failure(), Some(&record));
        assert_eq!(ctx.transitions().len(), 1);
        assert_eq!(ctx.outcome().failure(), Some(&record));
    }

    #[test]
    fn test_terminal_state_ignores_further_steps() {
        let record = FailureRecord::validation(Stage::Validate, "report.pdf", "类型不对");
        let ctx = ctx()
            .apply(Err(record))
            .apply(Ok(StageOutput::Validated))
            .apply(Err(FailureRecord::validation(Stage::Extract, "report.pdf", "again")));

        assert_eq!(ctx.state(), WorkflowState::NotifyFailure);
        assert_eq!(ctx.transitions().len(), 1);
        assert_eq!(ctx.failure().map(|f| f.stage), Some(Stage::Validate));
    }

    #[test]
    fn test_context_carries_forward_each_stage_output() {
        let sections = vec![Section::new(0, "intro", "text")];
        let ctx = ctx()
            .apply(Ok(StageOutput::Validated))
            .apply(Ok(StageOutput::Extracted(sections.clone())))
            .apply(Ok(StageOutput::Summarized(Vec::new())))
            .apply(Ok(StageOutput::Aggregated(ArtifactRef("out/report.summary".into()))));

        assert_eq!(ctx.state(), WorkflowState::NotifyCompletion);
        assert_eq!(ctx.sections(), sections.as_slice());
        assert!(ctx.outcome().is_completed());
        let visited: Vec<_> = ctx.transitions().iter().map(|t| t.to).collect();
        assert_eq!(
            visited,
            vec![
                WorkflowState::ExtractText,
                WorkflowState::FanOutSummarize,
                WorkflowState::AggregateSummaries,
                WorkflowState::NotifyCompletion,
            ]
        );
    }
}
