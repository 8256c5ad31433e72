//! 工作流状态机
//!
//! 转移表：
//!
//! ```text
//! CheckFileType ──ok──▶ ExtractText ──ok──▶ FanOutSummarize ──ok──▶ AggregateSummaries ──ok──▶ NotifyCompletion
//!       │                    │                    │                       │
//!       └────────err─────────┴─────────err────────┴──────────err──────────┴──────▶ NotifyFailure
//! ```
//!
//! 终态没有任何出边，非终态之间只能前进。

use std::fmt;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    CheckFileType,
    ExtractText,
    FanOutSummarize,
    AggregateSummaries,
    NotifyCompletion,
    NotifyFailure,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::NotifyCompletion | WorkflowState::NotifyFailure
        )
    }

    /// 当前阶段成功后的下一个状态，终态返回 `None`
    pub fn on_success(self) -> Option<WorkflowState> {
        match self {
            WorkflowState::CheckFileType => Some(WorkflowState::ExtractText),
            WorkflowState::ExtractText => Some(WorkflowState::FanOutSummarize),
            WorkflowState::FanOutSummarize => Some(WorkflowState::AggregateSummaries),
            WorkflowState::AggregateSummaries => Some(WorkflowState::NotifyCompletion),
            WorkflowState::NotifyCompletion | WorkflowState::NotifyFailure => None,
        }
    }

    /// 当前阶段失败后的下一个状态，终态返回 `None`
    pub fn on_failure(self) -> Option<WorkflowState> {
        if self.is_terminal() {
            None
        } else {
            Some(WorkflowState::NotifyFailure)
        }
    }

    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        self.on_success() == Some(next) || self.on_failure() == Some(next)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::CheckFileType => "CheckFileType",
            WorkflowState::ExtractText => "ExtractText",
            WorkflowState::FanOutSummarize => "FanOutSummarize",
            WorkflowState::AggregateSummaries => "AggregateSummaries",
            WorkflowState::NotifyCompletion => "NotifyCompletion",
            WorkflowState::NotifyFailure => "NotifyFailure",
        };
        f.write_str(name)
    }
}

/// 一次状态转移记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [WorkflowState; 6] = [
        WorkflowState::CheckFileType,
        WorkflowState::ExtractText,
        WorkflowState::FanOutSummarize,
        WorkflowState::AggregateSummaries,
        WorkflowState::NotifyCompletion,
        WorkflowState::NotifyFailure,
    ];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for state in [WorkflowState::NotifyCompletion, WorkflowState::NotifyFailure] {
            assert!(state.is_terminal());
            assert!(ALL.iter().all(|next| !state.can_transition_to(*next)));
        }
    }

    #[test]
    fn test_nothing_transitions_back_to_check_file_type() {
        assert!(ALL
            .iter()
            .all(|state| !state.can_transition_to(WorkflowState::CheckFileType)));
    }

    #[test]
    fn test_every_non_terminal_state_can_fail() {
        for state in ALL.iter().filter(|s| !s.is_terminal()) {
            assert_eq!(state.on_failure(), Some(WorkflowState::NotifyFailure));
        }
    }

    #[test]
    fn test_happy_path_reaches_completion_in_four_steps() {
        let mut state = WorkflowState::CheckFileType;
        let mut steps = 0;
        while let Some(next) = state.on_success() {
            state = next;
            steps += 1;
        }
        assert_eq!(state, WorkflowState::NotifyCompletion);
        assert_eq!(steps, 4);
    }
}
