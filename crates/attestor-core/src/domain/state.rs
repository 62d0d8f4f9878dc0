//! State - 1 回の処理試行のステージ
//!
//! # 状態遷移
//! - Idle → Guarded → Acquiring → FetchingTask → FetchingClaim → Verifying → Submitting → Done
//! - どのステージからでも Error へ遷移しうる

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Guarded,
    Acquiring,
    FetchingTask,
    FetchingClaim,
    Verifying,
    Submitting,
    Done,
    Error,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Guarded => "guarded",
            PipelineStage::Acquiring => "acquiring",
            PipelineStage::FetchingTask => "fetching_task",
            PipelineStage::FetchingClaim => "fetching_claim",
            PipelineStage::Verifying => "verifying",
            PipelineStage::Submitting => "submitting",
            PipelineStage::Done => "done",
            PipelineStage::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Error)
    }

    /// Next stage on the happy path. Terminal stages have none.
    pub fn next(self) -> Option<PipelineStage> {
        use PipelineStage::*;
        match self {
            Idle => Some(Guarded),
            Guarded => Some(Acquiring),
            Acquiring => Some(FetchingTask),
            FetchingTask => Some(FetchingClaim),
            FetchingClaim => Some(Verifying),
            Verifying => Some(Submitting),
            Submitting => Some(Done),
            Done | Error => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_every_stage_once() {
        let mut stage = PipelineStage::Idle;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            stage = next;
            seen.push(stage);
        }
        assert_eq!(stage, PipelineStage::Done);
        assert_eq!(seen.len(), 8);
        assert!(!seen.contains(&PipelineStage::Error));
    }

    #[test]
    fn terminal_stages_have_no_successor() {
        assert!(PipelineStage::Done.next().is_none());
        assert!(PipelineStage::Error.next().is_none());
        assert!(PipelineStage::Error.is_terminal());
    }
}
