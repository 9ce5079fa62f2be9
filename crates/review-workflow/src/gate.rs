//! 工作流闸门
//!
//! 纯判定：给定病例状态，目标阶段能否进入。只比较目标阶段自身的前置条件。

use crate::stage::Stage;
use review_core::Case;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 闸门所依赖的病例派生查询
pub trait CaseQueries {
    fn is_case_valid(&self) -> bool;

    fn candidates_exist(&self) -> bool;

    fn nodules_exist(&self) -> bool;
}

impl CaseQueries for Case {
    fn is_case_valid(&self) -> bool {
        self.is_valid()
    }

    fn candidates_exist(&self) -> bool {
        Case::candidates_exist(self)
    }

    fn nodules_exist(&self) -> bool {
        Case::nodules_exist(self)
    }
}

/// 阶段前置条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prerequisite {
    /// 入口阶段，总是满足
    Always,
    CandidatesExist,
    NodulesExist,
}

impl Prerequisite {
    pub fn is_met<Q: CaseQueries + ?Sized>(&self, queries: &Q) -> bool {
        match self {
            Self::Always => true,
            Self::CandidatesExist => queries.candidates_exist(),
            Self::NodulesExist => queries.nodules_exist(),
        }
    }
}

/// 工作流闸门
#[derive(Debug, Clone)]
pub struct WorkflowGate {
    prerequisites: HashMap<Stage, Prerequisite>,
}

impl WorkflowGate {
    /// 创建带有标准前置条件表的闸门
    pub fn new() -> Self {
        let mut prerequisites = HashMap::new();

        prerequisites.insert(Stage::OpenImage, Prerequisite::Always);
        prerequisites.insert(Stage::DetectAndSelect, Prerequisite::CandidatesExist);
        prerequisites.insert(Stage::AnnotateAndSegment, Prerequisite::NodulesExist);
        prerequisites.insert(Stage::ReportAndExport, Prerequisite::NodulesExist);

        Self { prerequisites }
    }

    /// 阶段的前置条件，表外阶段视为入口
    pub fn prerequisite(&self, stage: Stage) -> Prerequisite {
        self.prerequisites
            .get(&stage)
            .copied()
            .unwrap_or(Prerequisite::Always)
    }

    /// 能否进入目标阶段
    pub fn can_enter<Q: CaseQueries + ?Sized>(&self, stage: Stage, queries: &Q) -> bool {
        self.prerequisite(stage).is_met(queries)
    }
}

impl Default for WorkflowGate {
    fn default() -> Self {
        Self::new()
    }
}
