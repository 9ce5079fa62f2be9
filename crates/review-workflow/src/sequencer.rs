//! 阶段编排器
//!
//! 规范阶段顺序和默认落地逻辑。不持有任何状态，每次调用都从当前病例状态重新计算。

use crate::gate::{CaseQueries, Prerequisite, WorkflowGate};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};

/// 单个阶段的可达性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage: Stage,
    pub prerequisite: Prerequisite,
    pub enterable: bool,
}

/// 阶段编排器
#[derive(Debug, Clone, Default)]
pub struct StageSequencer {
    gate: WorkflowGate,
}

impl StageSequencer {
    pub fn new(gate: WorkflowGate) -> Self {
        Self { gate }
    }

    /// 规范阶段列表，闸门和导航界面共用
    pub fn stages(&self) -> &'static [Stage] {
        &Stage::ALL
    }

    pub fn gate(&self) -> &WorkflowGate {
        &self.gate
    }

    /// 按顺序扫描，返回第一个自身前置条件未满足的阶段
    pub fn first_blocked_stage<Q: CaseQueries + ?Sized>(&self, queries: &Q) -> Option<Stage> {
        self.stages()
            .iter()
            .copied()
            .find(|stage| !self.gate.can_enter(*stage, queries))
    }

    /// 默认落地阶段
    ///
    /// 落在第一个被阻塞阶段的前一阶段，即结果仍缺失、用户需要继续工作的阶段。
    /// 所有阶段都满足时返回打开影像。
    pub fn first_unsatisfied_stage<Q: CaseQueries + ?Sized>(&self, queries: &Q) -> Stage {
        self.first_blocked_stage(queries)
            .and_then(|blocked| blocked.previous())
            .unwrap_or(Stage::OpenImage)
    }

    /// 所有阶段的可达性报告
    pub fn stage_report<Q: CaseQueries + ?Sized>(&self, queries: &Q) -> Vec<StageStatus> {
        self.stages()
            .iter()
            .map(|&stage| {
                let prerequisite = self.gate.prerequisite(stage);
                StageStatus {
                    stage,
                    prerequisite,
                    enterable: prerequisite.is_met(queries),
                }
            })
            .collect()
    }
}
