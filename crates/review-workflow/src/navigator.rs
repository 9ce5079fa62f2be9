//! 导航拦截器
//!
//! 每次阶段切换前咨询闸门。被拒绝时停留在当前阶段，从不重定向到其它阶段；
//! 重定向只发生在显式的落地调用中。

use crate::gate::CaseQueries;
use crate::sequencer::StageSequencer;
use crate::stage::Stage;
use tracing::{debug, info};

/// 导航结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// 已进入目标阶段
    Entered(Stage),
    /// 停留在当前阶段；`requested` 为无法识别的路径时为空
    Stayed {
        current: Stage,
        requested: Option<Stage>,
    },
}

impl NavigationOutcome {
    pub fn is_entered(&self) -> bool {
        matches!(self, Self::Entered(_))
    }
}

/// 导航拦截器
#[derive(Debug, Clone)]
pub struct Navigator {
    sequencer: StageSequencer,
    current: Stage,
}

impl Navigator {
    /// 从入口阶段开始
    pub fn new(sequencer: StageSequencer) -> Self {
        Self {
            sequencer,
            current: Stage::OpenImage,
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn sequencer(&self) -> &StageSequencer {
        &self.sequencer
    }

    /// 尝试进入目标阶段
    pub fn navigate<Q: CaseQueries + ?Sized>(&mut self, target: Stage, queries: &Q) -> NavigationOutcome {
        if self.sequencer.gate().can_enter(target, queries) {
            info!("Navigating from {} to {}", self.current, target);
            self.current = target;
            NavigationOutcome::Entered(target)
        } else {
            debug!(
                "Navigation to {} denied: {:?} unmet, staying on {}",
                target,
                self.sequencer.gate().prerequisite(target),
                self.current
            );
            NavigationOutcome::Stayed {
                current: self.current,
                requested: Some(target),
            }
        }
    }

    /// 按导航路径切换，未知路径停留
    pub fn navigate_path<Q: CaseQueries + ?Sized>(&mut self, path: &str, queries: &Q) -> NavigationOutcome {
        match Stage::from_path(path) {
            Some(target) => self.navigate(target, queries),
            None => {
                debug!("Unknown stage path {}, staying on {}", path, self.current);
                NavigationOutcome::Stayed {
                    current: self.current,
                    requested: None,
                }
            }
        }
    }

    /// 移动到默认落地阶段
    pub fn land<Q: CaseQueries + ?Sized>(&mut self, queries: &Q) -> Stage {
        let landing = self.sequencer.first_unsatisfied_stage(queries);
        info!("Landing on {}", landing);
        self.current = landing;
        landing
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(StageSequencer::default())
    }
}
