//! # 审阅工作流模块
//!
//! 提供多阶段影像审阅流程的控制层，包括：
//! - 阶段定义：打开影像、检测与筛选、标注与分割、报告与导出，顺序固定
//! - 工作流闸门：根据病例状态判断能否进入目标阶段
//! - 阶段编排器：计算默认落地阶段和各阶段可达性
//! - 导航拦截器：拒绝时停留在当前阶段，不做重定向
//! - 病例存储：活动病例与端点映射的唯一数据源，负责与远端服务同步

pub mod gate;
pub mod navigator;
pub mod sequencer;
pub mod stage;
pub mod store;

// 重新导出主要类型
pub use gate::{CaseQueries, Prerequisite, WorkflowGate};
pub use navigator::{NavigationOutcome, Navigator};
pub use sequencer::{StageSequencer, StageStatus};
pub use stage::Stage;
pub use store::CaseStore;
