//! 工作流阶段
//!
//! 四个阶段的顺序固定且全序：打开影像 < 检测与筛选 < 标注与分割 < 报告与导出

use serde::{Deserialize, Serialize};
use std::fmt;

/// 审阅流程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    OpenImage,
    DetectAndSelect,
    AnnotateAndSegment,
    ReportAndExport,
}

impl Stage {
    /// 规范阶段顺序
    pub const ALL: [Stage; 4] = [
        Stage::OpenImage,
        Stage::DetectAndSelect,
        Stage::AnnotateAndSegment,
        Stage::ReportAndExport,
    ];

    /// 导航路径
    pub fn path(&self) -> &'static str {
        match self {
            Self::OpenImage => "/",
            Self::DetectAndSelect => "/detect-and-select",
            Self::AnnotateAndSegment => "/annotate-and-segment",
            Self::ReportAndExport => "/report-and-export",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::OpenImage => "Open Image",
            Self::DetectAndSelect => "Detect and Select",
            Self::AnnotateAndSegment => "Annotate and Segment",
            Self::ReportAndExport => "Report and Export",
        }
    }

    pub fn from_path(path: &str) -> Option<Stage> {
        Self::ALL.into_iter().find(|stage| stage.path() == path)
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn next(&self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(&self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}
