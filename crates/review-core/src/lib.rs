//! # Review Core
//!
//! 影像审阅流程的核心模块，提供病例数据模型、边界校验和统一错误定义。

pub mod error;
pub mod models;
pub mod validation;

pub use error::{ReviewError, Result};
pub use models::*;
