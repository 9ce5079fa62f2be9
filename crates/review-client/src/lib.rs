//! # 远端病例服务客户端
//!
//! 提供与远端病例服务交互的契约及其实现，包括：
//! - `CaseService` 异步接口，覆盖端点发现、病例读取、资源创建与部分更新
//! - 基于 HTTP 的实现，携带 JSON 内容协商与 CSRF 令牌
//! - 内存实现，用于测试和离线演示

pub mod http;
pub mod memory;
pub mod service;

pub use http::{ClientConfig, HttpCaseService, CSRF_COOKIE_NAME, CSRF_HEADER_NAME, DEFAULT_TIMEOUT};
pub use memory::InMemoryCaseService;
pub use service::CaseService;
