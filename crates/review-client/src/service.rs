//! 远端病例服务接口

use async_trait::async_trait;
use review_core::{
    Candidate, CandidatePatch, Case, EndpointMap, NewCandidate, NewNodule, Nodule, NodulePatch,
    Result, SourceDescriptor,
};

/// 远端病例服务
///
/// 所有返回的资源都已在边界上校验；创建要求 "created" 状态，
/// 部分更新要求 "ok" 状态，其它状态一律视为失败。
#[async_trait]
pub trait CaseService: Send + Sync {
    /// 获取根资源，返回端点映射
    async fn fetch_endpoints(&self) -> Result<EndpointMap>;

    /// 读取指定定位符的病例
    async fn fetch_case(&self, locator: &str) -> Result<Case>;

    /// 在病例集合上创建新病例
    async fn create_case(&self, cases_locator: &str, source: &SourceDescriptor) -> Result<Case>;

    /// 在候选集合上创建候选
    async fn create_candidate(
        &self,
        candidates_locator: &str,
        candidate: &NewCandidate,
    ) -> Result<Candidate>;

    /// 在结节集合上创建结节
    async fn create_nodule(&self, nodules_locator: &str, nodule: &NewNodule) -> Result<Nodule>;

    /// 对候选自身的定位符发起部分更新
    async fn patch_candidate(&self, patch: &CandidatePatch) -> Result<Candidate>;

    /// 对结节自身的定位符发起部分更新
    async fn patch_nodule(&self, patch: &NodulePatch) -> Result<Nodule>;
}
