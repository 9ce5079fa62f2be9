//! 病例存储
//!
//! 活动病例和端点映射的唯一数据源。所有远端读写都经过这里：
//! 先等待远端请求完成，再同步地把响应写回本地状态。
//!
//! 存储不对并发动作排队。同一候选的两个更新竞争时，最后完成的写回生效；
//! 需要更强保证的调用方应在调用处自行串行化。请求也无法取消，
//! 在请求未完成时卸载病例，迟到的写回可能覆盖已重置的状态。
//!
//! 更新按请求时使用的定位符找到本地元素，再整体换成服务端返回的表示，
//! 即使服务端返回的定位符经过了规范化。创建的资源按返回的定位符去重，
//! 已存在时原位替换而不是追加，保证病例内定位符唯一。

use crate::gate::CaseQueries;
use review_client::CaseService;
use review_core::models::{resources, Resource};
use review_core::{
    Candidate, CandidatePatch, Case, EndpointMap, NewCandidate, NewNodule, Nodule, NodulePatch,
    Result, ReviewResult, SourceDescriptor,
};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct StoreState {
    case: Case,
    endpoints: EndpointMap,
}

/// 病例存储
///
/// 显式构造并以句柄（通常是 `Arc<CaseStore>`）传给各个使用方，不提供全局访问。
pub struct CaseStore {
    service: Arc<dyn CaseService>,
    state: RwLock<StoreState>,
}

impl CaseStore {
    /// 创建空存储：病例无效，端点映射为空
    pub fn new(service: Arc<dyn CaseService>) -> Self {
        Self {
            service,
            state: RwLock::new(StoreState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_endpoint(&self, name: &str) -> Result<String> {
        Ok(self.read().endpoints.resolve(name)?.to_string())
    }

    /// 获取根资源并整体替换端点映射；失败时保留原映射
    pub async fn populate_endpoints(&self) -> Result<()> {
        let endpoints = self.service.fetch_endpoints().await.map_err(|e| {
            warn!("Endpoint discovery failed, keeping previous map: {}", e);
            e
        })?;

        info!("Endpoint map replaced with {} entries", endpoints.len());
        self.write().endpoints = endpoints;
        Ok(())
    }

    /// 读取病例并整体替换活动病例；失败时保留原病例
    pub async fn load_case(&self, locator: &str) -> Result<()> {
        let case = self.service.fetch_case(locator).await.map_err(|e| {
            warn!("Loading case {} failed, keeping active case: {}", locator, e);
            e
        })?;

        info!(
            "Loaded case {} ({} candidates, {} nodules)",
            locator,
            case.candidates.len(),
            case.nodules.len()
        );
        self.write().case = case;
        Ok(())
    }

    /// 重置为空病例
    pub fn unload_case(&self) {
        info!("Unloading active case");
        self.write().case = Case::empty();
    }

    /// 通过 "cases" 端点新建病例并替换活动病例
    pub async fn start_new_case(&self, source: &SourceDescriptor) -> Result<Case> {
        let cases = self.resolve_endpoint(resources::CASES)?;
        let case = self.service.create_case(&cases, source).await?;

        info!("Started new case {:?} from {}", case.url, source.uri);
        self.write().case = case.clone();
        Ok(case)
    }

    /// 部分更新候选，并按定位符原位替换为服务端返回的表示
    pub async fn update_candidate(&self, patch: &CandidatePatch) -> Result<Candidate> {
        let updated = self.service.patch_candidate(patch).await?;

        let replaced = replace_in_place(
            &mut self.write().case.candidates,
            &patch.url,
            updated.clone(),
        );
        if !replaced {
            warn!(
                "Candidate {} updated remotely but not present in the active case",
                updated.url
            );
        }
        Ok(updated)
    }

    /// 部分更新结节，规则同候选
    pub async fn update_nodule(&self, patch: &NodulePatch) -> Result<Nodule> {
        let updated = self.service.patch_nodule(patch).await?;

        let replaced = replace_in_place(
            &mut self.write().case.nodules,
            &patch.url,
            updated.clone(),
        );
        if !replaced {
            warn!(
                "Nodule {} updated remotely but not present in the active case",
                updated.url
            );
        }
        Ok(updated)
    }

    /// 只提交审阅结果
    pub async fn review_candidate(&self, locator: &str, result: ReviewResult) -> Result<Candidate> {
        self.update_candidate(&CandidatePatch::review(locator, result))
            .await
    }

    /// 通过 "candidates" 端点创建候选并追加到活动病例
    pub async fn add_candidate_to_case(&self, candidate: &NewCandidate) -> Result<Candidate> {
        let candidates = self.resolve_endpoint(resources::CANDIDATES)?;
        let created = self
            .service
            .create_candidate(&candidates, candidate)
            .await?;

        append_unique(&mut self.write().case.candidates, created.clone());
        Ok(created)
    }

    /// 通过 "nodules" 端点创建结节并追加到活动病例
    pub async fn add_nodule_to_case(&self, nodule: &NewNodule) -> Result<Nodule> {
        let nodules = self.resolve_endpoint(resources::NODULES)?;
        let created = self.service.create_nodule(&nodules, nodule).await?;

        append_unique(&mut self.write().case.nodules, created.clone());
        Ok(created)
    }

    pub fn is_case_valid(&self) -> bool {
        self.read().case.is_valid()
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        self.read().case.candidates.clone()
    }

    pub fn candidates_exist(&self) -> bool {
        self.read().case.candidates_exist()
    }

    pub fn nodules(&self) -> Vec<Nodule> {
        self.read().case.nodules.clone()
    }

    pub fn nodules_exist(&self) -> bool {
        self.read().case.nodules_exist()
    }

    pub fn image_paths(&self) -> Vec<String> {
        self.read().case.image_paths()
    }

    /// 活动病例的只读副本
    pub fn snapshot(&self) -> Case {
        self.read().case.clone()
    }

    pub fn endpoints(&self) -> EndpointMap {
        self.read().endpoints.clone()
    }
}

impl CaseQueries for CaseStore {
    fn is_case_valid(&self) -> bool {
        CaseStore::is_case_valid(self)
    }

    fn candidates_exist(&self) -> bool {
        CaseStore::candidates_exist(self)
    }

    fn nodules_exist(&self) -> bool {
        CaseStore::nodules_exist(self)
    }
}

/// 按定位符原位替换唯一匹配的元素，没有匹配时不做任何修改
fn replace_in_place<T: Resource>(items: &mut [T], locator: &str, updated: T) -> bool {
    match items.iter_mut().find(|item| item.locator() == locator) {
        Some(slot) => {
            *slot = updated;
            true
        }
        None => false,
    }
}

/// 追加新建的资源；定位符已存在时原位替换
fn append_unique<T: Resource>(items: &mut Vec<T>, created: T) {
    match items
        .iter_mut()
        .find(|item| item.locator() == created.locator())
    {
        Some(slot) => {
            warn!(
                "Created resource {} already present in the active case, replaced",
                created.locator()
            );
            *slot = created;
        }
        None => {
            debug!("Appending {} to active case", created.locator());
            items.push(created);
        }
    }
}
