//! 内存病例服务
//!
//! 在进程内模拟远端病例服务的资源语义（发现、读取、创建、部分更新），
//! 并支持注入失败和延迟，用于测试工作流在各种故障下的行为。

use crate::service::CaseService;
use async_trait::async_trait;
use chrono::Utc;
use review_core::models::resources;
use review_core::validation::Validate;
use review_core::{
    Candidate, CandidatePatch, Case, EndpointMap, ImageSeries, NewCandidate, NewNodule, Nodule,
    NodulePatch, Result, ReviewError, SourceDescriptor,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

const DEFAULT_ROOT: &str = "memory://api/";

/// 内存病例服务
#[derive(Debug)]
pub struct InMemoryCaseService {
    state: Mutex<ServiceState>,
}

#[derive(Debug, Default)]
struct ServiceState {
    endpoints: EndpointMap,
    cases: BTreeMap<String, Case>,
    candidates: Vec<Candidate>,
    nodules: Vec<Nodule>,
    next_id: u64,
    discovery_down: bool,
    reads_down: bool,
    writes_down: bool,
    delays: HashMap<String, Duration>,
    requests: Vec<String>,
}

impl InMemoryCaseService {
    /// 创建带有标准端点（cases、candidates、nodules、images）的服务
    pub fn new() -> Self {
        let endpoints = [
            resources::CASES,
            resources::CANDIDATES,
            resources::NODULES,
            resources::IMAGES,
        ]
        .into_iter()
        .map(|name| (name, format!("{}{}/", DEFAULT_ROOT, name)))
        .collect();

        Self::with_endpoints(endpoints)
    }

    pub fn with_endpoints(endpoints: EndpointMap) -> Self {
        Self {
            state: Mutex::new(ServiceState {
                endpoints,
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 根资源不可用
    pub fn set_discovery_down(&self, down: bool) {
        self.state().discovery_down = down;
    }

    /// 所有读取返回 503
    pub fn set_reads_down(&self, down: bool) {
        self.state().reads_down = down;
    }

    /// 所有创建和更新返回 500
    pub fn set_writes_down(&self, down: bool) {
        self.state().writes_down = down;
    }

    /// 对指定定位符的下一次请求在处理前等待
    pub fn set_delay(&self, locator: impl Into<String>, delay: Duration) {
        self.state().delays.insert(locator.into(), delay);
    }

    /// 写入一个病例（及其候选和结节），返回病例定位符
    pub fn insert_case(&self, mut case: Case) -> String {
        let mut state = self.state();
        let url = match case.url.clone().filter(|url| !url.is_empty()) {
            Some(url) => url,
            None => {
                let base = state.collection(resources::CASES);
                state.assign_url(&base)
            }
        };
        case.url = Some(url.clone());

        for mut candidate in std::mem::take(&mut case.candidates) {
            candidate.case = Some(url.clone());
            state.candidates.push(candidate);
        }
        for mut nodule in std::mem::take(&mut case.nodules) {
            nodule.case = Some(url.clone());
            state.nodules.push(nodule);
        }
        state.cases.insert(url.clone(), case);
        url
    }

    /// 直接在服务端添加候选，本地存储不会感知
    pub fn insert_candidate(&self, case_locator: &str, mut candidate: Candidate) {
        candidate.case = Some(case_locator.to_string());
        self.state().candidates.push(candidate);
    }

    /// 服务端当前的候选表示
    pub fn candidate(&self, locator: &str) -> Option<Candidate> {
        self.state()
            .candidates
            .iter()
            .find(|c| c.url == locator)
            .cloned()
    }

    /// 直接在服务端添加结节
    pub fn insert_nodule(&self, case_locator: &str, mut nodule: Nodule) {
        nodule.case = Some(case_locator.to_string());
        self.state().nodules.push(nodule);
    }

    pub fn nodule(&self, locator: &str) -> Option<Nodule> {
        self.state()
            .nodules
            .iter()
            .find(|n| n.url == locator)
            .cloned()
    }

    /// 已收到的请求记录，格式为 "METHOD locator"
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    /// 记录请求并取出该定位符的延迟
    fn begin(&self, method: &str, locator: &str) -> Option<Duration> {
        let mut state = self.state();
        state.requests.push(format!("{} {}", method, locator));
        debug!("{} {} (in-memory)", method, locator);
        state.delays.remove(locator)
    }

    async fn enter(&self, method: &str, locator: &str) {
        if let Some(delay) = self.begin(method, locator) {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for InMemoryCaseService {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceState {
    fn collection(&self, name: &str) -> String {
        self.endpoints
            .get(name)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}{}/", DEFAULT_ROOT, name))
    }

    fn assign_url(&mut self, base: &str) -> String {
        let url = format!("{}{}/", base, self.next_id);
        self.next_id += 1;
        url
    }

    /// 请求的集合定位符必须是端点映射中登记的那个
    fn check_collection(&self, name: &str, locator: &str) -> Result<()> {
        if self.endpoints.get(name) == Some(locator) {
            Ok(())
        } else {
            Err(status_error("POST", locator, 201, 404))
        }
    }

    fn check_writes(&self, method: &str, locator: &str, expected: u16) -> Result<()> {
        if self.writes_down {
            Err(status_error(method, locator, expected, 500))
        } else {
            Ok(())
        }
    }

    fn assemble_case(&self, locator: &str) -> Option<Case> {
        let mut case = self.cases.get(locator)?.clone();
        case.candidates = self
            .candidates
            .iter()
            .filter(|c| c.case.as_deref() == Some(locator))
            .cloned()
            .collect();
        case.nodules = self
            .nodules
            .iter()
            .filter(|n| n.case.as_deref() == Some(locator))
            .cloned()
            .collect();
        Some(case)
    }
}

fn status_error(method: &str, url: &str, expected: u16, actual: u16) -> ReviewError {
    ReviewError::UnexpectedStatus {
        method: method.to_string(),
        url: url.to_string(),
        expected,
        actual,
    }
}

#[async_trait]
impl CaseService for InMemoryCaseService {
    async fn fetch_endpoints(&self) -> Result<EndpointMap> {
        self.enter("GET", DEFAULT_ROOT).await;
        let state = self.state();
        if state.discovery_down {
            return Err(ReviewError::Network(format!("GET {}: connection refused", DEFAULT_ROOT)));
        }
        Ok(state.endpoints.clone())
    }

    async fn fetch_case(&self, locator: &str) -> Result<Case> {
        self.enter("GET", locator).await;
        let state = self.state();
        if state.reads_down {
            return Err(status_error("GET", locator, 200, 503));
        }
        let case = state
            .assemble_case(locator)
            .ok_or_else(|| status_error("GET", locator, 200, 404))?;
        case.validate()?;
        Ok(case)
    }

    async fn create_case(&self, cases_locator: &str, source: &SourceDescriptor) -> Result<Case> {
        self.enter("POST", cases_locator).await;
        let mut state = self.state();
        state.check_writes("POST", cases_locator, 201)?;
        state.check_collection(resources::CASES, cases_locator)?;

        let url = state.assign_url(cases_locator);
        let case = Case {
            url: Some(url.clone()),
            created: Some(Utc::now()),
            series: Some(ImageSeries {
                uri: Some(source.uri.clone()),
                ..Default::default()
            }),
            candidates: Vec::new(),
            nodules: Vec::new(),
        };
        state.cases.insert(url, case.clone());
        Ok(case)
    }

    async fn create_candidate(
        &self,
        candidates_locator: &str,
        candidate: &NewCandidate,
    ) -> Result<Candidate> {
        self.enter("POST", candidates_locator).await;
        let mut state = self.state();
        state.check_writes("POST", candidates_locator, 201)?;
        state.check_collection(resources::CANDIDATES, candidates_locator)?;
        if !state.cases.contains_key(&candidate.case) {
            return Err(status_error("POST", candidates_locator, 201, 400));
        }

        let created = Candidate {
            url: state.assign_url(candidates_locator),
            case: Some(candidate.case.clone()),
            created: Some(Utc::now()),
            centroid: Some(candidate.centroid),
            probability_concerning: Some(candidate.probability_concerning),
            ..Default::default()
        };
        created.validate()?;
        state.candidates.push(created.clone());
        Ok(created)
    }

    async fn create_nodule(&self, nodules_locator: &str, nodule: &NewNodule) -> Result<Nodule> {
        self.enter("POST", nodules_locator).await;
        let mut state = self.state();
        state.check_writes("POST", nodules_locator, 201)?;
        state.check_collection(resources::NODULES, nodules_locator)?;
        if !state.cases.contains_key(&nodule.case) {
            return Err(status_error("POST", nodules_locator, 201, 400));
        }

        let created = Nodule {
            url: state.assign_url(nodules_locator),
            case: Some(nodule.case.clone()),
            created: Some(Utc::now()),
            candidate: nodule.candidate.clone(),
            centroid: Some(nodule.centroid),
            ..Default::default()
        };
        state.nodules.push(created.clone());
        Ok(created)
    }

    async fn patch_candidate(&self, patch: &CandidatePatch) -> Result<Candidate> {
        self.enter("PATCH", &patch.url).await;
        let mut state = self.state();
        state.check_writes("PATCH", &patch.url, 200)?;

        let slot = state
            .candidates
            .iter_mut()
            .find(|c| c.url == patch.url)
            .ok_or_else(|| status_error("PATCH", &patch.url, 200, 404))?;

        // 校验通过后才写回
        let mut patched = slot.clone();
        patched.apply(patch);
        patched.validate()?;
        *slot = patched.clone();
        Ok(patched)
    }

    async fn patch_nodule(&self, patch: &NodulePatch) -> Result<Nodule> {
        self.enter("PATCH", &patch.url).await;
        let mut state = self.state();
        state.check_writes("PATCH", &patch.url, 200)?;

        let slot = state
            .nodules
            .iter_mut()
            .find(|n| n.url == patch.url)
            .ok_or_else(|| status_error("PATCH", &patch.url, 200, 404))?;

        let mut patched = slot.clone();
        patched.apply(patch);
        patched.validate()?;
        *slot = patched.clone();
        Ok(patched)
    }
}
