//! 基于 HTTP 的远端病例服务实现
//!
//! 所有病例、候选、结节请求都携带 JSON 内容协商头和 CSRF 令牌对
//! （请求头与 cookie 同值）。请求受固定超时约束，超时即失败。

use crate::service::CaseService;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use reqwest::{Method, RequestBuilder, StatusCode};
use review_core::validation::Validate;
use review_core::{
    Candidate, CandidatePatch, Case, EndpointMap, NewCandidate, NewNodule, Nodule, NodulePatch,
    Result, ReviewError, SourceDescriptor,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// CSRF 请求头名称
pub const CSRF_HEADER_NAME: &str = "X-CSRFToken";
/// CSRF cookie 名称
pub const CSRF_COOKIE_NAME: &str = "csrftoken";
/// 契约规定的请求超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const JSON_MEDIA_TYPE: &str = "application/json";

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// 根资源（端点发现）地址
    pub root_url: String,
    /// 单次请求超时
    pub timeout: Duration,
    /// CSRF 令牌，未提供时随机生成
    pub csrf_token: Option<String>,
}

impl ClientConfig {
    pub fn new(root_url: impl Into<String>) -> Self {
        Self {
            root_url: root_url.into(),
            timeout: DEFAULT_TIMEOUT,
            csrf_token: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.root_url.trim().is_empty() {
            return Err(ReviewError::Config("根资源地址不能为空".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(ReviewError::Config("请求超时必须大于0".to_string()));
        }
        if matches!(&self.csrf_token, Some(token) if token.trim().is_empty()) {
            return Err(ReviewError::Config("CSRF令牌不能为空字符串".to_string()));
        }
        Ok(())
    }
}

/// HTTP 病例服务客户端
#[derive(Debug, Clone)]
pub struct HttpCaseService {
    client: reqwest::Client,
    root_url: String,
    csrf_token: String,
}

impl HttpCaseService {
    /// 根据配置创建客户端
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReviewError::Internal(format!("无法创建HTTP客户端: {}", e)))?;

        let csrf_token = config
            .csrf_token
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        info!(
            "Case service client ready: root={}, timeout={:?}",
            config.root_url, config.timeout
        );

        Ok(Self {
            client,
            root_url: config.root_url,
            csrf_token,
        })
    }

    /// 添加资源请求的内容协商头和 CSRF 令牌对
    fn with_resource_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(ACCEPT, JSON_MEDIA_TYPE)
            .header(CONTENT_TYPE, JSON_MEDIA_TYPE)
            .header(CSRF_HEADER_NAME, &self.csrf_token)
            .header(COOKIE, format!("{}={}", CSRF_COOKIE_NAME, self.csrf_token))
    }

    /// 发送请求并解析响应体，状态码必须与预期一致
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        method: Method,
        url: &str,
        expected: StatusCode,
    ) -> Result<T> {
        debug!("{} {}", method, url);

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&method, url, e))?;

        let status = response.status();
        if status != expected {
            error!("{} {} returned {} (expected {})", method, url, status, expected);
            return Err(ReviewError::UnexpectedStatus {
                method: method.to_string(),
                url: url.to_string(),
                expected: expected.as_u16(),
                actual: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&method, url, e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_resource<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let request = self.with_resource_headers(self.client.get(url));
        self.send(request, Method::GET, url, StatusCode::OK).await
    }

    async fn post_resource<T: DeserializeOwned>(&self, url: &str, body: Value) -> Result<T> {
        let request = self.with_resource_headers(self.client.post(url)).json(&body);
        self.send(request, Method::POST, url, StatusCode::CREATED).await
    }

    async fn patch_resource<T: DeserializeOwned>(&self, url: &str, body: Value) -> Result<T> {
        let request = self
            .with_resource_headers(self.client.patch(url))
            .json(&body);
        self.send(request, Method::PATCH, url, StatusCode::OK).await
    }
}

fn transport_error(method: &Method, url: &str, err: reqwest::Error) -> ReviewError {
    if err.is_timeout() {
        ReviewError::Timeout(format!("{} {}", method, url))
    } else {
        ReviewError::Network(format!("{} {}: {}", method, url, err))
    }
}

#[async_trait]
impl CaseService for HttpCaseService {
    async fn fetch_endpoints(&self) -> Result<EndpointMap> {
        let request = self.client.get(&self.root_url).header(ACCEPT, JSON_MEDIA_TYPE);
        let endpoints: EndpointMap = self
            .send(request, Method::GET, &self.root_url, StatusCode::OK)
            .await?;
        endpoints.validate()?;
        info!("Discovered {} endpoints from {}", endpoints.len(), self.root_url);
        Ok(endpoints)
    }

    async fn fetch_case(&self, locator: &str) -> Result<Case> {
        let case: Case = self.get_resource(locator).await?;
        case.validate()?;
        Ok(case)
    }

    async fn create_case(&self, cases_locator: &str, source: &SourceDescriptor) -> Result<Case> {
        let case: Case = self
            .post_resource(cases_locator, serde_json::to_value(source)?)
            .await?;
        case.validate()?;
        info!("Created case {:?} for {}", case.url, source.uri);
        Ok(case)
    }

    async fn create_candidate(
        &self,
        candidates_locator: &str,
        candidate: &NewCandidate,
    ) -> Result<Candidate> {
        let created: Candidate = self
            .post_resource(candidates_locator, serde_json::to_value(candidate)?)
            .await?;
        created.validate()?;
        Ok(created)
    }

    async fn create_nodule(&self, nodules_locator: &str, nodule: &NewNodule) -> Result<Nodule> {
        let created: Nodule = self
            .post_resource(nodules_locator, serde_json::to_value(nodule)?)
            .await?;
        created.validate()?;
        Ok(created)
    }

    async fn patch_candidate(&self, patch: &CandidatePatch) -> Result<Candidate> {
        let updated: Candidate = self
            .patch_resource(&patch.url, serde_json::to_value(patch)?)
            .await?;
        updated.validate()?;
        Ok(updated)
    }

    async fn patch_nodule(&self, patch: &NodulePatch) -> Result<Nodule> {
        let updated: Nodule = self
            .patch_resource(&patch.url, serde_json::to_value(patch)?)
            .await?;
        updated.validate()?;
        Ok(updated)
    }
}
