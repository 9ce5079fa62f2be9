//! 核心数据模型定义
//!
//! 远端病例服务返回的资源表示。所有资源以 `url` 作为唯一标识，
//! 该定位符由远端服务分配，本地从不自行构造。

use crate::error::{ReviewError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 端点映射中的资源名称
pub mod resources {
    pub const CASES: &str = "cases";
    pub const CANDIDATES: &str = "candidates";
    pub const NODULES: &str = "nodules";
    pub const IMAGES: &str = "images";
}

/// 具备远端定位符的资源
pub trait Resource {
    fn locator(&self) -> &str;
}

/// 病例：一次针对影像序列的审阅工作
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// 病例定位符，同时也是病例是否有效的标记
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub series: Option<ImageSeries>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub nodules: Vec<Nodule>,
}

impl Case {
    /// 空病例（无定位符），进程启动与卸载后的状态
    pub fn empty() -> Self {
        Self::default()
    }

    /// 病例有效当且仅当定位符非空
    pub fn is_valid(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// 无效病例即使残留候选列表也视为没有候选
    pub fn candidates_exist(&self) -> bool {
        self.is_valid() && !self.candidates.is_empty()
    }

    pub fn nodules_exist(&self) -> bool {
        self.is_valid() && !self.nodules.is_empty()
    }

    /// 序列中所有图像的预览地址，按原始顺序展开
    pub fn image_paths(&self) -> Vec<String> {
        self.series
            .as_ref()
            .map(|series| {
                series
                    .images
                    .iter()
                    .map(|image| image.preview_url.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn candidate(&self, locator: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.url == locator)
    }
}

/// 影像序列
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSeries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_instance_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// 序列中的单张图像引用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub preview_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 体素位置，索引从左上角开始，z 为切片序号
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageLocation {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl ImageLocation {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// 候选审阅结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewResult {
    #[default]
    None,
    Marked,
    Dismissed,
}

impl ReviewResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Marked => "marked",
            Self::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for ReviewResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewResult {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "none" => Ok(Self::None),
            "marked" => Ok(Self::Marked),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(format!("未知的审阅结果: {}", other)),
        }
    }
}

/// 检测出的待审阅感兴趣区域
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<ImageLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_concerning: Option<f64>,
    #[serde(default)]
    pub review_result: ReviewResult,
    /// 服务端计算的其它字段，原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Candidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 合并部分更新中出现的字段
    pub fn apply(&mut self, patch: &CandidatePatch) {
        if let Some(centroid) = patch.centroid {
            self.centroid = Some(centroid);
        }
        if let Some(probability) = patch.probability_concerning {
            self.probability_concerning = Some(probability);
        }
        if let Some(result) = patch.review_result {
            self.review_result = result;
        }
        for (key, value) in &patch.fields {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

impl Resource for Candidate {
    fn locator(&self) -> &str {
        &self.url
    }
}

/// 经审阅确认（或手动添加）的结节
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nodule {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// 来源候选的定位符，手动添加的结节没有
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<ImageLocation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Nodule {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn apply(&mut self, patch: &NodulePatch) {
        if let Some(centroid) = patch.centroid {
            self.centroid = Some(centroid);
        }
        for (key, value) in &patch.fields {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

impl Resource for Nodule {
    fn locator(&self) -> &str {
        &self.url
    }
}

/// 候选的部分更新，只序列化出现的字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidatePatch {
    /// 目标候选的定位符，不进入请求体
    #[serde(skip)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<ImageLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_concerning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_result: Option<ReviewResult>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CandidatePatch {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 仅提交审阅结果
    pub fn review(url: impl Into<String>, result: ReviewResult) -> Self {
        Self {
            review_result: Some(result),
            ..Self::new(url)
        }
    }

    pub fn with_centroid(mut self, centroid: ImageLocation) -> Self {
        self.centroid = Some(centroid);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

impl Resource for CandidatePatch {
    fn locator(&self) -> &str {
        &self.url
    }
}

/// 结节的部分更新
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodulePatch {
    #[serde(skip)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<ImageLocation>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl NodulePatch {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_centroid(mut self, centroid: ImageLocation) -> Self {
        self.centroid = Some(centroid);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

impl Resource for NodulePatch {
    fn locator(&self) -> &str {
        &self.url
    }
}

/// 新建候选的请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCandidate {
    pub case: String,
    pub centroid: ImageLocation,
    pub probability_concerning: f64,
}

/// 新建结节的请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNodule {
    pub case: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    pub centroid: ImageLocation,
}

/// 新建病例所用的影像来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub uri: String,
}

impl SourceDescriptor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// 端点映射：资源名称到绝对定位符，由根资源发现获得
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointMap(BTreeMap<String, String>);

impl EndpointMap {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// 解析资源定位符，缺失时返回配置错误而不是拼接地址
    pub fn resolve(&self, name: &str) -> Result<&str> {
        self.get(name)
            .filter(|locator| !locator.is_empty())
            .ok_or_else(|| ReviewError::Config(format!("端点 '{}' 未发现", name)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EndpointMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
