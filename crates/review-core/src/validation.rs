//! 资源边界校验
//!
//! 远端返回的表示在进入病例存储之前必须通过这里的校验，
//! 畸形的响应在客户端边界被拒绝。

use crate::error::{ReviewError, Result};
use crate::models::{Candidate, Case, EndpointMap, Nodule};
use std::collections::HashSet;
use tracing::debug;

/// 校验结果，累积所有错误后一次性报告
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.has_errors() {
            Err(ReviewError::Validation(self.errors.join("; ")))
        } else {
            Ok(())
        }
    }
}

/// 可在边界上校验的资源
pub trait Validate {
    fn validate_into(&self, result: &mut ValidationResult);

    fn validate(&self) -> Result<()> {
        let mut result = ValidationResult::new();
        self.validate_into(&mut result);
        result.into_result()
    }
}

impl Validate for Case {
    fn validate_into(&self, result: &mut ValidationResult) {
        if !self.is_valid() {
            result.add_error("病例缺少定位符 url".to_string());
        }

        let mut seen = HashSet::new();
        for candidate in &self.candidates {
            candidate.validate_into(result);
            if !seen.insert(candidate.url.as_str()) {
                result.add_error(format!("候选定位符重复: {}", candidate.url));
            }
        }

        seen.clear();
        for nodule in &self.nodules {
            nodule.validate_into(result);
            if !seen.insert(nodule.url.as_str()) {
                result.add_error(format!("结节定位符重复: {}", nodule.url));
            }
        }

        debug!(
            "Validated case {:?}: {} candidates, {} nodules, {} errors",
            self.url,
            self.candidates.len(),
            self.nodules.len(),
            result.errors.len()
        );
    }
}

impl Validate for Candidate {
    fn validate_into(&self, result: &mut ValidationResult) {
        if self.url.trim().is_empty() {
            result.add_error("候选缺少定位符 url".to_string());
        }
        if let Some(probability) = self.probability_concerning {
            if !(0.0..=1.0).contains(&probability) {
                result.add_error(format!(
                    "候选 {} 的 probability_concerning 超出范围: {}",
                    self.url, probability
                ));
            }
        }
    }
}

impl Validate for Nodule {
    fn validate_into(&self, result: &mut ValidationResult) {
        if self.url.trim().is_empty() {
            result.add_error("结节缺少定位符 url".to_string());
        }
    }
}

impl Validate for EndpointMap {
    fn validate_into(&self, result: &mut ValidationResult) {
        for (name, locator) in self.iter() {
            if locator.trim().is_empty() {
                result.add_error(format!("端点 '{}' 的定位符为空", name));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candidate;

    fn valid_case() -> Case {
        Case {
            url: Some("c1".to_string()),
            candidates: vec![Candidate::new("cand-1"), Candidate::new("cand-2")],
            nodules: vec![Nodule::new("nod-1")],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_case_passes() {
        assert!(valid_case().validate().is_ok());
    }

    #[test]
    fn test_case_without_locator_rejected() {
        let mut case = valid_case();
        case.url = None;
        let err = case.validate().unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }

    #[test]
    fn test_duplicate_candidate_locator_rejected() {
        let mut case = valid_case();
        case.candidates.push(Candidate::new("cand-1"));
        assert!(case.validate().is_err());
    }

    #[test]
    fn test_probability_out_of_range_rejected() {
        let mut candidate = Candidate::new("cand-9");
        candidate.probability_concerning = Some(1.5);
        assert!(candidate.validate().is_err());

        candidate.probability_concerning = Some(0.25);
        assert!(candidate.validate().is_ok());
    }

    #[test]
    fn test_errors_are_accumulated() {
        let case = Case {
            url: None,
            candidates: vec![Candidate::new("")],
            nodules: vec![Nodule::new(" ")],
            ..Default::default()
        };
        let mut result = ValidationResult::new();
        case.validate_into(&mut result);
        assert_eq!(result.errors.len(), 3);
    }
}
