//! 病例存储与工作流闸门的行为测试

use async_trait::async_trait;
use review_client::{CaseService, InMemoryCaseService};
use review_core::models::resources;
use review_core::{
    Candidate, CandidatePatch, Case, EndpointMap, ImageLocation, ImageRef, ImageSeries,
    NewCandidate, NewNodule, Nodule, NodulePatch, Result, ReviewError, ReviewResult,
    SourceDescriptor,
};
use review_workflow::{CaseStore, Navigator, Stage, StageSequencer, WorkflowGate};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const CASE: &str = "memory://api/cases/c1/";

fn setup() -> (Arc<InMemoryCaseService>, CaseStore) {
    let service = Arc::new(InMemoryCaseService::new());
    let store = CaseStore::new(service.clone());
    (service, store)
}

fn seeded_case(candidates: &[&str]) -> Case {
    Case {
        url: Some(CASE.to_string()),
        series: Some(ImageSeries {
            uri: Some("/images/LIDC-IDRI-0001".to_string()),
            images: vec![
                ImageRef {
                    preview_url: "/preview/1.png".to_string(),
                    ..Default::default()
                },
                ImageRef {
                    preview_url: "/preview/2.png".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }),
        candidates: candidates
            .iter()
            .map(|url| Candidate {
                probability_concerning: Some(0.5),
                ..Candidate::new(*url)
            })
            .collect(),
        ..Default::default()
    }
}

/// 改写服务端返回的候选定位符，模拟规范化或回显已有定位符的服务端
struct RewritingService {
    inner: Arc<InMemoryCaseService>,
    rewrite: fn(&str) -> String,
}

#[async_trait]
impl CaseService for RewritingService {
    async fn fetch_endpoints(&self) -> Result<EndpointMap> {
        self.inner.fetch_endpoints().await
    }

    async fn fetch_case(&self, locator: &str) -> Result<Case> {
        self.inner.fetch_case(locator).await
    }

    async fn create_case(&self, cases_locator: &str, source: &SourceDescriptor) -> Result<Case> {
        self.inner.create_case(cases_locator, source).await
    }

    async fn create_candidate(
        &self,
        candidates_locator: &str,
        candidate: &NewCandidate,
    ) -> Result<Candidate> {
        let mut created = self.inner.create_candidate(candidates_locator, candidate).await?;
        created.url = (self.rewrite)(&created.url);
        Ok(created)
    }

    async fn create_nodule(&self, nodules_locator: &str, nodule: &NewNodule) -> Result<Nodule> {
        self.inner.create_nodule(nodules_locator, nodule).await
    }

    async fn patch_candidate(&self, patch: &CandidatePatch) -> Result<Candidate> {
        let mut updated = self.inner.patch_candidate(patch).await?;
        updated.url = (self.rewrite)(&updated.url);
        Ok(updated)
    }

    async fn patch_nodule(&self, patch: &NodulePatch) -> Result<Nodule> {
        self.inner.patch_nodule(patch).await
    }
}

fn rewriting_setup(rewrite: fn(&str) -> String) -> (Arc<InMemoryCaseService>, CaseStore) {
    let inner = Arc::new(InMemoryCaseService::new());
    let service = RewritingService {
        inner: inner.clone(),
        rewrite,
    };
    (inner, CaseStore::new(Arc::new(service)))
}

fn urls(candidates: &[Candidate]) -> Vec<String> {
    candidates.iter().map(|c| c.url.clone()).collect()
}

#[tokio::test]
async fn test_empty_store_blocks_detect_and_lands_on_open_image() {
    let (_service, store) = setup();
    let gate = WorkflowGate::new();
    let sequencer = StageSequencer::default();

    assert!(!store.is_case_valid());
    assert!(!gate.can_enter(Stage::DetectAndSelect, &store));
    assert_eq!(sequencer.first_unsatisfied_stage(&store), Stage::OpenImage);
    assert!(store.image_paths().is_empty());
}

#[tokio::test]
async fn test_case_with_one_candidate_opens_detect_only() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-1"]));
    store.load_case(CASE).await.unwrap();

    let gate = WorkflowGate::new();
    assert!(store.candidates_exist());
    assert!(!store.nodules_exist());
    assert!(gate.can_enter(Stage::DetectAndSelect, &store));
    assert!(!gate.can_enter(Stage::AnnotateAndSegment, &store));
    assert_eq!(store.image_paths(), vec!["/preview/1.png", "/preview/2.png"]);
}

#[tokio::test]
async fn test_update_replaces_matching_candidate_in_place() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-1", "cand-5", "cand-7"]));
    store.load_case(CASE).await.unwrap();
    let before = store.candidates();

    let updated = store
        .update_candidate(&CandidatePatch::review("cand-5", ReviewResult::Marked))
        .await
        .unwrap();
    assert_eq!(updated.review_result, ReviewResult::Marked);

    let after = store.candidates();
    assert_eq!(urls(&after), urls(&before));
    assert_eq!(after[1].review_result, ReviewResult::Marked);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
}

#[tokio::test]
async fn test_reconciles_server_representation() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-1"]));
    store.load_case(CASE).await.unwrap();

    // 本地只提交了审阅结果，服务端表示中的其它字段也要写回
    store
        .review_candidate("cand-1", ReviewResult::Dismissed)
        .await
        .unwrap();

    let candidates = store.candidates();
    let local = &candidates[0];
    assert_eq!(local.review_result, ReviewResult::Dismissed);
    assert_eq!(local.case.as_deref(), Some(CASE));
    assert_eq!(Some(local.clone()), service.candidate("cand-1"));
}

#[tokio::test]
async fn test_update_sequence_keeps_length() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-1", "cand-2", "cand-3"]));
    store.load_case(CASE).await.unwrap();

    let patches = [
        CandidatePatch::review("cand-3", ReviewResult::Marked),
        CandidatePatch::new("cand-1").with_centroid(ImageLocation::new(7, 8, 9)),
        CandidatePatch::review("cand-3", ReviewResult::Dismissed),
        CandidatePatch::review("cand-2", ReviewResult::Marked),
    ];
    for patch in &patches {
        let before = store.candidates();
        store.update_candidate(patch).await.unwrap();
        let after = store.candidates();

        assert_eq!(after.len(), before.len());
        for (old, new) in before.iter().zip(after.iter()) {
            assert_eq!(old.url, new.url);
            if old.url != patch.url {
                assert_eq!(old, new);
            }
        }
    }

    let reviewed: Vec<ReviewResult> = store
        .candidates()
        .iter()
        .map(|c| c.review_result)
        .collect();
    assert_eq!(
        reviewed,
        vec![ReviewResult::None, ReviewResult::Marked, ReviewResult::Dismissed]
    );
}

#[tokio::test]
async fn test_update_for_unknown_candidate_is_local_no_op() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-1", "cand-2"]));
    store.load_case(CASE).await.unwrap();

    // 服务端存在而本地没有的候选：远端写成功，本地序列不变
    service.insert_candidate(CASE, Candidate::new("cand-99"));
    let before = store.candidates();

    let updated = store
        .update_candidate(&CandidatePatch::review("cand-99", ReviewResult::Marked))
        .await
        .unwrap();

    assert_eq!(updated.review_result, ReviewResult::Marked);
    assert_eq!(store.candidates(), before);
    assert_eq!(
        service.candidate("cand-99").map(|c| c.review_result),
        Some(ReviewResult::Marked)
    );
}

#[tokio::test]
async fn test_discovery_failure_makes_new_case_a_config_error() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-1"]));
    store.load_case(CASE).await.unwrap();
    let before = store.snapshot();

    service.set_discovery_down(true);
    let err = store.populate_endpoints().await.unwrap_err();
    assert!(err.is_remote_failure());
    assert!(store.endpoints().is_empty());

    let err = store
        .start_new_case(&SourceDescriptor::new("/images/LIDC-IDRI-0002"))
        .await
        .unwrap_err();
    assert!(err.is_config());
    assert_eq!(store.snapshot(), before);

    // 未解析的端点不会发出请求
    assert!(service.requests().iter().all(|r| !r.starts_with("POST")));
}

#[tokio::test]
async fn test_discovery_failure_keeps_previous_map() {
    let (service, store) = setup();
    store.populate_endpoints().await.unwrap();
    let discovered = store.endpoints();
    assert!(discovered.resolve(resources::CASES).is_ok());

    service.set_discovery_down(true);
    assert!(store.populate_endpoints().await.is_err());
    assert_eq!(store.endpoints(), discovered);
}

#[tokio::test]
async fn test_new_case_then_load_round_trip() {
    let (_service, store) = setup();
    store.populate_endpoints().await.unwrap();

    let started = store
        .start_new_case(&SourceDescriptor::new("/images/LIDC-IDRI-0003"))
        .await
        .unwrap();
    let locator = started.url.clone().unwrap();
    assert_eq!(store.snapshot(), started);

    store.load_case(&locator).await.unwrap();
    let loaded = store.snapshot();

    let ids = |case: &Case| -> (BTreeSet<String>, BTreeSet<String>) {
        (
            case.candidates.iter().map(|c| c.url.clone()).collect(),
            case.nodules.iter().map(|n| n.url.clone()).collect(),
        )
    };
    assert_eq!(loaded.url, started.url);
    assert_eq!(ids(&loaded), ids(&started));
}

#[tokio::test]
async fn test_load_failure_keeps_active_case() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-1"]));
    store.load_case(CASE).await.unwrap();
    let before = store.snapshot();

    assert!(store.load_case("memory://api/cases/missing/").await.is_err());
    assert_eq!(store.snapshot(), before);

    service.set_reads_down(true);
    assert!(store.load_case(CASE).await.is_err());
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn test_malformed_case_rejected_at_boundary() {
    let (service, store) = setup();
    service.insert_case(Case {
        url: Some("memory://api/cases/dup/".to_string()),
        candidates: vec![Candidate::new("cand-1"), Candidate::new("cand-1")],
        ..Default::default()
    });

    let err = store
        .load_case("memory://api/cases/dup/")
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Validation(_)));
    assert!(!store.is_case_valid());
}

#[tokio::test]
async fn test_write_failure_leaves_local_state() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-1"]));
    store.populate_endpoints().await.unwrap();
    store.load_case(CASE).await.unwrap();
    let before = store.snapshot();

    service.set_writes_down(true);
    let err = store
        .update_candidate(&CandidatePatch::review("cand-1", ReviewResult::Marked))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReviewError::UnexpectedStatus {
            expected: 200,
            actual: 500,
            ..
        }
    ));

    let err = store
        .add_candidate_to_case(&NewCandidate {
            case: CASE.to_string(),
            centroid: ImageLocation::new(1, 2, 3),
            probability_concerning: 0.9,
        })
        .await
        .unwrap_err();
    assert!(err.is_remote_failure());
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn test_unload_resets_case() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-1"]));
    store.load_case(CASE).await.unwrap();

    store.unload_case();
    assert!(!store.is_case_valid());
    assert!(!store.candidates_exist());
    assert_eq!(store.snapshot(), Case::empty());
}

#[tokio::test]
async fn test_created_resources_are_appended() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-1"]));
    store.populate_endpoints().await.unwrap();
    store.load_case(CASE).await.unwrap();

    let candidate = store
        .add_candidate_to_case(&NewCandidate {
            case: CASE.to_string(),
            centroid: ImageLocation::new(11, 12, 13),
            probability_concerning: 0.7,
        })
        .await
        .unwrap();
    assert_eq!(urls(&store.candidates()), vec!["cand-1".to_string(), candidate.url.clone()]);
    assert!(!StageSequencer::default()
        .gate()
        .can_enter(Stage::AnnotateAndSegment, &store));

    let nodule = store
        .add_nodule_to_case(&NewNodule {
            case: CASE.to_string(),
            candidate: Some(candidate.url.clone()),
            centroid: ImageLocation::new(11, 12, 13),
        })
        .await
        .unwrap();
    assert_eq!(store.nodules(), vec![nodule.clone()]);
    assert!(StageSequencer::default()
        .gate()
        .can_enter(Stage::AnnotateAndSegment, &store));

    // 与服务端保持一致
    store.load_case(CASE).await.unwrap();
    assert_eq!(store.nodules(), vec![nodule]);
    assert_eq!(store.candidates().len(), 2);
}

#[tokio::test]
async fn test_add_candidate_requires_discovered_endpoint() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&[]));
    store.load_case(CASE).await.unwrap();

    let err = store
        .add_candidate_to_case(&NewCandidate {
            case: CASE.to_string(),
            centroid: ImageLocation::new(1, 1, 1),
            probability_concerning: 0.3,
        })
        .await
        .unwrap_err();
    assert!(err.is_config());
    assert!(store.candidates().is_empty());
}

#[tokio::test]
async fn test_update_nodule_in_place() {
    let (service, store) = setup();
    let mut case = seeded_case(&["cand-1"]);
    case.nodules = vec![Nodule::new("nod-1"), Nodule::new("nod-2")];
    service.insert_case(case);
    store.load_case(CASE).await.unwrap();

    let patch = NodulePatch::new("nod-2")
        .with_field("lung_orientation", serde_json::json!(1));
    store.update_nodule(&patch).await.unwrap();

    let nodules = store.nodules();
    assert_eq!(nodules.len(), 2);
    assert!(nodules[0].extra.is_empty());
    assert_eq!(nodules[1].extra["lung_orientation"], serde_json::json!(1));
}

#[tokio::test]
async fn test_racing_updates_last_reconciliation_wins() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-5"]));
    store.load_case(CASE).await.unwrap();

    // 先发出的更新较慢，后完成，因此它的写回覆盖较快的那个
    service.set_delay("cand-5", Duration::from_millis(50));
    let marked = CandidatePatch::review("cand-5", ReviewResult::Marked);
    let dismissed = CandidatePatch::review("cand-5", ReviewResult::Dismissed);
    let (first, second) = tokio::join!(
        store.update_candidate(&marked),
        store.update_candidate(&dismissed),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(store.candidates()[0].review_result, ReviewResult::Marked);
    assert_eq!(store.candidates().len(), 1);
}

#[tokio::test]
async fn test_stale_load_after_unload_overwrites_reset() {
    let (service, store) = setup();
    service.insert_case(seeded_case(&["cand-1"]));
    service.set_delay(CASE, Duration::from_millis(50));

    let (loaded, _) = tokio::join!(store.load_case(CASE), async {
        store.unload_case();
    });
    loaded.unwrap();

    // 已知风险：请求无法取消，迟到的写回覆盖了卸载
    assert!(store.is_case_valid());
}

#[tokio::test]
async fn test_navigator_follows_store_state() {
    let (service, store) = setup();
    let mut navigator = Navigator::default();

    assert!(!navigator.navigate(Stage::DetectAndSelect, &store).is_entered());
    assert_eq!(navigator.current(), Stage::OpenImage);

    service.insert_case(seeded_case(&["cand-1"]));
    store.load_case(CASE).await.unwrap();
    assert_eq!(navigator.land(&store), Stage::DetectAndSelect);

    assert!(!navigator
        .navigate(Stage::ReportAndExport, &store)
        .is_entered());
    assert_eq!(navigator.current(), Stage::DetectAndSelect);
}

#[tokio::test]
async fn test_update_for_unknown_nodule_is_local_no_op() {
    let (service, store) = setup();
    let mut case = seeded_case(&["cand-1"]);
    case.nodules = vec![Nodule::new("nod-1")];
    service.insert_case(case);
    store.load_case(CASE).await.unwrap();

    service.insert_nodule(CASE, Nodule::new("nod-99"));
    let before = store.nodules();

    let updated = store
        .update_nodule(&NodulePatch::new("nod-99").with_centroid(ImageLocation::new(4, 5, 6)))
        .await
        .unwrap();

    assert_eq!(updated.centroid, Some(ImageLocation::new(4, 5, 6)));
    assert_eq!(store.nodules(), before);
    assert_eq!(
        service.nodule("nod-99").and_then(|n| n.centroid),
        Some(ImageLocation::new(4, 5, 6))
    );
}

#[tokio::test]
async fn test_nodule_write_failure_leaves_local_state() {
    let (service, store) = setup();
    let mut case = seeded_case(&["cand-1"]);
    case.nodules = vec![Nodule::new("nod-1")];
    service.insert_case(case);
    store.populate_endpoints().await.unwrap();
    store.load_case(CASE).await.unwrap();
    let before = store.snapshot();

    service.set_writes_down(true);
    let err = store
        .update_nodule(&NodulePatch::new("nod-1").with_centroid(ImageLocation::new(7, 8, 9)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReviewError::UnexpectedStatus {
            expected: 200,
            actual: 500,
            ..
        }
    ));

    let err = store
        .add_nodule_to_case(&NewNodule {
            case: CASE.to_string(),
            candidate: None,
            centroid: ImageLocation::new(7, 8, 9),
        })
        .await
        .unwrap_err();
    assert!(err.is_remote_failure());
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn test_update_matches_requested_locator_when_server_normalises() {
    let (service, store) = rewriting_setup(|url| url.trim_end_matches('/').to_string());
    service.insert_case(seeded_case(&["cand-1/", "cand-2/"]));
    store.load_case(CASE).await.unwrap();

    let updated = store
        .update_candidate(&CandidatePatch::review("cand-2/", ReviewResult::Dismissed))
        .await
        .unwrap();
    assert_eq!(updated.url, "cand-2");

    let candidates = store.candidates();
    assert_eq!(urls(&candidates), vec!["cand-1/".to_string(), "cand-2".to_string()]);
    assert_eq!(candidates[1].review_result, ReviewResult::Dismissed);
}

#[tokio::test]
async fn test_created_candidate_with_existing_locator_is_not_duplicated() {
    let (service, store) = rewriting_setup(|_| "cand-1".to_string());
    service.insert_case(seeded_case(&["cand-1", "cand-2"]));
    store.populate_endpoints().await.unwrap();
    store.load_case(CASE).await.unwrap();

    let created = store
        .add_candidate_to_case(&NewCandidate {
            case: CASE.to_string(),
            centroid: ImageLocation::new(21, 22, 23),
            probability_concerning: 0.9,
        })
        .await
        .unwrap();
    assert_eq!(created.url, "cand-1");

    let candidates = store.candidates();
    assert_eq!(urls(&candidates), vec!["cand-1".to_string(), "cand-2".to_string()]);
    assert_eq!(candidates[0].probability_concerning, Some(0.9));
}
