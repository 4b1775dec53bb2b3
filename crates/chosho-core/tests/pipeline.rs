//! Integration tests for [`process_batch`].
//!
//! A scripted rasterizer reads the spilled upload and interprets its text:
//! `pages:N` renders N pages, anything else is a corrupt document. The
//! extraction side uses [`MockBackend`], so no HTTP requests are made.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chosho_core::extract::mock::{MockBackend, MockResponse};
use chosho_core::{
    BatchError, ExtractionBackend, FailurePolicy, FileKind, InputFile, PageImage,
    PipelineContext, ProgressEvent, RasterizeError, Rasterizer, process_batch,
};

#[derive(Default)]
struct ScriptedRasterizer {
    seen: Mutex<Vec<PathBuf>>,
}

impl ScriptedRasterizer {
    fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

impl Rasterizer for ScriptedRasterizer {
    fn rasterize(&self, path: &Path, _kind: FileKind) -> Result<Vec<PageImage>, RasterizeError> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        let content = std::fs::read_to_string(path)?;
        let count: usize = content
            .strip_prefix("pages:")
            .and_then(|n| n.trim().parse().ok())
            .ok_or_else(|| RasterizeError::Open("not a document".into()))?;
        Ok((1..=count)
            .map(|page_number| PageImage {
                page_number,
                png: vec![0; 4],
                width: 10,
                height: 10,
            })
            .collect())
    }
}

fn one_record(payer: &str, amount: i64) -> MockResponse {
    MockResponse::Text(format!(
        r#"{{"records": [{{"category": "報酬", "detail": "原稿料", "payer_name": "{payer}", "payment_amount": {amount}, "withholding_tax": null, "payer_address": "", "payer_tel": ""}}]}}"#
    ))
}

struct Harness {
    rasterizer: Arc<ScriptedRasterizer>,
    backend: Arc<MockBackend>,
    ctx: PipelineContext,
    _dir: tempfile::TempDir,
}

fn harness(backend: MockBackend, policy: FailurePolicy) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let rasterizer = Arc::new(ScriptedRasterizer::default());
    let backend = Arc::new(backend);
    let ctx = PipelineContext {
        rasterizer: rasterizer.clone(),
        backend: Some(backend.clone() as Arc<dyn ExtractionBackend>),
        upload_dir: dir.path().join("uploads"),
        failure_policy: policy,
    };
    Harness {
        rasterizer,
        backend,
        ctx,
        _dir: dir,
    }
}

fn doc(name: &str, pages: usize) -> InputFile {
    InputFile::from_bytes(name, format!("pages:{pages}").into_bytes())
}

fn corrupt(name: &str) -> InputFile {
    InputFile::from_bytes(name, b"%PDF-garbage".to_vec())
}

#[tokio::test]
async fn records_from_all_pages_are_aggregated() {
    let h = harness(
        MockBackend::with_sequence(vec![one_record("A", 100), one_record("A", 200), one_record("B", 50)]),
        FailurePolicy::Abort,
    );

    let report = process_batch(vec![doc("a.pdf", 2), doc("b.png", 1)], &h.ctx, |_| {})
        .await
        .unwrap();

    assert_eq!(report.records.len(), 3);
    assert_eq!(report.processed_files, 2);
    assert_eq!(report.aggregated.len(), 2);
    assert_eq!(report.aggregated[0].payer_name, "A");
    assert_eq!(report.aggregated[0].payment_amount, 300);
    assert_eq!(report.aggregated[0].withholding_tax, 0);
    assert_eq!(report.aggregated[0].count, 2);
    assert_eq!(h.backend.pages_seen(), vec![1, 2, 1]);
}

#[tokio::test]
async fn unparseable_page_does_not_stop_sibling_pages() {
    let h = harness(
        MockBackend::with_sequence(vec![
            MockResponse::Text("not json at all".into()),
            one_record("A", 100),
            one_record("A", 100),
        ]),
        FailurePolicy::Abort,
    );

    let report = process_batch(vec![doc("a.pdf", 3)], &h.ctx, |_| {})
        .await
        .unwrap();

    assert_eq!(h.backend.call_count(), 3);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.page_errors.len(), 1);
    assert_eq!(report.page_errors[0].filename, "a.pdf");
    assert_eq!(report.page_errors[0].page, 1);
    assert!(!report.page_errors[0].error.is_empty());
}

#[tokio::test]
async fn unsupported_files_are_skipped_and_reported() {
    let h = harness(MockBackend::new(one_record("A", 1)), FailurePolicy::Abort);

    let report = process_batch(
        vec![InputFile::from_bytes("notes.txt", b"hello".to_vec()), doc("a.jpg", 1)],
        &h.ctx,
        |_| {},
    )
    .await
    .unwrap();

    assert_eq!(report.skipped_files, vec!["notes.txt".to_string()]);
    assert_eq!(report.processed_files, 1);
    assert_eq!(h.rasterizer.seen().len(), 1);
}

#[tokio::test]
async fn corrupt_file_aborts_batch_under_abort_policy() {
    let h = harness(MockBackend::new(one_record("A", 1)), FailurePolicy::Abort);

    let err = process_batch(
        vec![doc("good.pdf", 1), corrupt("bad.pdf"), doc("later.pdf", 1)],
        &h.ctx,
        |_| {},
    )
    .await
    .unwrap_err();

    let BatchError::Processing { filename, .. } = err;
    assert_eq!(filename, "bad.pdf");
    // The file after the corrupt one is never looked at.
    assert_eq!(h.rasterizer.seen().len(), 2);
    assert_eq!(h.backend.call_count(), 1);
}

#[tokio::test]
async fn corrupt_file_is_reported_under_skip_policy() {
    let h = harness(MockBackend::new(one_record("A", 1)), FailurePolicy::Skip);

    let report = process_batch(
        vec![doc("good.pdf", 1), corrupt("bad.pdf"), doc("later.pdf", 1)],
        &h.ctx,
        |_| {},
    )
    .await
    .unwrap();

    assert_eq!(report.processed_files, 2);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.failed_files.len(), 1);
    assert_eq!(report.failed_files[0].filename, "bad.pdf");
    assert!(report.failed_files[0].error.contains("not a document"));
}

#[tokio::test]
async fn temp_files_are_removed_on_success_and_failure() {
    let h = harness(MockBackend::new(one_record("A", 1)), FailurePolicy::Skip);

    process_batch(vec![doc("a.pdf", 1), corrupt("b.pdf")], &h.ctx, |_| {})
        .await
        .unwrap();

    let seen = h.rasterizer.seen();
    assert_eq!(seen.len(), 2);
    for path in seen {
        assert!(path.starts_with(&h.ctx.upload_dir));
        assert!(!path.exists(), "{} should have been deleted", path.display());
    }
}

#[tokio::test]
async fn path_sources_are_read_in_place() {
    let h = harness(MockBackend::new(one_record("A", 1)), FailurePolicy::Abort);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.png");
    std::fs::write(&path, "pages:1").unwrap();

    let report = process_batch(vec![InputFile::from_path(&path)], &h.ctx, |_| {})
        .await
        .unwrap();

    assert_eq!(report.records.len(), 1);
    assert_eq!(h.rasterizer.seen(), vec![path.clone()]);
    assert!(path.exists());
}

#[tokio::test]
async fn missing_backend_records_capability_errors_per_page() {
    let mut h = harness(MockBackend::new(one_record("A", 1)), FailurePolicy::Abort);
    h.ctx.backend = None;

    let report = process_batch(vec![doc("a.pdf", 2)], &h.ctx, |_| {})
        .await
        .unwrap();

    assert!(report.records.is_empty());
    assert_eq!(report.processed_files, 1);
    assert_eq!(report.page_errors.len(), 2);
    assert!(report.page_errors[0].error.contains("GOOGLE_API_KEY"));
    assert_eq!(h.backend.call_count(), 0);
}

#[tokio::test]
async fn empty_batch_yields_empty_report() {
    let h = harness(MockBackend::new(one_record("A", 1)), FailurePolicy::Abort);
    let report = process_batch(vec![], &h.ctx, |_| {}).await.unwrap();
    assert!(report.records.is_empty());
    assert!(report.aggregated.is_empty());
    assert_eq!(report.processed_files, 0);
}

#[tokio::test]
async fn progress_events_follow_files_and_pages() {
    let h = harness(MockBackend::new(one_record("A", 1)), FailurePolicy::Abort);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    process_batch(
        vec![doc("a.pdf", 2), InputFile::from_bytes("x.gif", vec![])],
        &h.ctx,
        move |event| sink.lock().unwrap().push(event),
    )
    .await
    .unwrap();

    let events = events.lock().unwrap();
    let summary: Vec<String> = events
        .iter()
        .map(|e| match e {
            ProgressEvent::FileStarted { file_index, filename, .. } => {
                format!("file {file_index} {filename}")
            }
            ProgressEvent::PagesCounted { total } => format!("pages {total}"),
            ProgressEvent::PageStarted { page, .. } => format!("page {page}"),
            ProgressEvent::FileSkipped { filename } => format!("skip {filename}"),
            ProgressEvent::PageFailed { page, .. } => format!("failed {page}"),
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            "file 0 a.pdf",
            "pages 2",
            "page 1",
            "page 2",
            "file 1 x.gif",
            "skip x.gif",
        ]
    );
}
