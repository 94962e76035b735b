//! End-to-end brand-mockup flow against mocked analysis, generation, and
//! storage services, with real image compositing

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wrapflow::infrastructure::{
    CompositingEngine, HttpBrandAnalyzer, HttpGenerationClient, HttpResultStore, NoopHealthLogger,
    SqliteJobRepository,
};
use wrapflow::pipeline::{
    BrandBrief, MockupPipeline, MockupStatus, RenderError, SubmitMockupRequest,
};

struct Harness {
    server: MockServer,
    repository: Arc<SqliteJobRepository>,
    pipeline: MockupPipeline,
    _dir: TempDir,
}

async fn harness() -> Harness {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let repository = Arc::new(SqliteJobRepository::open(dir.path().join("test.db")).unwrap());
    let base = Url::parse(&server.uri()).unwrap();

    let pipeline = MockupPipeline::new(
        Arc::new(
            HttpGenerationClient::new(base.clone(), "gen-token")
                .with_poll_timing(Duration::from_millis(5), Duration::from_millis(200)),
        ),
        Arc::new(HttpBrandAnalyzer::new(base.clone(), "analysis-key", "model-x")),
        Arc::clone(&repository) as Arc<dyn wrapflow::pipeline::JobRepository>,
        Arc::new(HttpResultStore::new(base, "store-token", "results")),
        Arc::new(CompositingEngine::new()),
        Arc::new(NoopHealthLogger),
    );
    Harness {
        server,
        repository,
        pipeline,
        _dir: dir,
    }
}

fn request(template_id: &str) -> SubmitMockupRequest {
    SubmitMockupRequest {
        template_id: template_id.to_string(),
        organization_id: "org-1".to_string(),
        parent_entity_id: None,
        brief: BrandBrief {
            company_name: "Summit Roofing".to_string(),
            industry: Some("Construction".to_string()),
            brand_colors: vec!["#b91c1c".to_string(), "#1f2937".to_string()],
            style_notes: Some("rugged, mountain motifs".to_string()),
            logo_url: None,
        },
    }
}

fn png_bytes(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(pixel));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

async fn mount_png(server: &MockServer, at: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(bytes)
                .insert_header("content-type", "image/png"),
        )
        .mount(server)
        .await;
}

async fn mount_analysis_ok(server: &MockServer, prompt: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{ "type": "text", "text": prompt }]
        })))
        .mount(server)
        .await;
}

async fn mount_generation_ok(server: &MockServer, output_url: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/models/black-forest-labs/flux-schnell/predictions"))
        .and(body_string_contains("Flat lay vehicle wrap graphic design"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "pred-flat",
            "status": "succeeded",
            "output": [output_url]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn mockup_composites_over_template() {
    let h = harness().await;
    let base = h.server.uri();

    h.repository
        .upsert_template("tpl-1", Some(&format!("{base}/assets/template.png")))
        .unwrap();
    mount_png(&h.server, "/assets/template.png", png_bytes(120, 60, [0, 0, 255, 255])).await;
    mount_analysis_ok(&h.server, "bold red geometric wrap with summit iconography").await;
    mount_generation_ok(&h.server, &format!("{base}/outputs/flat.png")).await;
    mount_png(&h.server, "/outputs/flat.png", png_bytes(120, 60, [255, 0, 0, 255])).await;

    // The compositor fetches the flat design back from its public URL
    Mock::given(method("GET"))
        .and(path_regex(
            r"^/storage/v1/object/public/results/mockups/.+/flat-design\.png$",
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes(120, 60, [255, 0, 0, 255]))
                .insert_header("content-type", "image/png"),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/storage/v1/object/results/mockups/.+$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&h.server)
        .await;

    let job = h.pipeline.run(request("tpl-1")).await.unwrap();

    assert_eq!(job.status, MockupStatus::Complete);
    assert_eq!(
        job.prompt.as_deref(),
        Some("bold red geometric wrap with summit iconography")
    );
    let flat = job.flat_design_url.unwrap();
    assert!(flat.contains("/public/results/mockups/"));
    assert!(flat.ends_with("flat-design.png"));
    assert!(job.final_result_url.unwrap().ends_with("composited.png"));
}

#[tokio::test]
async fn analysis_failure_falls_back_to_brief_prompt() {
    let h = harness().await;
    let base = h.server.uri();

    h.repository.upsert_template("tpl-flat", None).unwrap();
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;
    // The fallback prompt still reaches the generator
    Mock::given(method("POST"))
        .and(path("/v1/models/black-forest-labs/flux-schnell/predictions"))
        .and(body_string_contains(
            "Professional vehicle wrap design for Summit Roofing",
        ))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "pred-fb",
            "status": "succeeded",
            "output": [format!("{base}/outputs/flat.png")]
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    mount_png(&h.server, "/outputs/flat.png", png_bytes(8, 8, [0, 255, 0, 255])).await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/storage/.+$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.server)
        .await;

    // The template has no base image, so the flat design is the final artifact
    let job = h.pipeline.run(request("tpl-flat")).await.unwrap();

    assert_eq!(job.status, MockupStatus::Complete);
    assert!(job
        .prompt
        .unwrap()
        .starts_with("Professional vehicle wrap design for Summit Roofing"));
    assert_eq!(job.final_result_url, job.flat_design_url);
}

#[tokio::test]
async fn generation_failure_marks_mockup_failed() {
    let h = harness().await;
    h.repository.upsert_template("tpl-1", None).unwrap();
    mount_analysis_ok(&h.server, "any prompt").await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/models/.+/predictions$"))
        .respond_with(ResponseTemplate::new(500).set_body_string("capacity"))
        .mount(&h.server)
        .await;

    let job = h.pipeline.run(request("tpl-1")).await.unwrap();

    assert_eq!(job.status, MockupStatus::Failed);
    assert!(job.failure_note.unwrap().contains("500"));
    assert!(job.flat_design_url.is_none());
}

#[tokio::test]
async fn generation_timeout_marks_mockup_failed() {
    let h = harness().await;
    h.repository.upsert_template("tpl-1", None).unwrap();
    mount_analysis_ok(&h.server, "any prompt").await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/models/.+/predictions$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "pred-slow",
            "status": "starting"
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/predictions/pred-slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "pred-slow",
            "status": "processing"
        })))
        .mount(&h.server)
        .await;

    let job = h.pipeline.run(request("tpl-1")).await.unwrap();
    assert_eq!(job.status, MockupStatus::Failed);
}

#[tokio::test]
async fn unknown_template_is_rejected_before_any_work() {
    let h = harness().await;
    // No analysis, generation, or storage call may happen
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h.pipeline.run(request("tpl-missing")).await.unwrap_err();
    assert!(matches!(err, RenderError::NotFound(_)));

    let rows: i64 = h
        .repository
        .pool()
        .get()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM mockup_jobs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn compositing_failure_degrades_to_flat_design() {
    let h = harness().await;
    let base = h.server.uri();

    // Template row points at a URL that serves garbage bytes
    h.repository
        .upsert_template("tpl-bad", Some(&format!("{base}/assets/broken.png")))
        .unwrap();
    Mock::given(method("GET"))
        .and(path("/assets/broken.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 16]))
        .mount(&h.server)
        .await;
    mount_analysis_ok(&h.server, "degradation prompt").await;
    mount_generation_ok(&h.server, &format!("{base}/outputs/flat.png")).await;
    mount_png(&h.server, "/outputs/flat.png", png_bytes(8, 8, [9, 9, 9, 255])).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/storage/v1/object/public/.+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes(8, 8, [9, 9, 9, 255]))
                .insert_header("content-type", "image/png"),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/storage/.+$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.server)
        .await;

    let job = h.pipeline.run(request("tpl-bad")).await.unwrap();

    assert_eq!(job.status, MockupStatus::Complete);
    assert_eq!(job.final_result_url, job.flat_design_url);
}
