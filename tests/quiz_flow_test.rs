//! 答题链流程测试：用假实现驱动完整的 抓取 → 分类 → 作答 → 提交 → 决策 循环

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{http::header, routing::get, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{
    identity, quiz_page, spawn_server, submission, FakeChartRenderer, FakeFetcher, FakeLoader,
    FakeSubmitter, FakeTextEngine, Harness, SUBMIT_URL,
};
use quiz_chain_agent::error::{AppError, LlmError};
use quiz_chain_agent::models::{
    ChainOutcome, ChainStep, ChartSeries, ChartSpec, ChartType, EngineKind, FailureKind,
    ModelReply, PageContent, ResourceKind, ResourceLink,
};
use quiz_chain_agent::services::{
    HttpResourceLoader, HttpSubmissionClient, ImageData, LoadedResource,
};
use quiz_chain_agent::workflow::{ChainCtx, DEFAULT_FEEDBACK};

const START: &str = "https://quiz.example/q1";

fn ctx() -> ChainCtx {
    ChainCtx::new("test-chain", identity())
}

fn error_parts(outcome: &ChainOutcome) -> (ChainStep, FailureKind, String) {
    match outcome {
        ChainOutcome::Error {
            step, kind, url, ..
        } => (*step, *kind, url.clone()),
        other => panic!("期望 Error，实际是 {other:?}"),
    }
}

#[tokio::test]
async fn test_correct_answer_without_next_url_succeeds() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "What is 6 x 7?", vec![])]);
    let submitter = FakeSubmitter::scripted(vec![Ok(submission(true, None, None))]);
    let (harness, submitter) = Harness::new(fetcher, submitter);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert_eq!(
        report.outcome,
        ChainOutcome::Success {
            last_url: START.to_string()
        }
    );
    assert_eq!(harness.fetcher.fetched(), vec![START.to_string()]);

    let calls = submitter.submitted();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].endpoint, SUBMIT_URL);
    assert_eq!(calls[0].task_url, START);
    assert_eq!(calls[0].identity, identity());
    assert_eq!(calls[0].payload.answer, json!(42));

    assert_eq!(report.submissions.len(), 1);
    assert_eq!(report.submissions[0].engine, EngineKind::Text);
    assert!(report.steps.iter().all(|s| s.ok));
}

#[tokio::test]
async fn test_correct_answer_advances_to_next_url() {
    let fetcher = FakeFetcher::with_pages(vec![
        quiz_page(START, "First question", vec![]),
        quiz_page("https://quiz.example/q2", "Second question", vec![]),
    ]);
    let submitter = FakeSubmitter::scripted(vec![
        Ok(submission(true, Some("https://quiz.example/q2"), None)),
        Ok(submission(true, None, None)),
    ]);
    let (harness, submitter) = Harness::new(fetcher, submitter);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert!(report.outcome.is_success());
    assert_eq!(
        harness.fetcher.fetched(),
        vec![START.to_string(), "https://quiz.example/q2".to_string()]
    );
    assert_eq!(report.visited_urls(), vec![START, "https://quiz.example/q2"]);

    assert_eq!(submitter.submitted().len(), 2);
    // 换到新题目时 attempt 从 1 重新计数
    assert!(report.submissions.iter().all(|s| s.attempt == 1));
}

#[tokio::test]
async fn test_incorrect_with_next_url_skips_without_retry() {
    let fetcher = FakeFetcher::with_pages(vec![
        quiz_page(START, "Hard question", vec![]),
        quiz_page("https://next", "Easy question", vec![]),
    ]);
    let submitter = FakeSubmitter::scripted(vec![
        Ok(submission(false, Some("https://next"), Some("wrong"))),
        Ok(submission(true, None, None)),
    ]);
    let (harness, submitter) = Harness::new(fetcher, submitter);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert!(report.outcome.is_success());
    assert_eq!(
        harness.fetcher.fetched(),
        vec![START.to_string(), "https://next".to_string()]
    );

    let calls = submitter.submitted();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls.iter().filter(|c| c.task_url == START).count(), 1);

    // 跳过的题目不会带着反馈重答
    assert!(harness.text.asked().iter().all(|q| q.feedback.is_none()));
}

#[tokio::test]
async fn test_incorrect_without_next_retries_once_then_exhausts() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Sum the column", vec![])]);
    let submitter = FakeSubmitter::scripted(vec![
        Ok(submission(false, None, Some("wrong answer"))),
        Ok(submission(false, None, Some("still wrong"))),
        Ok(submission(true, None, None)),
    ]);
    let (harness, submitter) = Harness::new(fetcher, submitter);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert_eq!(
        report.outcome,
        ChainOutcome::Exhausted {
            url: START.to_string(),
            attempts: 2
        }
    );

    // 恰好两次提交，不会有第三次
    assert_eq!(submitter.submitted().len(), 2);
    // 重试时复用已抓取的页面
    assert_eq!(harness.fetcher.fetched().len(), 1);

    let asked = harness.text.asked();
    assert_eq!(asked.len(), 2);
    assert_eq!(asked[0].feedback, None);
    assert_eq!(asked[1].feedback.as_deref(), Some("wrong answer"));
    assert_eq!(
        report.submissions.iter().map(|s| s.attempt).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[tokio::test]
async fn test_retry_without_message_uses_default_feedback() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Guess", vec![])]);
    let submitter = FakeSubmitter::scripted(vec![
        Ok(submission(false, None, None)),
        Ok(submission(true, None, None)),
    ]);
    let (harness, _submitter) = Harness::new(fetcher, submitter);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert!(report.outcome.is_success());
    let asked = harness.text.asked();
    assert_eq!(asked[1].feedback.as_deref(), Some(DEFAULT_FEEDBACK));
}

#[tokio::test]
async fn test_retry_limit_zero_exhausts_immediately() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Guess", vec![])]);
    let submitter = FakeSubmitter::scripted(vec![Ok(submission(false, None, Some("no")))]);
    let (mut harness, submitter) = Harness::new(fetcher, submitter);
    harness.settings.retry_limit = 0;

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert!(matches!(
        report.outcome,
        ChainOutcome::Exhausted { attempts: 1, .. }
    ));
    assert_eq!(submitter.submitted().len(), 1);
}

#[tokio::test]
async fn test_csv_resource_goes_to_text_engine() {
    let page = quiz_page(
        START,
        "Download data.csv and report the total of the value column.",
        vec![],
    );
    let csv_url = "https://quiz.example/data.csv";

    let fetcher = FakeFetcher::with_pages(vec![page]);
    let submitter = FakeSubmitter::scripted(vec![Ok(submission(true, None, None))]);
    let (mut harness, submitter) = Harness::new(fetcher, submitter);
    let loader = Arc::new(FakeLoader::with(vec![(
        csv_url,
        LoadedResource::Text {
            content: "id,value\n1,10\n2,32\n".to_string(),
        },
    )]));
    harness.loader = loader.clone();
    harness.text = Arc::new(FakeTextEngine::answering(json!(42)));

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;
    assert!(report.outcome.is_success());

    let loaded = loader.loaded();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].kind, ResourceKind::Csv);
    assert_eq!(loaded[0].resource_url.as_deref(), Some(csv_url));

    let asked = harness.text.asked();
    assert_eq!(asked.len(), 1);
    assert!(asked[0].supporting_text.as_deref().unwrap().contains("2,32"));
    assert!(harness.vision.asked().is_empty());

    let call = &submitter.submitted()[0];
    let body = quiz_chain_agent::services::submission_client::encode_submission(
        &call.payload,
        &call.identity,
        &call.task_url,
        1024,
    )
    .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        value,
        json!({
            "email": "agent@example.com",
            "secret": "test-secret",
            "url": START,
            "answer": 42
        })
    );
    assert_eq!(report.submissions[0].resource_kind, ResourceKind::Csv);
}

#[tokio::test]
async fn test_img_tag_goes_to_vision_engine_with_image_bytes() {
    let png_bytes: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3];
    let served = png_bytes.clone();
    let base = spawn_server(Router::new().route(
        "/cat.png",
        get(move || {
            let body = served.clone();
            async move { ([(header::CONTENT_TYPE, "image/png")], body) }
        }),
    ))
    .await;

    let page_url = format!("{base}/q1");
    let page = quiz_page(
        &page_url,
        "What animal is shown in the picture?",
        vec![ResourceLink::from_tag("img", format!("{base}/cat.png"))],
    );

    let fetcher = FakeFetcher::with_pages(vec![page]);
    let submitter = FakeSubmitter::scripted(vec![Ok(submission(true, None, None))]);
    let (mut harness, submitter) = Harness::new(fetcher, submitter);
    harness.loader = Arc::new(HttpResourceLoader::new(
        reqwest::Client::new(),
        Duration::from_secs(5),
    ));

    let report = harness
        .flow()
        .run(&ctx(), &page_url, CancellationToken::new())
        .await;
    assert!(report.outcome.is_success(), "{:?}", report.outcome);

    let asked = harness.vision.asked();
    assert_eq!(asked.len(), 1);
    assert_eq!(
        asked[0].images,
        vec![ImageData::png(png_bytes).to_data_uri()]
    );
    assert!(harness.text.asked().is_empty());

    assert_eq!(submitter.submitted()[0].payload.answer, json!("cat"));
    assert_eq!(report.submissions[0].engine, EngineKind::Vision);
    assert_eq!(report.submissions[0].resource_kind, ResourceKind::Image);
}

#[tokio::test]
async fn test_fetch_failure_terminates_with_error() {
    let fetcher = FakeFetcher::default();
    let submitter = FakeSubmitter::scripted(vec![]);
    let (harness, submitter) = Harness::new(fetcher, submitter);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert_eq!(
        error_parts(&report.outcome),
        (ChainStep::Fetch, FailureKind::FetchFailure, START.to_string())
    );
    assert!(submitter.submitted().is_empty());
    assert_eq!(report.steps.len(), 1);
    assert!(!report.steps[0].ok);
}

#[tokio::test]
async fn test_fetch_on_next_url_failure_reports_that_url() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "First", vec![])]);
    let submitter = FakeSubmitter::scripted(vec![Ok(submission(
        true,
        Some("https://quiz.example/gone"),
        None,
    ))]);
    let (harness, _submitter) = Harness::new(fetcher, submitter);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert_eq!(
        error_parts(&report.outcome),
        (
            ChainStep::Fetch,
            FailureKind::FetchFailure,
            "https://quiz.example/gone".to_string()
        )
    );
}

#[tokio::test]
async fn test_missing_submit_url_is_an_error() {
    let page = PageContent::new(START, "What is 2 + 2? No endpoint here.", vec![]);
    let fetcher = FakeFetcher::with_pages(vec![page]);
    let submitter = FakeSubmitter::scripted(vec![]);
    let (harness, submitter) = Harness::new(fetcher, submitter);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    let (_, kind, url) = error_parts(&report.outcome);
    assert_eq!(kind, FailureKind::MissingSubmitUrl);
    assert_eq!(url, START);
    assert!(submitter.submitted().is_empty());
}

#[tokio::test]
async fn test_failed_resource_locating_ends_chain_at_classify() {
    let page = quiz_page(START, "Download the attached dataset and sum it.", vec![]);
    let fetcher = FakeFetcher::with_pages(vec![page]);
    let submitter = FakeSubmitter::scripted(vec![Ok(submission(true, None, None))]);
    let (mut harness, submitter) = Harness::new(fetcher, submitter);
    let loader = Arc::new(FakeLoader::default());
    harness.loader = loader.clone();
    harness.text = Arc::new(FakeTextEngine::answering(json!(42)).failing_to_locate());

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert_eq!(
        error_parts(&report.outcome),
        (
            ChainStep::Classify,
            FailureKind::ClassificationFailure,
            START.to_string()
        )
    );
    assert_eq!(harness.text.locate_count(), 1);
    assert!(harness.text.asked().is_empty());
    assert!(loader.loaded().is_empty());
    assert!(submitter.submitted().is_empty());
    assert!(report.submissions.is_empty());
}

#[tokio::test]
async fn test_located_resource_is_loaded_and_answered() {
    let page = quiz_page(START, "Download the attached dataset and sum it.", vec![]);
    let csv_url = "https://quiz.example/files/scores.csv";

    let fetcher = FakeFetcher::with_pages(vec![page]);
    let submitter = FakeSubmitter::scripted(vec![Ok(submission(true, None, None))]);
    let (mut harness, submitter) = Harness::new(fetcher, submitter);
    let loader = Arc::new(FakeLoader::with(vec![(
        csv_url,
        LoadedResource::Text {
            content: "name,score\nann,20\nbob,22\n".to_string(),
        },
    )]));
    harness.loader = loader.clone();
    harness.text = Arc::new(FakeTextEngine::answering(json!(42)).locating(csv_url));

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;
    assert!(report.outcome.is_success());

    // 只问一次资源位置
    assert_eq!(harness.text.locate_count(), 1);
    assert!(harness.text.locate_calls.lock().unwrap()[0].contains("attached dataset"));

    let loaded = loader.loaded();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].kind, ResourceKind::Csv);
    assert_eq!(loaded[0].resource_url.as_deref(), Some(csv_url));

    let asked = harness.text.asked();
    assert_eq!(asked.len(), 1);
    assert!(asked[0].supporting_text.as_deref().unwrap().contains("bob,22"));
    assert_eq!(submitter.submitted().len(), 1);
}

#[tokio::test]
async fn test_default_submit_url_is_used_when_page_has_none() {
    let page = PageContent::new(START, "What is 2 + 2?", vec![]);
    let fetcher = FakeFetcher::with_pages(vec![page]);
    let submitter = FakeSubmitter::scripted(vec![Ok(submission(true, None, None))]);
    let (mut harness, submitter) = Harness::new(fetcher, submitter);
    harness.settings.default_submit_url = Some("https://fallback.example/submit".to_string());

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert!(report.outcome.is_success());
    assert_eq!(
        submitter.submitted()[0].endpoint,
        "https://fallback.example/submit"
    );
}

#[tokio::test]
async fn test_relative_submit_url_resolves_against_page() {
    let page = PageContent::new(START, "Compute it. Post your answer to /submit/q1", vec![]);
    let fetcher = FakeFetcher::with_pages(vec![page]);
    let submitter = FakeSubmitter::scripted(vec![Ok(submission(true, None, None))]);
    let (harness, submitter) = Harness::new(fetcher, submitter);

    harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert_eq!(
        submitter.submitted()[0].endpoint,
        "https://quiz.example/submit/q1"
    );
}

#[tokio::test]
async fn test_malformed_response_is_not_retried() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Q", vec![])]);
    let submitter = FakeSubmitter::scripted(vec![
        Err(AppError::malformed_response(SUBMIT_URL, "缺少 correct 字段")),
        Ok(submission(true, None, None)),
    ]);
    let (harness, submitter) = Harness::new(fetcher, submitter);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert_eq!(
        error_parts(&report.outcome),
        (ChainStep::Submit, FailureKind::MalformedResponse, START.to_string())
    );
    assert_eq!(submitter.submitted().len(), 1);
}

#[tokio::test]
async fn test_transport_failure_is_not_retried() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Q", vec![])]);
    let submitter = FakeSubmitter::scripted(vec![Err(
        quiz_chain_agent::error::ApiError::HttpStatus {
            endpoint: SUBMIT_URL.to_string(),
            status: 503,
        }
        .into(),
    )]);
    let (harness, submitter) = Harness::new(fetcher, submitter);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    let (step, kind, _) = error_parts(&report.outcome);
    assert_eq!(step, ChainStep::Submit);
    assert_eq!(kind, FailureKind::SubmissionTransportFailure);
    assert_eq!(submitter.submitted().len(), 1);
}

#[tokio::test]
async fn test_payload_too_large_is_never_sent() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Write an essay", vec![])]);
    let (mut harness, _unused) = Harness::new(fetcher, FakeSubmitter::scripted(vec![]));
    harness.text = Arc::new(FakeTextEngine::answering(json!("x".repeat(4096))));
    // quiz.example 无法访问，真的发出请求会得到传输错误
    harness.submitter = Arc::new(HttpSubmissionClient::new(
        reqwest::Client::new(),
        Duration::from_secs(1),
        1024,
    ));

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert_eq!(
        error_parts(&report.outcome),
        (ChainStep::Submit, FailureKind::PayloadTooLarge, START.to_string())
    );
}

#[tokio::test]
async fn test_answer_engine_failure_terminates() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Q", vec![])]);
    let submitter = FakeSubmitter::scripted(vec![]);
    let (mut harness, submitter) = Harness::new(fetcher, submitter);
    harness.text = Arc::new(FakeTextEngine::scripted(vec![Err(LlmError::EmptyContent {
        model: "fake".to_string(),
    }
    .into())]));

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert_eq!(
        error_parts(&report.outcome),
        (ChainStep::Answer, FailureKind::AnswerEngineFailure, START.to_string())
    );
    assert!(submitter.submitted().is_empty());
}

fn bar_chart() -> ChartSpec {
    ChartSpec {
        chart_type: ChartType::Bar,
        categories: vec!["A".into(), "B".into()],
        series: vec![ChartSeries {
            name: "count".into(),
            values: vec![3.0, 5.0],
        }],
        title: Some("Counts".into()),
        x_label: None,
        y_label: None,
    }
}

#[tokio::test]
async fn test_chart_reply_is_rendered_and_submitted_as_data_uri() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Plot a bar chart", vec![])]);
    let submitter = FakeSubmitter::scripted(vec![Ok(submission(true, None, None))]);
    let (mut harness, submitter) = Harness::new(fetcher, submitter);
    harness.text = Arc::new(FakeTextEngine::scripted(vec![Ok(ModelReply::Chart(
        bar_chart(),
    ))]));
    let png = vec![0x89, b'P', b'N', b'G', 9, 9];
    harness.chart = Arc::new(FakeChartRenderer::producing(png.clone()));

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;
    assert!(report.outcome.is_success());

    assert_eq!(harness.chart.specs.lock().unwrap().len(), 1);
    let payload = &submitter.submitted()[0].payload;
    assert_eq!(payload.answer, json!(ImageData::png(png).to_data_uri()));
    assert!(payload
        .answer
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
    assert!(payload.metadata.as_ref().unwrap().chart_rendered);
}

#[tokio::test]
async fn test_chart_render_failure_is_not_replaced_with_placeholder() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Plot a bar chart", vec![])]);
    let submitter = FakeSubmitter::scripted(vec![]);
    let (mut harness, submitter) = Harness::new(fetcher, submitter);
    harness.text = Arc::new(FakeTextEngine::scripted(vec![Ok(ModelReply::Chart(
        bar_chart(),
    ))]));
    harness.chart = Arc::new(FakeChartRenderer::failing());

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert_eq!(
        error_parts(&report.outcome),
        (ChainStep::Answer, FailureKind::ChartRenderFailure, START.to_string())
    );
    assert!(submitter.submitted().is_empty());
}

#[tokio::test]
async fn test_text_resource_download_failure_degrades_to_page_text() {
    // 加载器里没有 data.csv，下载会失败
    let page = quiz_page(START, "Download data.csv and count the rows.", vec![]);
    let fetcher = FakeFetcher::with_pages(vec![page]);
    let submitter = FakeSubmitter::scripted(vec![Ok(submission(true, None, None))]);
    let (mut harness, submitter) = Harness::new(fetcher, submitter);
    harness.loader = Arc::new(FakeLoader::default());

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert!(report.outcome.is_success());
    let asked = harness.text.asked();
    assert_eq!(asked.len(), 1);
    assert_eq!(asked[0].supporting_text, None);
    assert_eq!(submitter.submitted().len(), 1);
}

#[tokio::test]
async fn test_image_download_failure_is_an_answer_error() {
    let page = quiz_page(
        START,
        "Describe the picture.",
        vec![ResourceLink::from_tag("img", "https://cdn.example/missing.png")],
    );
    let fetcher = FakeFetcher::with_pages(vec![page]);
    let submitter = FakeSubmitter::scripted(vec![]);
    let (mut harness, submitter) = Harness::new(fetcher, submitter);
    harness.loader = Arc::new(FakeLoader::default());

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    assert_eq!(
        error_parts(&report.outcome),
        (ChainStep::Answer, FailureKind::AnswerEngineFailure, START.to_string())
    );
    assert!(submitter.submitted().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Q", vec![])]);
    let (harness, _submitter) = Harness::new(fetcher, FakeSubmitter::scripted(vec![]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = harness.flow().run(&ctx(), START, cancel).await;

    let (step, kind, _) = error_parts(&report.outcome);
    assert_eq!(step, ChainStep::Fetch);
    assert_eq!(kind, FailureKind::Cancelled);
}

#[tokio::test]
async fn test_cancel_interrupts_in_flight_step() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Q", vec![])])
        .slow(Duration::from_secs(10));
    let (harness, submitter) = Harness::new(fetcher, FakeSubmitter::scripted(vec![]));
    let flow = harness.flow();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let report = flow.run(&ctx(), START, cancel).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    let (_, kind, _) = error_parts(&report.outcome);
    assert_eq!(kind, FailureKind::Cancelled);
    assert!(submitter.submitted().is_empty());
}

#[tokio::test]
async fn test_chain_deadline_exceeded() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Q", vec![])])
        .slow(Duration::from_secs(10));
    let (mut harness, _submitter) = Harness::new(fetcher, FakeSubmitter::scripted(vec![]));
    harness.settings.chain_deadline = Duration::from_millis(100);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    let (step, kind, _) = error_parts(&report.outcome);
    assert_eq!(step, ChainStep::Fetch);
    assert_eq!(kind, FailureKind::DeadlineExceeded);
}

#[tokio::test]
async fn test_step_timeout_is_a_step_failure() {
    let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Q", vec![])])
        .slow(Duration::from_secs(10));
    let (mut harness, _submitter) = Harness::new(fetcher, FakeSubmitter::scripted(vec![]));
    harness.settings.fetch_timeout = Duration::from_millis(50);

    let report = harness
        .flow()
        .run(&ctx(), START, CancellationToken::new())
        .await;

    let (step, kind, _) = error_parts(&report.outcome);
    assert_eq!(step, ChainStep::Fetch);
    assert_eq!(kind, FailureKind::FetchFailure);
}

#[tokio::test]
async fn test_concurrent_chains_do_not_share_state() {
    let fetcher = FakeFetcher::with_pages(vec![
        quiz_page("https://quiz.example/a", "A", vec![]),
        quiz_page("https://quiz.example/b", "B", vec![]),
    ]);
    let submitter = FakeSubmitter::scripted(vec![
        Ok(submission(true, None, None)),
        Ok(submission(true, None, None)),
    ]);
    let (harness, _submitter) = Harness::new(fetcher, submitter);
    let flow = Arc::new(harness.flow());

    let ctx_a = ChainCtx::new("chain-a", identity());
    let ctx_b = ChainCtx::new("chain-b", identity());
    let (a, b) = tokio::join!(
        flow.run(&ctx_a, "https://quiz.example/a", CancellationToken::new()),
        flow.run(&ctx_b, "https://quiz.example/b", CancellationToken::new()),
    );

    assert_eq!(a.chain_id, "chain-a");
    assert_eq!(b.chain_id, "chain-b");
    assert_eq!(a.submissions.len(), 1);
    assert_eq!(b.submissions.len(), 1);
    assert_eq!(a.submissions[0].task_url, "https://quiz.example/a");
    assert_eq!(b.submissions[0].task_url, "https://quiz.example/b");
}

#[test]
fn test_report_serializes_for_logging() {
    let report = tokio_test::block_on(async {
        let fetcher = FakeFetcher::with_pages(vec![quiz_page(START, "Q", vec![])]);
        let submitter = FakeSubmitter::scripted(vec![Ok(submission(true, None, None))]);
        let (harness, _submitter) = Harness::new(fetcher, submitter);
        harness
            .flow()
            .run(&ctx(), START, CancellationToken::new())
            .await
    });

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["outcome"]["state"], "success");
    assert_eq!(value["chain_id"], "test-chain");
    assert_eq!(value["submissions"][0]["engine"], "text");
}
