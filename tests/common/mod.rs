//! 集成测试共用的假实现
//!
//! 每个假实现都会记录调用，便于断言"调用了谁、调用了几次、参数是什么"。

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use serde_json::Value as JsonValue;
use tokio::net::TcpListener;

use quiz_chain_agent::error::{AppError, AppResult, BrowserError, LlmError};
use quiz_chain_agent::models::{
    AnswerPayload, ChartSpec, Identity, ModelReply, PageContent, ResourceLink, SubmissionResult,
};
use quiz_chain_agent::services::{
    ChartRenderer, Classification, LoadedResource, PageFetcher, ResourceClassifier,
    ResourceLoader, SubmissionClient, TextEngine, TextQuestion, VisionEngine, VisionQuestion,
};
use quiz_chain_agent::workflow::{FlowDeps, FlowSettings, QuizFlow};
use quiz_chain_agent::Config;

pub const SUBMIT_URL: &str = "https://quiz.example/submit";

/// 测试用配置
pub fn test_config() -> Config {
    Config {
        email: "agent@example.com".to_string(),
        secret: "test-secret".to_string(),
        ..Config::default()
    }
}

pub fn identity() -> Identity {
    Identity {
        email: "agent@example.com".to_string(),
        secret: "test-secret".to_string(),
    }
}

/// 带提交地址的题目页面
pub fn quiz_page(url: &str, question: &str, links: Vec<ResourceLink>) -> PageContent {
    PageContent::new(
        url,
        format!("{question}\nPost your answer to {SUBMIT_URL}"),
        links,
    )
}

pub fn submission(correct: bool, next: Option<&str>, message: Option<&str>) -> SubmissionResult {
    SubmissionResult {
        correct,
        next_url: next.map(str::to_string),
        message: message.map(str::to_string),
    }
}

// ========== 页面抓取 ==========

#[derive(Default)]
pub struct FakeFetcher {
    pages: Mutex<HashMap<String, PageContent>>,
    pub calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl FakeFetcher {
    pub fn with_pages(pages: Vec<PageContent>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().map(|p| (p.url.clone(), p)).collect()),
            ..Self::default()
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> AppResult<PageContent> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let page = self.pages.lock().unwrap().get(url).cloned();
        page.ok_or_else(|| {
            BrowserError::HttpStatus {
                url: url.to_string(),
                status: 404,
            }
            .into()
        })
    }
}

// ========== 模型 ==========

/// 按顺序返回预设回复；用完后重复最后一个答案
pub struct FakeTextEngine {
    replies: Mutex<VecDeque<AppResult<ModelReply>>>,
    fallback: JsonValue,
    pub questions: Mutex<Vec<TextQuestion>>,
    located: Option<String>,
    locate_fails: bool,
    pub locate_calls: Mutex<Vec<String>>,
}

impl FakeTextEngine {
    pub fn answering(answer: JsonValue) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: answer,
            questions: Mutex::new(Vec::new()),
            located: None,
            locate_fails: false,
            locate_calls: Mutex::new(Vec::new()),
        }
    }

    /// 分类兜底时给出的资源地址
    pub fn locating(mut self, url: &str) -> Self {
        self.located = Some(url.to_string());
        self
    }

    /// 分类兜底时模型调用失败
    pub fn failing_to_locate(mut self) -> Self {
        self.locate_fails = true;
        self
    }

    pub fn locate_count(&self) -> usize {
        self.locate_calls.lock().unwrap().len()
    }

    pub fn scripted(replies: Vec<AppResult<ModelReply>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::answering(JsonValue::Null)
        }
    }

    pub fn asked(&self) -> Vec<TextQuestion> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextEngine for FakeTextEngine {
    async fn answer(&self, question: &TextQuestion) -> AppResult<ModelReply> {
        self.questions.lock().unwrap().push(question.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => Ok(ModelReply::Answer(self.fallback.clone())),
        }
    }

    async fn locate_resource(&self, page_text: &str) -> AppResult<Option<String>> {
        self.locate_calls.lock().unwrap().push(page_text.to_string());
        if self.locate_fails {
            return Err(LlmError::EmptyContent {
                model: "fake".to_string(),
            }
            .into());
        }
        Ok(self.located.clone())
    }
}

pub struct FakeVisionEngine {
    answer: JsonValue,
    pub questions: Mutex<Vec<VisionQuestion>>,
}

impl FakeVisionEngine {
    pub fn answering(answer: JsonValue) -> Self {
        Self {
            answer,
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<VisionQuestion> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionEngine for FakeVisionEngine {
    async fn answer(&self, question: &VisionQuestion) -> AppResult<ModelReply> {
        self.questions.lock().unwrap().push(question.clone());
        Ok(ModelReply::Answer(self.answer.clone()))
    }
}

// ========== 图表 ==========

pub struct FakeChartRenderer {
    png: Option<Vec<u8>>,
    pub specs: Mutex<Vec<ChartSpec>>,
}

impl FakeChartRenderer {
    pub fn producing(png: Vec<u8>) -> Self {
        Self {
            png: Some(png),
            specs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            png: None,
            specs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChartRenderer for FakeChartRenderer {
    async fn render(&self, spec: &ChartSpec) -> AppResult<Vec<u8>> {
        self.specs.lock().unwrap().push(spec.clone());
        self.png
            .clone()
            .ok_or_else(|| AppError::chart_render_failed("renderer offline"))
    }
}

// ========== 资源下载 ==========

#[derive(Default)]
pub struct FakeLoader {
    resources: HashMap<String, LoadedResource>,
    pub calls: Mutex<Vec<Classification>>,
}

impl FakeLoader {
    pub fn with(resources: Vec<(&str, LoadedResource)>) -> Self {
        Self {
            resources: resources
                .into_iter()
                .map(|(url, r)| (url.to_string(), r))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn loaded(&self) -> Vec<Classification> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceLoader for FakeLoader {
    async fn load(&self, classification: &Classification) -> AppResult<LoadedResource> {
        self.calls.lock().unwrap().push(classification.clone());
        let Some(url) = &classification.resource_url else {
            return Ok(LoadedResource::None);
        };
        self.resources.get(url).cloned().ok_or_else(|| {
            AppError::Api(quiz_chain_agent::error::ApiError::HttpStatus {
                endpoint: url.clone(),
                status: 404,
            })
        })
    }
}

// ========== 提交 ==========

#[derive(Debug, Clone)]
pub struct SubmitCall {
    pub endpoint: String,
    pub payload: AnswerPayload,
    pub identity: Identity,
    pub task_url: String,
}

pub struct FakeSubmitter {
    results: Mutex<VecDeque<AppResult<SubmissionResult>>>,
    pub calls: Mutex<Vec<SubmitCall>>,
}

impl FakeSubmitter {
    pub fn scripted(results: Vec<AppResult<SubmissionResult>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn submitted(&self) -> Vec<SubmitCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionClient for FakeSubmitter {
    async fn submit(
        &self,
        endpoint: &str,
        payload: &AnswerPayload,
        identity: &Identity,
        task_url: &str,
    ) -> AppResult<SubmissionResult> {
        self.calls.lock().unwrap().push(SubmitCall {
            endpoint: endpoint.to_string(),
            payload: payload.clone(),
            identity: identity.clone(),
            task_url: task_url.to_string(),
        });
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Other("没有预设的提交结果".to_string())))
    }
}

// ========== 组装 ==========

/// 一组假实现，测试结束后可以逐个检查调用记录
pub struct Harness {
    pub fetcher: Arc<FakeFetcher>,
    pub loader: Arc<dyn ResourceLoader>,
    pub text: Arc<FakeTextEngine>,
    pub vision: Arc<FakeVisionEngine>,
    pub chart: Arc<FakeChartRenderer>,
    pub submitter: Arc<dyn SubmissionClient>,
    pub settings: FlowSettings,
}

impl Harness {
    pub fn new(fetcher: FakeFetcher, submitter: FakeSubmitter) -> (Self, Arc<FakeSubmitter>) {
        let submitter = Arc::new(submitter);
        let harness = Self {
            fetcher: Arc::new(fetcher),
            loader: Arc::new(FakeLoader::default()),
            text: Arc::new(FakeTextEngine::answering(serde_json::json!(42))),
            vision: Arc::new(FakeVisionEngine::answering(serde_json::json!("cat"))),
            chart: Arc::new(FakeChartRenderer::producing(vec![0x89, b'P', b'N', b'G'])),
            submitter: submitter.clone(),
            settings: FlowSettings::from_config(&test_config()),
        };
        (harness, submitter)
    }

    pub fn flow(&self) -> QuizFlow {
        let deps = FlowDeps {
            fetcher: self.fetcher.clone(),
            classifier: Arc::new(ResourceClassifier::new(Some(self.text.clone())).unwrap()),
            loader: self.loader.clone(),
            text_engine: self.text.clone(),
            vision_engine: self.vision.clone(),
            chart_renderer: self.chart.clone(),
            submitter: self.submitter.clone(),
        };
        QuizFlow::new(deps, self.settings.clone())
    }
}

/// 在随机端口上启动一个本地 HTTP 服务，返回基础地址
pub async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
