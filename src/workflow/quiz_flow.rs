//! 答题链流程 - 流程层
//!
//! 核心职责：定义"一条答题链"的完整处理流程
//!
//! 流程顺序：
//! 1. 抓取页面 → 提取提交地址 → 资源分类
//! 2. 下载资源 → 文本 / 视觉模型作答（必要时先画图）
//! 3. 提交 → 根据结果决定：下一题 / 重试 / 结束
//!
//! 链式跳转用显式循环表达，不递归。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, FlowError};
use crate::models::{
    AnswerMetadata, AnswerPayload, ChainOutcome, ChainReport, ChainStep, EngineKind,
    FailureKind, ModelReply, PageContent, QuizTask, ResourceKind, StepRecord, SubmissionRecord,
    SubmissionResult,
};
use crate::services::{
    ChartRenderer, Classification, ImageData, LoadedResource, PageFetcher, ResourceClassifier,
    ResourceLoader, SubmissionClient, TextEngine, TextQuestion, VisionEngine, VisionQuestion,
};
use crate::utils::logging::truncate_text;
use crate::workflow::chain_ctx::ChainCtx;

/// 提交结果没有附带说明时使用的纠错信息
pub const DEFAULT_FEEDBACK: &str =
    "Your previous answer was incorrect. Please re-evaluate and try again.";

/// 流程依赖的所有能力
#[derive(Clone)]
pub struct FlowDeps {
    pub fetcher: Arc<dyn PageFetcher>,
    pub classifier: Arc<ResourceClassifier>,
    pub loader: Arc<dyn ResourceLoader>,
    pub text_engine: Arc<dyn TextEngine>,
    pub vision_engine: Arc<dyn VisionEngine>,
    pub chart_renderer: Arc<dyn ChartRenderer>,
    pub submitter: Arc<dyn SubmissionClient>,
}

/// 流程策略与各步骤的时间预算
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// 同一题允许的重试次数
    pub retry_limit: u32,
    pub chain_deadline: Duration,
    pub default_submit_url: Option<String>,
    pub fetch_timeout: Duration,
    pub llm_timeout: Duration,
    pub resource_timeout: Duration,
    pub chart_timeout: Duration,
    pub submit_timeout: Duration,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry_limit: config.retry_limit,
            chain_deadline: config.chain_deadline(),
            default_submit_url: config.default_submit_url.clone(),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            llm_timeout: Duration::from_secs(config.llm_timeout_secs),
            resource_timeout: Duration::from_secs(config.resource_timeout_secs),
            chart_timeout: Duration::from_secs(config.chart_timeout_secs),
            submit_timeout: Duration::from_secs(config.submit_timeout_secs),
        }
    }
}

/// 根据提交结果做出的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// 答对，进入下一题
    Advance(String),
    /// 答错但服务端给了下一题，直接跳过
    Skip(String),
    /// 答错且没有下一题，带着反馈重答
    Retry(String),
    /// 答对且没有下一题
    Success,
    /// 重试次数用完
    Exhausted,
}

/// 决策规则（按优先级）：
/// 1. 答对：有下一题则前进，否则成功结束
/// 2. 答错但有下一题：跳过
/// 3. 答错且没有下一题：还有重试次数则重试
/// 4. 否则重试用尽
pub fn decide(result: &SubmissionResult, task: &QuizTask, retry_limit: u32) -> Decision {
    match (result.correct, &result.next_url) {
        (true, Some(next)) => Decision::Advance(next.clone()),
        (true, None) => Decision::Success,
        (false, Some(next)) => Decision::Skip(next.clone()),
        (false, None) if task.retries_used() < retry_limit => Decision::Retry(
            result
                .message
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_FEEDBACK)
                .to_string(),
        ),
        (false, None) => Decision::Exhausted,
    }
}

/// 一条链运行期间的可变状态，只属于这条链
struct ChainRun<'a> {
    ctx: &'a ChainCtx,
    cancel: CancellationToken,
    deadline: Instant,
    steps: Vec<StepRecord>,
    submissions: Vec<SubmissionRecord>,
}

/// 作答步骤的产出
struct Answered {
    payload: AnswerPayload,
    engine: EngineKind,
}

/// 答题链流程
///
/// - 编排完整的答题链
/// - 决定何时抓取、何时重答、何时结束
/// - 不持有任何资源（page / browser）
/// - 只依赖业务能力（services）
pub struct QuizFlow {
    deps: FlowDeps,
    settings: FlowSettings,
}

impl QuizFlow {
    pub fn new(deps: FlowDeps, settings: FlowSettings) -> Self {
        Self { deps, settings }
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// 从 `start_url` 开始跑完整条链，总是返回报告，不会 panic 或返回错误
    pub async fn run(
        &self,
        ctx: &ChainCtx,
        start_url: &str,
        cancel: CancellationToken,
    ) -> ChainReport {
        let started_at = Utc::now();
        let mut run = ChainRun {
            ctx,
            cancel,
            deadline: Instant::now() + self.settings.chain_deadline,
            steps: Vec::new(),
            submissions: Vec::new(),
        };

        info!("{} 🚀 答题链开始: {}", ctx, start_url);
        let outcome = self.drive(&mut run, start_url).await;

        match &outcome {
            ChainOutcome::Success { last_url } => {
                info!("{} ✅ {}: 最后一题 {}", ctx, outcome.label(), last_url)
            }
            ChainOutcome::Exhausted { url, attempts } => warn!(
                "{} ⚠️ {}: {} 已作答 {} 次",
                ctx,
                outcome.label(),
                url,
                attempts
            ),
            ChainOutcome::Error {
                step,
                kind,
                url,
                message,
            } => error!(
                "{} ❌ {}: 步骤 {} ({:?}) 失败于 {}: {}",
                ctx,
                outcome.label(),
                step,
                kind,
                url,
                message
            ),
        }

        ChainReport {
            chain_id: ctx.chain_id.clone(),
            start_url: start_url.to_string(),
            outcome,
            steps: run.steps,
            submissions: run.submissions,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn drive(&self, run: &mut ChainRun<'_>, start_url: &str) -> ChainOutcome {
        let mut url = start_url.to_string();

        'chain: loop {
            let mut task = QuizTask::new(url.clone());
            info!("{} ➡️ 开始题目: {}", run.ctx, task.url);

            // ========== FETCH ==========
            let fetcher = Arc::clone(&self.deps.fetcher);
            let page = match self
                .guarded(
                    run,
                    &task,
                    ChainStep::Fetch,
                    self.settings.fetch_timeout,
                    fetcher.fetch(&task.url),
                )
                .await
            {
                Ok(page) => page,
                Err(e) => return failure(ChainStep::Fetch, &e, &task.url),
            };
            debug!(
                "{} 页面文本: {}",
                run.ctx,
                truncate_text(&page.raw_text, 200)
            );

            let Some(endpoint) = self
                .deps
                .classifier
                .extract_submit_url(&page)
                .or_else(|| self.settings.default_submit_url.clone())
            else {
                return ChainOutcome::Error {
                    step: ChainStep::Classify,
                    kind: FailureKind::MissingSubmitUrl,
                    url: task.url.clone(),
                    message: FlowError::MissingSubmitUrl {
                        url: task.url.clone(),
                    }
                    .to_string(),
                };
            };

            // ========== CLASSIFY ==========
            let classifier = Arc::clone(&self.deps.classifier);
            let classification = match self
                .guarded(
                    run,
                    &task,
                    ChainStep::Classify,
                    self.settings.llm_timeout,
                    classifier.classify(&page),
                )
                .await
            {
                Ok(c) => c,
                Err(e) => return failure(ChainStep::Classify, &e, &task.url),
            };
            info!(
                "{} 🏷️ 资源类型: {} {}",
                run.ctx,
                classification.kind,
                classification.resource_url.as_deref().map(short_url).unwrap_or_default()
            );

            let resource = match self.load_resource(run, &task, &classification).await {
                Ok(resource) => resource,
                Err(e) => return failure(ChainStep::Answer, &e, &task.url),
            };

            // ========== ANSWER → SUBMIT → DECIDE ==========
            loop {
                let answered = match self
                    .answer(run, &task, &page, &classification, &resource)
                    .await
                {
                    Ok(answered) => answered,
                    Err(e) => return failure(ChainStep::Answer, &e, &task.url),
                };

                info!(
                    "{} 📤 第 {} 次提交: {}",
                    run.ctx,
                    task.attempt_count,
                    truncate_text(&answered.payload.answer.to_string(), 80)
                );

                let submitter = Arc::clone(&self.deps.submitter);
                let identity = run.ctx.identity.clone();
                let result = match self
                    .guarded(
                        run,
                        &task,
                        ChainStep::Submit,
                        self.settings.submit_timeout,
                        submitter.submit(&endpoint, &answered.payload, &identity, &task.url),
                    )
                    .await
                {
                    Ok(result) => result,
                    Err(e) => return failure(ChainStep::Submit, &e, &task.url),
                };

                run.submissions.push(SubmissionRecord {
                    task_url: task.url.clone(),
                    attempt: task.attempt_count,
                    resource_kind: classification.kind,
                    engine: answered.engine,
                    correct: result.correct,
                    next_url: result.next_url.clone(),
                    message: result.message.clone(),
                });

                match decide(&result, &task, self.settings.retry_limit) {
                    Decision::Advance(next) => {
                        info!("{} ✓ 回答正确，进入下一题", run.ctx);
                        url = next;
                        continue 'chain;
                    }
                    Decision::Skip(next) => {
                        warn!("{} ⏭️ 回答错误，服务端允许跳过，进入下一题", run.ctx);
                        url = next;
                        continue 'chain;
                    }
                    Decision::Success => {
                        return ChainOutcome::Success { last_url: task.url };
                    }
                    Decision::Retry(feedback) => {
                        warn!(
                            "{} 🔁 回答错误，带着反馈重答: {}",
                            run.ctx,
                            truncate_text(&feedback, 120)
                        );
                        task.retry_with(feedback);
                    }
                    Decision::Exhausted => {
                        return ChainOutcome::Exhausted {
                            attempts: task.attempt_count,
                            url: task.url,
                        };
                    }
                }
            }
        }
    }

    /// 下载分类出的资源
    ///
    /// 文本类资源下载失败时退回纯文本作答；图片 / PDF 失败则作答失败。
    async fn load_resource(
        &self,
        run: &mut ChainRun<'_>,
        task: &QuizTask,
        classification: &Classification,
    ) -> AppResult<LoadedResource> {
        if classification.resource_url.is_none() {
            return Ok(LoadedResource::None);
        }

        let loader = Arc::clone(&self.deps.loader);
        let loaded = self
            .guarded(
                run,
                task,
                ChainStep::Answer,
                self.settings.resource_timeout,
                loader.load(classification),
            )
            .await;

        match loaded {
            Ok(resource) => Ok(resource),
            Err(e) if e.is_cancelled() || e.is_deadline_exceeded() => Err(e),
            Err(e) if matches!(classification.kind, ResourceKind::Image | ResourceKind::Pdf) => {
                Err(e)
            }
            Err(e) => {
                warn!("{} ⚠️ 资源下载失败，仅用页面文本作答: {}", run.ctx, e);
                Ok(LoadedResource::None)
            }
        }
    }

    async fn answer(
        &self,
        run: &mut ChainRun<'_>,
        task: &QuizTask,
        page: &PageContent,
        classification: &Classification,
        resource: &LoadedResource,
    ) -> AppResult<Answered> {
        let feedback = task.prior_feedback.clone();

        let (reply, engine) = match resource {
            LoadedResource::Images { images } => {
                let question = VisionQuestion {
                    page_text: page.raw_text.clone(),
                    images: images.iter().map(ImageData::to_data_uri).collect(),
                    feedback,
                };
                info!("{} 👁️ 调用视觉模型 ({} 张图片)", run.ctx, question.images.len());
                let engine = Arc::clone(&self.deps.vision_engine);
                let reply = self
                    .guarded(
                        run,
                        task,
                        ChainStep::Answer,
                        self.settings.llm_timeout,
                        async move { engine.answer(&question).await },
                    )
                    .await?;
                (reply, EngineKind::Vision)
            }
            LoadedResource::Text { .. } | LoadedResource::None => {
                let supporting_text = match resource {
                    LoadedResource::Text { content } => Some(content.clone()),
                    _ => None,
                };
                let question = TextQuestion {
                    page_text: page.raw_text.clone(),
                    supporting_text,
                    feedback,
                };
                info!("{} 🧠 调用文本模型", run.ctx);
                let engine = Arc::clone(&self.deps.text_engine);
                let reply = self
                    .guarded(
                        run,
                        task,
                        ChainStep::Answer,
                        self.settings.llm_timeout,
                        async move { engine.answer(&question).await },
                    )
                    .await?;
                (reply, EngineKind::Text)
            }
        };

        let (answer, chart_rendered) = match reply {
            ModelReply::Answer(answer) => (answer, false),
            ModelReply::Chart(spec) => {
                info!("{} 📊 需要生成图表: {:?}", run.ctx, spec.chart_type);
                let renderer = Arc::clone(&self.deps.chart_renderer);
                let png = self
                    .guarded(
                        run,
                        task,
                        ChainStep::Answer,
                        self.settings.chart_timeout,
                        async move { renderer.render(&spec).await },
                    )
                    .await
                    .map_err(as_chart_failure)?;
                (json!(ImageData::png(png).to_data_uri()), true)
            }
        };

        Ok(Answered {
            payload: AnswerPayload::new(answer).with_metadata(AnswerMetadata {
                engine,
                resource_kind: classification.kind,
                chart_rendered,
            }),
            engine,
        })
    }

    /// 在超时、截止时间和取消信号的约束下执行一个步骤，并记录耗时
    async fn guarded<T, F>(
        &self,
        run: &mut ChainRun<'_>,
        task: &QuizTask,
        step: ChainStep,
        budget: Duration,
        fut: F,
    ) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let started = Instant::now();
        let remaining = run.deadline.saturating_duration_since(started);

        let result = if run.cancel.is_cancelled() {
            Err(FlowError::Cancelled.into())
        } else if remaining.is_zero() {
            Err(self.deadline_error())
        } else {
            let limit = budget.min(remaining);
            tokio::select! {
                biased;
                _ = run.cancel.cancelled() => Err(FlowError::Cancelled.into()),
                res = timeout(limit, fut) => match res {
                    Ok(inner) => inner,
                    Err(_) if remaining <= budget => Err(self.deadline_error()),
                    Err(_) => Err(FlowError::StepTimeout {
                        step: step.to_string(),
                        secs: limit.as_secs(),
                    }
                    .into()),
                },
            }
        };

        run.steps.push(StepRecord {
            task_url: task.url.clone(),
            attempt: task.attempt_count,
            step,
            elapsed_ms: started.elapsed().as_millis() as u64,
            ok: result.is_ok(),
        });
        result
    }

    fn deadline_error(&self) -> AppError {
        FlowError::DeadlineExceeded {
            secs: self.settings.chain_deadline.as_secs(),
        }
        .into()
    }
}

/// 把步骤错误转换成带标签的终止状态
fn failure(step: ChainStep, err: &AppError, url: &str) -> ChainOutcome {
    ChainOutcome::Error {
        step,
        kind: failure_kind(step, err),
        url: url.to_string(),
        message: err.to_string(),
    }
}

fn failure_kind(step: ChainStep, err: &AppError) -> FailureKind {
    if err.is_cancelled() {
        return FailureKind::Cancelled;
    }
    if err.is_deadline_exceeded() {
        return FailureKind::DeadlineExceeded;
    }
    match step {
        ChainStep::Fetch => FailureKind::FetchFailure,
        ChainStep::Classify => FailureKind::ClassificationFailure,
        ChainStep::Answer => match err {
            AppError::Flow(FlowError::InvalidChartSpec { .. })
            | AppError::Flow(FlowError::ChartRenderFailed { .. }) => {
                FailureKind::ChartRenderFailure
            }
            _ => FailureKind::AnswerEngineFailure,
        },
        ChainStep::Submit if err.is_payload_too_large() => FailureKind::PayloadTooLarge,
        ChainStep::Submit if err.is_malformed_response() => FailureKind::MalformedResponse,
        ChainStep::Submit => FailureKind::SubmissionTransportFailure,
    }
}

/// 图表步骤的错误统一归为渲染失败（取消和截止时间除外）
fn as_chart_failure(err: AppError) -> AppError {
    match err {
        AppError::Flow(FlowError::Cancelled)
        | AppError::Flow(FlowError::DeadlineExceeded { .. })
        | AppError::Flow(FlowError::InvalidChartSpec { .. })
        | AppError::Flow(FlowError::ChartRenderFailed { .. }) => err,
        other => AppError::chart_render_failed(other.to_string()),
    }
}

fn short_url(url: &str) -> String {
    if url.starts_with("data:") {
        truncate_text(url, 40)
    } else {
        url.to_string()
    }
}
