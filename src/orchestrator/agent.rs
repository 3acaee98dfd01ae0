//! 答题代理 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：启动 / 连接浏览器、创建 HTTP 客户端和模型客户端
//! 2. **资源管理**：唯一持有 BrowserSession，进程退出时关闭
//! 3. **链调度**：每个入站请求一条链，在独立的 tokio 任务中运行
//! 4. **取消**：每条链拿到根取消令牌的子令牌，关闭时统一取消
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单条链的细节，委托 `QuizFlow`
//! - **无共享可变状态**：链之间只共享只读的能力对象和一个计数器

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::browser::{self, BrowserSession};
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{ChainReport, QuizRequest};
use crate::services::{
    BrowserChartRenderer, BrowserPageFetcher, HttpResourceLoader, HttpSubmissionClient,
    LlmService, ResourceClassifier,
};
use crate::utils::logging::{log_chain_report, log_startup};
use crate::workflow::{ChainCtx, FlowDeps, FlowSettings, QuizFlow};

/// 进程级共享状态
///
/// 作为 axum 的 State 使用，clone 只复制引用
#[derive(Clone)]
pub struct AgentState {
    config: Arc<Config>,
    flow: Arc<QuizFlow>,
    shutdown: CancellationToken,
    active: Arc<AtomicUsize>,
    browser: Option<Arc<BrowserSession>>,
}

impl AgentState {
    /// 初始化：创建浏览器、HTTP 客户端、模型客户端，组装流程
    pub async fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config);

        let session = match config.browser_debug_port {
            Some(port) => browser::connect_to_browser(port).await?,
            None => browser::launch_headless_browser(&config).await?,
        };
        let session = Arc::new(session);

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        let text_engine = Arc::new(LlmService::text(&config));
        let vision_engine = Arc::new(LlmService::vision(&config));
        info!(
            "🧠 文本模型: {}, 视觉模型: {}",
            text_engine.model_name(),
            vision_engine.model_name()
        );

        let deps = FlowDeps {
            fetcher: Arc::new(BrowserPageFetcher::new(Arc::clone(&session))),
            classifier: Arc::new(ResourceClassifier::new(Some(text_engine.clone()))?),
            loader: Arc::new(HttpResourceLoader::new(
                http.clone(),
                Duration::from_secs(config.resource_timeout_secs),
            )),
            text_engine,
            vision_engine,
            chart_renderer: Arc::new(BrowserChartRenderer::new(Arc::clone(&session))),
            submitter: Arc::new(HttpSubmissionClient::new(
                http,
                Duration::from_secs(config.submit_timeout_secs),
                config.max_payload_bytes,
            )),
        };

        let flow = QuizFlow::new(deps, FlowSettings::from_config(&config));
        Ok(Self::from_parts(config, flow, Some(session)))
    }

    /// 用现成的流程组装状态（测试中注入假实现）
    pub fn from_parts(config: Config, flow: QuizFlow, browser: Option<Arc<BrowserSession>>) -> Self {
        Self {
            config: Arc::new(config),
            flow: Arc::new(flow),
            shutdown: CancellationToken::new(),
            active: Arc::new(AtomicUsize::new(0)),
            browser,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 当前正在运行的链数
    pub fn active_chains(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// 入站请求的 secret 是否与配置一致
    pub fn verify_secret(&self, secret: &str) -> bool {
        !self.config.secret.is_empty() && secret == self.config.secret
    }

    /// 在后台启动一条链，立即返回链 ID
    pub fn spawn_chain(&self, request: QuizRequest) -> String {
        let chain_id = new_chain_id();
        let state = self.clone();
        let id = chain_id.clone();
        tokio::spawn(async move {
            state.run_with_id(id, request).await;
        });
        chain_id
    }

    /// 同步跑完一条链并返回报告
    pub async fn run_chain(&self, request: QuizRequest) -> ChainReport {
        self.run_with_id(new_chain_id(), request).await
    }

    async fn run_with_id(&self, chain_id: String, request: QuizRequest) -> ChainReport {
        let _active = ActiveGuard::enter(&self.active);
        let ctx = ChainCtx::new(chain_id, request.identity());
        let cancel = self.shutdown.child_token();

        let span = info_span!("chain", chain_id = %ctx.chain_id, start_url = %request.url);
        let report = self
            .flow
            .run(&ctx, &request.url, cancel)
            .instrument(span)
            .await;

        log_chain_report(&report);
        report
    }

    /// 取消所有链并关闭浏览器
    pub async fn shutdown(&self) {
        info!("🛑 正在关闭，取消 {} 条运行中的链", self.active_chains());
        self.shutdown.cancel();
        if let Some(session) = &self.browser {
            session.close().await;
        }
        debug!("资源已释放");
    }
}

/// 运行中链计数，离开作用域时自动减一
struct ActiveGuard {
    counter: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

fn new_chain_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}
