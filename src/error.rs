use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 外部 HTTP 调用错误（资源下载、答案提交）
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 答题链流程错误
    #[error("流程错误: {0}")]
    Flow(#[from] FlowError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件 / 子进程 IO 错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 启动无头浏览器失败
    #[error("启动浏览器失败: {source}")]
    LaunchFailed { source: BoxedSource },
    /// 连接已有浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed { port: u16, source: BoxedSource },
    /// 创建页面失败
    #[error("创建页面失败: {source}")]
    PageCreationFailed { source: BoxedSource },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed { url: String, source: BoxedSource },
    /// 页面返回 HTTP 错误状态
    #[error("页面 {url} 返回 HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed { source: BoxedSource },
    /// 截图失败
    #[error("截图失败: {source}")]
    ScreenshotFailed { source: BoxedSource },
}

/// 外部 HTTP 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("请求失败 ({endpoint}): {source}")]
    RequestFailed { endpoint: String, source: BoxedSource },
    /// 请求超时
    #[error("请求超时 ({endpoint}), 超过 {secs} 秒")]
    Timeout { endpoint: String, secs: u64 },
    /// 返回非 2xx 状态码
    #[error("返回错误状态 ({endpoint}): HTTP {status}")]
    HttpStatus { endpoint: String, status: u16 },
    /// 响应结构不符合约定
    #[error("响应格式错误 ({endpoint}): {reason}")]
    MalformedResponse { endpoint: String, reason: String },
    /// 提交体超过大小上限，未发送
    #[error("提交内容过大: {size} 字节，上限 {limit} 字节")]
    PayloadTooLarge { size: usize, limit: usize },
    /// 资源地址无法解析
    #[error("无效的资源地址: {url}")]
    InvalidResourceUrl { url: String },
    /// JSON 解析失败
    #[error("JSON解析失败: {source}")]
    JsonParseFailed { source: BoxedSource },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed { model: String, source: BoxedSource },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 返回内容不是合法 JSON
    #[error("无法解析LLM返回的JSON (响应: {response}): {reason}")]
    ReplyParseFailed { response: String, reason: String },
    /// JSON 中缺少 answer / chart 字段
    #[error("LLM返回中没有答案 (响应: {response})")]
    MissingAnswer { response: String },
    /// 请求参数构建失败
    #[error("LLM请求构建失败: {source}")]
    RequestBuildFailed { source: BoxedSource },
}

/// 答题链流程错误
#[derive(Debug, Error)]
pub enum FlowError {
    /// 页面中找不到提交地址
    #[error("页面中找不到提交地址: {url}")]
    MissingSubmitUrl { url: String },
    /// 资源分类失败
    #[error("资源分类失败: {reason}")]
    ClassificationFailed { reason: String },
    /// 图表描述不合法
    #[error("图表描述不合法: {reason}")]
    InvalidChartSpec { reason: String },
    /// 图表渲染失败
    #[error("图表渲染失败: {reason}")]
    ChartRenderFailed { reason: String },
    /// PDF 转图片失败
    #[error("PDF 转图片失败: {reason}")]
    PdfRasterizeFailed { reason: String },
    /// 单步超时
    #[error("{step} 超时 ({secs} 秒)")]
    StepTimeout { step: String, secs: u64 },
    /// 整条链超过截止时间
    #[error("答题链超过截止时间 ({secs} 秒)")]
    DeadlineExceeded { secs: u64 },
    /// 被取消
    #[error("答题链已取消")]
    Cancelled,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件解析失败
    #[error("配置文件 {path} 解析失败: {source}")]
    FileParseFailed { path: String, source: BoxedSource },
    /// 配置项取值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: String, reason: String },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Api(ApiError::JsonParseFailed {
            source: Box::new(err),
        })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_default();
        AppError::Api(ApiError::RequestFailed {
            endpoint,
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建导航失败错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建请求失败错误
    pub fn api_request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建响应格式错误
    pub fn malformed_response(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Api(ApiError::MalformedResponse {
            endpoint: endpoint.into(),
            reason: reason.into(),
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建分类失败错误
    pub fn classification_failed(reason: impl Into<String>) -> Self {
        AppError::Flow(FlowError::ClassificationFailed {
            reason: reason.into(),
        })
    }

    /// 创建图表渲染失败错误
    pub fn chart_render_failed(reason: impl Into<String>) -> Self {
        AppError::Flow(FlowError::ChartRenderFailed {
            reason: reason.into(),
        })
    }

    /// 是否为提交体超限
    pub fn is_payload_too_large(&self) -> bool {
        matches!(self, AppError::Api(ApiError::PayloadTooLarge { .. }))
    }

    /// 是否为响应格式错误
    pub fn is_malformed_response(&self) -> bool {
        matches!(
            self,
            AppError::Api(ApiError::MalformedResponse { .. })
                | AppError::Api(ApiError::JsonParseFailed { .. })
        )
    }

    /// 是否为超截止时间
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, AppError::Flow(FlowError::DeadlineExceeded { .. }))
    }

    /// 是否为取消
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Flow(FlowError::Cancelled))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Config(_) => StatusCode::BAD_REQUEST,
            AppError::Api(ApiError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Api(_) | AppError::Browser(_) | AppError::Llm(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
