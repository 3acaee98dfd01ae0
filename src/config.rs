use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置
///
/// 加载顺序：内置默认值 → `agent.toml`（可选）→ 环境变量
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 服务配置 ---
    pub server_host: String,
    pub server_port: u16,
    /// 入站请求 / 出站提交的 JSON 大小上限
    pub max_payload_bytes: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 身份配置 ---
    pub email: String,
    pub secret: String,
    // --- 文本模型 ---
    pub text_llm_api_key: String,
    pub text_llm_api_base_url: String,
    pub text_llm_model_name: String,
    // --- 视觉模型 ---
    pub vision_llm_api_key: String,
    pub vision_llm_api_base_url: String,
    pub vision_llm_model_name: String,
    // --- 答题链策略 ---
    /// 同一题答错且无下一题时允许的重试次数
    pub retry_limit: u32,
    /// 整条链的截止时间
    pub chain_deadline_secs: u64,
    /// 页面中找不到提交地址时使用的兜底地址
    pub default_submit_url: Option<String>,
    // --- 单步超时（秒） ---
    pub fetch_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    pub chart_timeout_secs: u64,
    pub submit_timeout_secs: u64,
    pub resource_timeout_secs: u64,
    // --- 浏览器配置 ---
    /// 已启动浏览器的调试端口，设置后不再自行启动
    pub browser_debug_port: Option<u16>,
    pub browser_executable: Option<String>,
    pub browser_args: Vec<String>,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            max_payload_bytes: 1024 * 1024,
            verbose_logging: false,
            email: String::new(),
            secret: String::new(),
            text_llm_api_key: String::new(),
            text_llm_api_base_url: "https://api.groq.com/openai/v1".to_string(),
            text_llm_model_name: "llama-3.1-8b-instant".to_string(),
            vision_llm_api_key: String::new(),
            vision_llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai"
                .to_string(),
            vision_llm_model_name: "gemini-2.5-flash".to_string(),
            retry_limit: 1,
            chain_deadline_secs: 290,
            default_submit_url: None,
            fetch_timeout_secs: 30,
            llm_timeout_secs: 60,
            chart_timeout_secs: 20,
            submit_timeout_secs: 30,
            resource_timeout_secs: 30,
            browser_debug_port: None,
            browser_executable: None,
            browser_args: vec![
                "--no-sandbox".to_string(),
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl Config {
    /// 加载完整配置：`.env` → 配置文件 → 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = std::env::var("AGENT_CONFIG").unwrap_or_else(|_| "agent.toml".to_string());
        let base = if Path::new(&path).exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                ConfigError::FileParseFailed {
                    path: path.clone(),
                    source: Box::new(e),
                }
            })?;
            Self::from_toml_str(&content, &path)?
        } else {
            Self::default()
        };

        base.with_env_overrides()
    }

    /// 只使用默认值和环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// 解析 TOML 配置内容，未出现的字段使用默认值
    pub fn from_toml_str(content: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::FileParseFailed {
            path: path.to_string(),
            source: Box::new(e),
        })
    }

    fn with_env_overrides(self) -> Result<Self, ConfigError> {
        Ok(Self {
            server_host: env_string("SERVER_HOST", self.server_host),
            server_port: env_parse("SERVER_PORT", self.server_port)?,
            max_payload_bytes: env_parse("MAX_PAYLOAD_BYTES", self.max_payload_bytes)?,
            verbose_logging: env_parse("VERBOSE_LOGGING", self.verbose_logging)?,
            email: env_string("MY_EMAIL", self.email),
            secret: env_string("MY_SECRET", self.secret),
            text_llm_api_key: env_string("TEXT_LLM_API_KEY", self.text_llm_api_key),
            text_llm_api_base_url: env_string("TEXT_LLM_API_BASE_URL", self.text_llm_api_base_url),
            text_llm_model_name: env_string("TEXT_LLM_MODEL_NAME", self.text_llm_model_name),
            vision_llm_api_key: env_string("VISION_LLM_API_KEY", self.vision_llm_api_key),
            vision_llm_api_base_url: env_string(
                "VISION_LLM_API_BASE_URL",
                self.vision_llm_api_base_url,
            ),
            vision_llm_model_name: env_string("VISION_LLM_MODEL_NAME", self.vision_llm_model_name),
            retry_limit: env_parse("QUIZ_RETRY_LIMIT", self.retry_limit)?,
            chain_deadline_secs: env_parse("CHAIN_DEADLINE_SECS", self.chain_deadline_secs)?,
            default_submit_url: std::env::var("DEFAULT_SUBMIT_URL")
                .ok()
                .or(self.default_submit_url),
            fetch_timeout_secs: env_parse("FETCH_TIMEOUT_SECS", self.fetch_timeout_secs)?,
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS", self.llm_timeout_secs)?,
            chart_timeout_secs: env_parse("CHART_TIMEOUT_SECS", self.chart_timeout_secs)?,
            submit_timeout_secs: env_parse("SUBMIT_TIMEOUT_SECS", self.submit_timeout_secs)?,
            resource_timeout_secs: env_parse("RESOURCE_TIMEOUT_SECS", self.resource_timeout_secs)?,
            browser_debug_port: match std::env::var("BROWSER_DEBUG_PORT") {
                Ok(raw) => Some(parse_value("BROWSER_DEBUG_PORT", &raw)?),
                Err(_) => self.browser_debug_port,
            },
            browser_executable: std::env::var("BROWSER_EXECUTABLE")
                .ok()
                .or(self.browser_executable),
            browser_args: self.browser_args,
            user_agent: env_string("BROWSER_USER_AGENT", self.user_agent),
        })
    }

    /// 检查关键配置项
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(invalid("secret", "MY_SECRET 不能为空"));
        }
        if self.max_payload_bytes == 0 {
            return Err(invalid("max_payload_bytes", "必须大于 0"));
        }
        let timeouts = [
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("llm_timeout_secs", self.llm_timeout_secs),
            ("chart_timeout_secs", self.chart_timeout_secs),
            ("submit_timeout_secs", self.submit_timeout_secs),
            ("resource_timeout_secs", self.resource_timeout_secs),
            ("chain_deadline_secs", self.chain_deadline_secs),
        ];
        for (field, secs) in timeouts {
            if secs == 0 {
                return Err(invalid(field, "超时时间必须大于 0"));
            }
        }
        Ok(())
    }

    pub fn chain_deadline(&self) -> Duration {
        Duration::from_secs(self.chain_deadline_secs)
    }

    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            email: "agent@example.com".to_string(),
            secret: "test-secret".to_string(),
            ..Self::default()
        }
    }
}

fn env_string(name: &str, fallback: String) -> String {
    std::env::var(name).unwrap_or(fallback)
}

fn env_parse<T: FromStr>(name: &str, fallback: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(fallback),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: name.to_string(),
            value: raw.to_string(),
            expected_type: std::any::type_name::<T>().to_string(),
        })
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
