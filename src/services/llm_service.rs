//! LLM 服务 - 业务能力层
//!
//! 只负责"调用模型作答"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Groq, Gemini 等）

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::Config;
use crate::constants::prompts;
use crate::error::{ApiError, AppError, AppResult, LlmError};
use crate::models::ModelReply;
use crate::services::answer_engine::{
    parse_model_reply, TextEngine, TextQuestion, VisionEngine, VisionQuestion,
};
use crate::utils::logging::truncate_text;

/// LLM 服务
///
/// 职责：
/// - 调用兼容 OpenAI 的接口作答
/// - 同一个类型既可作为文本模型也可作为视觉模型，取决于配置的模型
/// - 不出现提交地址 / 重试次数
/// - 不关心流程顺序
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    timeout: Duration,
}

impl LlmService {
    pub fn new(
        api_key: &str,
        api_base_url: &str,
        model_name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: model_name.into(),
            timeout,
        }
    }

    /// 文本推理模型
    pub fn text(config: &Config) -> Self {
        Self::new(
            &config.text_llm_api_key,
            &config.text_llm_api_base_url,
            config.text_llm_model_name.clone(),
            Duration::from_secs(config.llm_timeout_secs),
        )
    }

    /// 视觉模型
    pub fn vision(config: &Config) -> Self {
        Self::new(
            &config.vision_llm_api_key,
            &config.vision_llm_api_base_url,
            config.vision_llm_model_name.clone(),
            Duration::from_secs(config.llm_timeout_secs),
        )
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// 通用的 LLM 调用函数
    ///
    /// 其他所有 LLM 相关功能都基于此函数。
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    /// - `imgs`: 图片 URL 或 `data:` URI 列表（可选），会追加到用户消息中
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（字符串）
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
        imgs: Option<&[String]>,
    ) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(build_error)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = match imgs {
            Some(img_urls) if !img_urls.is_empty() => {
                // 使用 Vision API：构建包含文本和图片的内容
                let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
                    vec![ChatCompletionRequestUserMessageContentPart::Text(
                        ChatCompletionRequestMessageContentPartText {
                            text: user_message.to_string(),
                        },
                    )];

                for url in img_urls {
                    content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: url.clone(),
                                detail: Some(ImageDetail::Auto),
                            },
                        },
                    ));
                }

                debug!("使用 Vision API，包含 {} 张图片", img_urls.len());

                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(
                        content_parts,
                    ))
                    .build()
                    .map_err(build_error)?
            }
            _ => ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()
                .map_err(build_error)?,
        };

        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.2)
            .max_tokens(2048u32)
            .build()
            .map_err(build_error)?;

        let response = timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| ApiError::Timeout {
                endpoint: format!("llm:{}", self.model_name),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                AppError::llm_api_failed(&self.model_name, e)
            })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }

    async fn ask(
        &self,
        user_message: &str,
        system_message: &str,
        imgs: Option<&[String]>,
    ) -> AppResult<ModelReply> {
        let raw = self
            .send_to_llm(user_message, Some(system_message), imgs)
            .await?;
        debug!("模型回复: {}", truncate_text(&raw, 200));
        Ok(parse_model_reply(&raw)?)
    }
}

#[async_trait]
impl TextEngine for LlmService {
    async fn answer(&self, question: &TextQuestion) -> AppResult<ModelReply> {
        let user_message = build_text_message(question);
        self.ask(&user_message, prompts::ANSWER_SYSTEM_PROMPT, None)
            .await
    }

    async fn locate_resource(&self, page_text: &str) -> AppResult<Option<String>> {
        let user_message = format!("{}\n\n{}", prompts::LOCATE_RESOURCE_PROMPT, page_text);
        let raw = self.send_to_llm(&user_message, None, None).await?;
        Ok(parse_located_url(&raw))
    }
}

#[async_trait]
impl VisionEngine for LlmService {
    async fn answer(&self, question: &VisionQuestion) -> AppResult<ModelReply> {
        let user_message = build_vision_message(question);
        self.ask(
            &user_message,
            prompts::ANSWER_SYSTEM_PROMPT,
            Some(&question.images),
        )
        .await
    }
}

fn build_error(err: async_openai::error::OpenAIError) -> AppError {
    LlmError::RequestBuildFailed {
        source: Box::new(err),
    }
    .into()
}

/// 构建文本题的用户消息
fn build_text_message(question: &TextQuestion) -> String {
    let mut message = format!("QUESTION PAGE:\n{}\n", question.page_text.trim());

    if let Some(data) = &question.supporting_text {
        message.push_str(&format!("\nATTACHED DATA:\n{}\n", data.trim_end()));
    }
    if let Some(feedback) = &question.feedback {
        message.push_str(&format!(
            "\n{}\n{}\n",
            prompts::FEEDBACK_PREFIX,
            feedback.trim()
        ));
    }

    message.push_str(prompts::ANSWER_FORMAT_REMINDER);
    message
}

/// 构建视觉题的用户消息
fn build_vision_message(question: &VisionQuestion) -> String {
    let mut message = format!(
        "QUESTION PAGE:\n{}\n\nThe attached image(s) contain the data for this question.\n",
        question.page_text.trim()
    );

    if let Some(feedback) = &question.feedback {
        message.push_str(&format!(
            "\n{}\n{}\n",
            prompts::FEEDBACK_PREFIX,
            feedback.trim()
        ));
    }

    message.push_str(prompts::ANSWER_FORMAT_REMINDER);
    message
}

/// 解析资源定位回复：一个 URL，或 `NONE`
fn parse_located_url(raw: &str) -> Option<String> {
    let token = raw.split_whitespace().next()?;
    let candidate = token
        .trim_start_matches(['`', '"', '\''])
        .trim_end_matches(['`', '"', '\'', '.', ',']);
    if candidate.is_empty() || candidate.eq_ignore_ascii_case("none") {
        return None;
    }
    Some(candidate.to_string())
}
