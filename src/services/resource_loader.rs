//! 资源下载服务 - 业务能力层
//!
//! 把分类结果里的资源地址变成模型能用的内容：文本或图片。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::header::CONTENT_TYPE;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::{ApiError, AppError, AppResult, FlowError};
use crate::models::ResourceKind;
use crate::services::resource_classifier::Classification;

/// PDF 最多转换的页数
const PDF_MAX_PAGES: u32 = 3;
/// PDF 转图片的分辨率
const PDF_DPI: u32 = 110;
/// 附带文本的最大字符数，超过部分截断
const MAX_SUPPORTING_CHARS: usize = 60_000;

/// 一张图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageData {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new("image/png", bytes)
    }

    /// `data:<mime>;base64,...` 形式，可以直接交给视觉模型或作为答案提交
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }
}

/// 下载后的资源内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedResource {
    /// 没有附带资源
    None,
    /// CSV / JSON / 文本 / 解码后的 base64 文本
    Text { content: String },
    /// 图片，或 PDF 逐页转换后的图片
    Images { images: Vec<ImageData> },
}

impl LoadedResource {
    /// 是否需要视觉模型
    pub fn needs_vision(&self) -> bool {
        matches!(self, LoadedResource::Images { .. })
    }
}

/// 资源下载能力
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, classification: &Classification) -> AppResult<LoadedResource>;
}

/// 基于 reqwest 的资源下载
pub struct HttpResourceLoader {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpResourceLoader {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn download(&self, url: &str) -> AppResult<(Option<String>, Vec<u8>)> {
        debug!("下载资源: {}", url);
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                endpoint: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.request_error(url, e))?;

        info!("✓ 资源下载完成: {} ({} 字节)", url, bytes.len());
        Ok((content_type, bytes.to_vec()))
    }

    fn request_error(&self, url: &str, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            ApiError::Timeout {
                endpoint: url.to_string(),
                secs: self.timeout.as_secs(),
            }
            .into()
        } else {
            AppError::api_request_failed(url, err)
        }
    }
}

#[async_trait]
impl ResourceLoader for HttpResourceLoader {
    async fn load(&self, classification: &Classification) -> AppResult<LoadedResource> {
        let Some(url) = classification.resource_url.as_deref() else {
            return Ok(LoadedResource::None);
        };

        if url.starts_with("data:") {
            let (mime, bytes) = decode_data_uri(url)?;
            return into_resource(ResourceKind::from_mime(&mime), &mime, bytes).await;
        }

        let (content_type, bytes) = self.download(url).await?;
        let mime = match classification.kind {
            ResourceKind::Image => content_type
                .filter(|ct| ct.starts_with("image/"))
                .unwrap_or_else(|| mime_from_url(url).to_string()),
            _ => content_type.unwrap_or_default(),
        };

        into_resource(Some(classification.kind), &mime, bytes).await
    }
}

async fn into_resource(
    kind: Option<ResourceKind>,
    mime: &str,
    bytes: Vec<u8>,
) -> AppResult<LoadedResource> {
    match kind {
        Some(ResourceKind::Image) => {
            let mime = mime.split(';').next().unwrap_or("image/png").trim();
            Ok(LoadedResource::Images {
                images: vec![ImageData::new(mime, bytes)],
            })
        }
        Some(ResourceKind::Pdf) => {
            let images = rasterize_pdf(&bytes).await?;
            Ok(LoadedResource::Images { images })
        }
        Some(ResourceKind::Json) => {
            let text = String::from_utf8_lossy(&bytes);
            let content = match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => serde_json::to_string_pretty(&value)?,
                Err(_) => text.into_owned(),
            };
            Ok(LoadedResource::Text {
                content: clip_text(content),
            })
        }
        _ => Ok(LoadedResource::Text {
            content: clip_text(String::from_utf8_lossy(&bytes).into_owned()),
        }),
    }
}

/// 解析 `data:<mime>;base64,<payload>`
pub fn decode_data_uri(uri: &str) -> AppResult<(String, Vec<u8>)> {
    let invalid = || ApiError::InvalidResourceUrl {
        url: uri.chars().take(64).collect(),
    };

    let rest = uri.strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(invalid)?
        .trim()
        .to_ascii_lowercase();

    let bytes = BASE64.decode(payload.trim()).map_err(|_| invalid())?;
    Ok((mime, bytes))
}

fn mime_from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        _ => "image/png",
    }
}

fn clip_text(content: String) -> String {
    if content.chars().count() <= MAX_SUPPORTING_CHARS {
        return content;
    }
    warn!(
        "附带文本过长，截断到 {} 个字符",
        MAX_SUPPORTING_CHARS
    );
    content.chars().take(MAX_SUPPORTING_CHARS).collect()
}

/// 用 pdftoppm 把 PDF 前几页转成 PNG
async fn rasterize_pdf(pdf_bytes: &[u8]) -> AppResult<Vec<ImageData>> {
    rasterize_pdf_in(&std::env::temp_dir(), pdf_bytes).await
}

/// 工作目录由 `TempDir` 持有，future 被中途丢弃（超时 / 取消）时同样会删除
async fn rasterize_pdf_in(base: &Path, pdf_bytes: &[u8]) -> AppResult<Vec<ImageData>> {
    let work_dir = tempfile::Builder::new()
        .prefix("quiz_pdf_")
        .tempdir_in(base)?;
    run_pdftoppm(work_dir.path(), pdf_bytes).await
}

async fn run_pdftoppm(work_dir: &Path, pdf_bytes: &[u8]) -> AppResult<Vec<ImageData>> {
    let pdf_path = work_dir.join("input.pdf");
    fs::write(&pdf_path, pdf_bytes).await?;

    let output = Command::new("pdftoppm")
        .arg("-png")
        .arg("-r")
        .arg(PDF_DPI.to_string())
        .arg("-f")
        .arg("1")
        .arg("-l")
        .arg(PDF_MAX_PAGES.to_string())
        .arg(&pdf_path)
        .arg(work_dir.join("page"))
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            error!("无法运行 pdftoppm: {}", e);
            FlowError::PdfRasterizeFailed {
                reason: format!("pdftoppm 不可用: {e}"),
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("pdftoppm 执行失败: {}", stderr);
        return Err(FlowError::PdfRasterizeFailed {
            reason: stderr.trim().to_string(),
        }
        .into());
    }

    let mut pages: Vec<PathBuf> = Vec::new();
    let mut entries = fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("png") {
            pages.push(path);
        }
    }
    pages.sort();

    let mut images = Vec::with_capacity(pages.len());
    for page in pages {
        images.push(ImageData::png(fs::read(&page).await?));
    }

    if images.is_empty() {
        return Err(FlowError::PdfRasterizeFailed {
            reason: "没有生成任何页面".to_string(),
        }
        .into());
    }

    info!("✓ PDF 已转换为 {} 张图片", images.len());
    Ok(images)
}
