//! 资源分类服务 - 业务能力层
//!
//! 根据页面文本和链接判断题目主要数据的类型，并给出资源的绝对地址。
//! 模式匹配的部分是纯函数：相同的 `PageContent` 总是得到相同结果。

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AppError, AppResult};
use crate::models::{PageContent, ResourceKind};
use crate::services::answer_engine::TextEngine;

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ResourceKind,
    /// 需要下载的资源地址；纯文本题为 `None`
    pub resource_url: Option<String>,
}

impl Classification {
    /// 没有附带资源的纯文本题
    pub fn plain_text() -> Self {
        Self {
            kind: ResourceKind::PlainText,
            resource_url: None,
        }
    }

    pub fn with_resource(kind: ResourceKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            resource_url: Some(url.into()),
        }
    }
}

/// 一个候选资源，按出现顺序收集
#[derive(Debug, Clone)]
struct Candidate {
    url: String,
    kind: ResourceKind,
}

const FILE_EXTENSIONS: &str = "png|jpe?g|gif|webp|bmp|svg|pdf|csv|json|txt";

/// 资源分类器
///
/// 职责：
/// - 从 DOM 链接、正文中的绝对 / 相对地址、内嵌 base64 中收集候选
/// - 按 图片 → PDF → CSV → JSON → 文本 的顺序选出主要资源
/// - 找不到候选但文本明显提到附件时，询问一次文本模型
/// - 从正文中提取提交地址
pub struct ResourceClassifier {
    locator: Option<Arc<dyn TextEngine>>,
    absolute_url_re: Regex,
    relative_file_re: Regex,
    data_uri_re: Regex,
    hint_re: Regex,
    submit_url_re: Regex,
}

impl ResourceClassifier {
    /// 创建分类器；`locator` 为兜底用的文本模型，可以不提供
    pub fn new(locator: Option<Arc<dyn TextEngine>>) -> AppResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| AppError::classification_failed(format!("正则编译失败: {e}")))
        };

        Ok(Self {
            locator,
            absolute_url_re: compile(r#"https?://[^\s"'<>`]+"#)?,
            relative_file_re: compile(&format!(
                r#"(?i)(?:^|[\s"'(=])((?:\.{{0,2}}/)?[\w\-./]*[\w\-]\.(?:{FILE_EXTENSIONS}))(?:[?#][^\s"'<>]*)?(?:$|[\s"'),;:.])"#
            ))?,
            data_uri_re: compile(r"data:([\w.+\-]+/[\w.+\-]+);base64,[A-Za-z0-9+/]+=*")?,
            hint_re: compile(
                r"(?i)\b(download|attached|attachment|file|dataset|data set|spreadsheet|image below|shown below|see the (?:image|chart|table|pdf))\b",
            )?,
            submit_url_re: compile(
                r#"(?i)(?:post your answer to|submit to|post this json to)\s+(https?://[^\s"'\\<>`]+|/[^\s"'\\<>`]*)"#,
            )?,
        })
    }

    /// 完整分类：先模式匹配，必要时询问文本模型一次
    ///
    /// 模型调用失败时返回分类错误，不做猜测。
    pub async fn classify(&self, page: &PageContent) -> AppResult<Classification> {
        if let Some(classification) = self.classify_links(page) {
            debug!(
                "分类结果: {} ({})",
                classification.kind,
                classification.resource_url.as_deref().unwrap_or("-")
            );
            return Ok(classification);
        }

        let Some(locator) = &self.locator else {
            return Ok(Classification::plain_text());
        };
        if !self.hint_re.is_match(&page.raw_text) {
            return Ok(Classification::plain_text());
        }

        info!("🔎 正文提到了附件但未找到链接，询问模型定位资源");
        let proposed = locator
            .locate_resource(&page.raw_text)
            .await
            .map_err(|e| AppError::classification_failed(format!("模型定位资源失败: {e}")))?;

        let Some(proposed) = proposed else {
            debug!("模型未找到资源，按纯文本处理");
            return Ok(Classification::plain_text());
        };

        match resolve_http_url(&page.url, proposed.trim()) {
            Some(url) => {
                let kind = kind_from_path(&url).unwrap_or(ResourceKind::PlainText);
                info!("✓ 模型定位到资源: {} ({})", url, kind);
                Ok(Classification::with_resource(kind, url.to_string()))
            }
            None => {
                warn!("模型给出的地址无效，按纯文本处理: {}", proposed);
                Ok(Classification::plain_text())
            }
        }
    }

    /// 只用模式匹配分类，找不到任何候选时返回 `None`
    pub fn classify_links(&self, page: &PageContent) -> Option<Classification> {
        let candidates = self.collect_candidates(page);

        let best_file = candidates
            .iter()
            .filter(|c| c.kind != ResourceKind::Base64Blob)
            .min_by_key(|c| c.kind.priority());

        best_file
            .or_else(|| candidates.first())
            .map(|c| Classification::with_resource(c.kind, c.url.clone()))
    }

    /// 提取提交地址，相对地址按页面地址解析
    pub fn extract_submit_url(&self, page: &PageContent) -> Option<String> {
        let captures = self.submit_url_re.captures(&page.raw_text)?;
        let raw = captures
            .get(1)?
            .as_str()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ')' | ':'));
        resolve_http_url(&page.url, raw).map(|u| u.to_string())
    }

    fn collect_candidates(&self, page: &PageContent) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut push = |candidate: Candidate| {
            if !candidates.iter().any(|c| c.url == candidate.url) {
                candidates.push(candidate);
            }
        };

        // 1. DOM 链接
        for link in &page.resource_links {
            if link.url.starts_with("data:") {
                if let Some(kind) = self.data_uri_kind(&link.url, link.kind) {
                    push(Candidate {
                        url: link.url.clone(),
                        kind,
                    });
                }
                continue;
            }
            let Some(url) = resolve_http_url(&page.url, &link.url) else {
                debug!("跳过无效链接: {}", link.url);
                continue;
            };
            if let Some(kind) = link.kind.or_else(|| kind_from_path(&url)) {
                push(Candidate {
                    url: url.to_string(),
                    kind,
                });
            }
        }

        // 2. 正文中的绝对地址
        let mut absolute_spans = Vec::new();
        for m in self.absolute_url_re.find_iter(&page.raw_text) {
            absolute_spans.push(m.range());
            let raw = m
                .as_str()
                .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | ')' | ']'));
            let Ok(url) = Url::parse(raw) else {
                continue;
            };
            if let Some(kind) = kind_from_path(&url) {
                push(Candidate {
                    url: url.to_string(),
                    kind,
                });
            }
        }

        // 3. 正文中的相对文件名，例如 "data.csv"
        for captures in self.relative_file_re.captures_iter(&page.raw_text) {
            let Some(raw) = captures.get(1) else {
                continue;
            };
            // 绝对地址里的片段（例如 `?file=data.csv`）不是相对文件
            if absolute_spans.iter().any(|span| span.contains(&raw.start())) {
                continue;
            }
            let Some(url) = resolve_http_url(&page.url, raw.as_str()) else {
                continue;
            };
            if let Some(kind) = kind_from_path(&url) {
                push(Candidate {
                    url: url.to_string(),
                    kind,
                });
            }
        }

        // 4. 正文中的 base64 数据
        for m in self.data_uri_re.find_iter(&page.raw_text) {
            if let Some(kind) = self.data_uri_kind(m.as_str(), None) {
                push(Candidate {
                    url: m.as_str().to_string(),
                    kind,
                });
            }
        }

        candidates
    }

    /// 内嵌数据的类型
    ///
    /// 图片和 PDF（由标签提示或 MIME 判断）和文件一样参与优先级比较，
    /// 其余内嵌数据记为 `Base64Blob`。不是合法 data URI 时返回 `None`。
    fn data_uri_kind(&self, uri: &str, hint: Option<ResourceKind>) -> Option<ResourceKind> {
        let captures = self.data_uri_re.captures(uri)?;
        let from_mime = captures
            .get(1)
            .and_then(|mime| ResourceKind::from_mime(mime.as_str()));

        match hint.or(from_mime) {
            Some(kind @ (ResourceKind::Image | ResourceKind::Pdf)) => Some(kind),
            _ => Some(ResourceKind::Base64Blob),
        }
    }
}

/// 把链接解析为 http(s) 绝对地址，其他协议和无法解析的链接返回 `None`
fn resolve_http_url(base: &str, link: &str) -> Option<Url> {
    let url = match Url::parse(link) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base).ok()?.join(link).ok()?,
        Err(_) => return None,
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// 根据 URL 路径的扩展名判断类型
fn kind_from_path(url: &Url) -> Option<ResourceKind> {
    let segment = url.path_segments()?.next_back()?;
    let (_, ext) = segment.rsplit_once('.')?;
    ResourceKind::from_extension(ext)
}
