//! 页面内容与资源类型

use phf::phf_map;
use serde::{Deserialize, Serialize};

/// 题目主要数据的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// 纯文本（题目本身或 .txt 文件）
    PlainText,
    Image,
    Pdf,
    Csv,
    Json,
    /// 页面内嵌的 `data:...;base64,...`
    Base64Blob,
}

/// 文件扩展名 → 资源类型
static EXTENSION_KINDS: phf::Map<&'static str, ResourceKind> = phf_map! {
    "png" => ResourceKind::Image,
    "jpg" => ResourceKind::Image,
    "jpeg" => ResourceKind::Image,
    "gif" => ResourceKind::Image,
    "webp" => ResourceKind::Image,
    "bmp" => ResourceKind::Image,
    "svg" => ResourceKind::Image,
    "pdf" => ResourceKind::Pdf,
    "csv" => ResourceKind::Csv,
    "json" => ResourceKind::Json,
    "txt" => ResourceKind::PlainText,
};

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::PlainText => "plain_text",
            ResourceKind::Image => "image",
            ResourceKind::Pdf => "pdf",
            ResourceKind::Csv => "csv",
            ResourceKind::Json => "json",
            ResourceKind::Base64Blob => "base64_blob",
        }
    }

    /// 根据扩展名判断（大小写不敏感）
    pub fn from_extension(ext: &str) -> Option<Self> {
        EXTENSION_KINDS.get(ext.to_ascii_lowercase().as_str()).copied()
    }

    /// 根据 MIME 类型判断
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match mime.as_str() {
            m if m.starts_with("image/") => Some(ResourceKind::Image),
            "application/pdf" => Some(ResourceKind::Pdf),
            "text/csv" => Some(ResourceKind::Csv),
            "application/json" => Some(ResourceKind::Json),
            "text/plain" => Some(ResourceKind::PlainText),
            _ => None,
        }
    }

    /// 分类优先级，数字越小越优先
    pub fn priority(self) -> u8 {
        match self {
            ResourceKind::Image => 0,
            ResourceKind::Pdf => 1,
            ResourceKind::Csv => 2,
            ResourceKind::Json => 3,
            ResourceKind::PlainText => 4,
            ResourceKind::Base64Blob => 5,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 页面中引用的一个资源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLink {
    pub url: String,
    /// 来源元素给出的类型提示，例如 `<img>` 一定是图片
    pub kind: Option<ResourceKind>,
}

impl ResourceLink {
    pub fn new(url: impl Into<String>, kind: Option<ResourceKind>) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    /// 根据 DOM 标签名构造
    pub fn from_tag(tag: &str, url: impl Into<String>) -> Self {
        let kind = match tag.to_ascii_lowercase().as_str() {
            "img" => Some(ResourceKind::Image),
            _ => None,
        };
        Self::new(url, kind)
    }
}

/// 一次抓取得到的页面内容，抓取后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    /// 页面地址，用于解析相对链接
    pub url: String,
    pub raw_text: String,
    pub resource_links: Vec<ResourceLink>,
}

impl PageContent {
    pub fn new(
        url: impl Into<String>,
        raw_text: impl Into<String>,
        resource_links: Vec<ResourceLink>,
    ) -> Self {
        Self {
            url: url.into(),
            raw_text: raw_text.into(),
            resource_links,
        }
    }
}
