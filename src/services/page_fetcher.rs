//! 页面抓取服务 - 业务能力层
//!
//! 只负责"把 URL 渲染成文本 + 资源链接"，不关心流程

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::error::{AppResult, BrowserError};
use crate::infrastructure::JsExecutor;
use crate::models::{PageContent, ResourceLink};
use crate::utils::logging::truncate_text;

/// 页面抓取能力
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// 渲染页面（执行脚本、跳过拦截页）并提取文本和资源链接
    async fn fetch(&self, url: &str) -> AppResult<PageContent>;
}

/// 导航响应状态码，不支持时返回 0
const NAV_STATUS_JS: &str = r#"
(() => {
    const nav = performance.getEntriesByType('navigation')[0];
    return nav && typeof nav.responseStatus === 'number' ? nav.responseStatus : 0;
})()
"#;

const INNER_TEXT_JS: &str = r#"
(() => (document.body ? document.body.innerText : '') || '')()
"#;

const LOCATION_JS: &str = "window.location.href";

/// 收集页面中所有可能的资源链接（浏览器已解析为绝对地址）
const LINKS_JS: &str = r#"
(() => {
    const links = [];
    const push = (tag, url) => { if (url) links.push({ tag, url: String(url) }); };
    document.querySelectorAll('img[src]').forEach(e => push('img', e.src));
    document.querySelectorAll('a[href]').forEach(e => push('a', e.href));
    document.querySelectorAll('embed[src], iframe[src], source[src]')
        .forEach(e => push(e.tagName.toLowerCase(), e.src));
    document.querySelectorAll('object[data]').forEach(e => push('object', e.data));
    return links;
})()
"#;

/// 识别已知拦截页（ngrok 提示页、浏览器安全警告）并点击继续
const DISMISS_INTERSTITIAL_JS: &str = r#"
(() => {
    const text = (document.body ? document.body.innerText : '').toLowerCase();
    const markers = [
        'you are about to visit',
        'your connection is not private',
        'deceptive site ahead',
        'this site may be unsafe',
    ];
    if (!markers.some(m => text.includes(m))) return false;
    const labels = ['visit site', 'proceed', 'continue to'];
    const target = Array.from(document.querySelectorAll('button, a, input[type=submit]'))
        .find(el => {
            const label = (el.innerText || el.value || '').trim().toLowerCase();
            return labels.some(l => label.startsWith(l));
        });
    if (!target) return false;
    target.click();
    return true;
})()
"#;

/// 轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// 等待脚本渲染的最长时间
const MAX_SETTLE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct DomLink {
    tag: String,
    url: String,
}

/// 基于无头浏览器的页面抓取
pub struct BrowserPageFetcher {
    session: Arc<BrowserSession>,
}

impl BrowserPageFetcher {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }

    async fn render(&self, executor: &JsExecutor, url: &str) -> AppResult<PageContent> {
        executor.goto(url).await?;

        let status: u16 = executor.eval_as(NAV_STATUS_JS).await?;
        if status >= 400 {
            return Err(BrowserError::HttpStatus {
                url: url.to_string(),
                status,
            }
            .into());
        }

        let mut text = wait_for_stable_text(executor).await?;

        if executor.eval_as::<bool>(DISMISS_INTERSTITIAL_JS).await? {
            info!("⏭️ 检测到拦截页，已点击继续: {}", url);
            sleep(Duration::from_secs(1)).await;
            text = wait_for_stable_text(executor).await?;
        }

        if text.trim().is_empty() {
            warn!("页面 innerText 为空，改用完整 HTML: {}", url);
            text = executor.html().await?;
        }

        let final_url: String = executor
            .eval_as(LOCATION_JS)
            .await
            .unwrap_or_else(|_| url.to_string());

        let dom_links: Vec<DomLink> = executor.eval_as(LINKS_JS).await?;
        let mut links: Vec<ResourceLink> = Vec::with_capacity(dom_links.len());
        for link in dom_links {
            if !links.iter().any(|l| l.url == link.url) {
                links.push(ResourceLink::from_tag(&link.tag, link.url));
            }
        }

        debug!(
            "页面渲染完成: {} 字符, {} 个链接, 预览: {}",
            text.len(),
            links.len(),
            truncate_text(&text, 80)
        );

        Ok(PageContent::new(final_url, text, links))
    }
}

#[async_trait]
impl PageFetcher for BrowserPageFetcher {
    async fn fetch(&self, url: &str) -> AppResult<PageContent> {
        let page = self.session.new_page().await?;
        let executor = JsExecutor::new(page);

        let result = self.render(&executor, url).await;
        executor.close().await;
        result
    }
}

/// 轮询 innerText，直到连续两次读取一致且非空
async fn wait_for_stable_text(executor: &JsExecutor) -> AppResult<String> {
    let mut previous: String = executor.eval_as(INNER_TEXT_JS).await?;
    let mut waited = Duration::ZERO;

    while waited < MAX_SETTLE {
        sleep(POLL_INTERVAL).await;
        waited += POLL_INTERVAL;

        let current: String = executor.eval_as(INNER_TEXT_JS).await?;
        if !current.trim().is_empty() && current == previous {
            return Ok(current);
        }
        previous = current;
    }

    Ok(previous)
}
