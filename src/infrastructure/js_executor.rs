//! JS 执行器 - 基础设施层
//!
//! 持有一个 page 资源，只暴露"导航 / 执行 JS / 截图"的能力

use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, BrowserError};

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源，用完后通过 [`JsExecutor::close`] 释放
/// - 没有走到 `close` 就被丢弃时（步骤超时 / 取消），在后台关闭页面
/// - 不认识题目 / 答案
/// - 不处理业务流程
pub struct JsExecutor {
    page: Page,
    closed: bool,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self {
            page,
            closed: false,
        }
    }

    /// 导航到指定 URL 并等待加载完成
    pub async fn goto(&self, url: &str) -> AppResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::navigation_failed(url, e))?;
        Ok(())
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 当前页面的完整 HTML
    pub async fn html(&self) -> AppResult<String> {
        Ok(self.page.content().await?)
    }

    /// 用给定 HTML 替换页面内容
    pub async fn set_html(&self, html: &str) -> AppResult<()> {
        self.page.set_content(html).await?;
        Ok(())
    }

    /// 对匹配选择器的第一个元素截取 PNG
    pub async fn screenshot_element(&self, selector: &str) -> AppResult<Vec<u8>> {
        let element = self.page.find_element(selector).await.map_err(|e| {
            BrowserError::ScreenshotFailed {
                source: Box::new(e),
            }
        })?;
        let bytes = element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| BrowserError::ScreenshotFailed {
                source: Box::new(e),
            })?;
        Ok(bytes)
    }

    /// 关闭页面
    pub async fn close(mut self) {
        if let Err(e) = self.page.clone().close().await {
            debug!("关闭页面失败: {}", e);
        }
        self.closed = true;
    }
}

impl Drop for JsExecutor {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let page = self.page.clone();
        match Handle::try_current() {
            Ok(handle) => {
                debug!("执行器被提前丢弃，后台关闭页面");
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        debug!("关闭页面失败: {}", e);
                    }
                });
            }
            Err(_) => warn!("没有可用的运行时，页面未关闭"),
        }
    }
}
