//! 浏览器生命周期
//!
//! 进程启动时创建一个 [`BrowserSession`]，所有答题链共享它来开新页面，
//! 进程退出时统一关闭。

pub mod connection;
pub mod headless;

pub use connection::connect_to_browser;
pub use headless::launch_headless_browser;

use chromiumoxide::handler::Handler;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AppResult, BrowserError};

/// 持有浏览器实例和事件处理任务
pub struct BrowserSession {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    pub(crate) fn new(browser: Browser, mut handler: Handler) -> Self {
        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Self {
            browser: Mutex::new(browser),
            handler_task,
        }
    }

    /// 打开一个空白页面，调用方负责关闭
    pub async fn new_page(&self) -> AppResult<Page> {
        let browser = self.browser.lock().await;
        let page = browser.new_page("about:blank").await.map_err(|e| {
            BrowserError::PageCreationFailed {
                source: Box::new(e),
            }
        })?;
        Ok(page)
    }

    /// 当前打开的页面数
    pub async fn open_pages(&self) -> AppResult<usize> {
        let browser = self.browser.lock().await;
        Ok(browser.pages().await?.len())
    }

    /// 关闭浏览器并结束事件任务
    pub async fn close(&self) {
        let mut browser = self.browser.lock().await;
        match browser.close().await {
            Ok(_) => debug!("浏览器已关闭"),
            Err(e) => warn!("关闭浏览器失败: {}", e),
        }
        self.handler_task.abort();
    }
}
