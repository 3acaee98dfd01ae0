use std::time::Duration;

use chromiumoxide::Browser;
use tokio::time::sleep;
use tracing::{error, info};

use super::BrowserSession;
use crate::error::{AppResult, BrowserError};

/// 连接到已开启远程调试端口的浏览器
///
/// 本地调试时可以用有界面的浏览器观察抓取过程。
pub async fn connect_to_browser(port: u16) -> AppResult<BrowserSession> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        BrowserError::ConnectionFailed {
            port,
            source: Box::new(e),
        }
    })?;
    let session = BrowserSession::new(browser, handler);

    sleep(Duration::from_millis(300)).await;

    info!("✓ 浏览器连接成功");
    Ok(session)
}
