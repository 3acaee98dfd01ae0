use std::path::Path;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::BrowserSession;
use crate::config::Config;
use crate::error::{AppResult, BrowserError};

/// 启动无头浏览器
pub async fn launch_headless_browser(config: &Config) -> AppResult<BrowserSession> {
    info!("🚀 启动无头浏览器...");

    let mut args = config.browser_args.clone();
    args.push(format!("--user-agent={}", config.user_agent));

    let mut builder = BrowserConfig::builder().new_headless_mode().args(args);
    if let Some(executable) = &config.browser_executable {
        debug!("使用指定的浏览器: {}", executable);
        builder = builder.chrome_executable(Path::new(executable));
    }

    let browser_config = builder.build().map_err(|e| {
        error!("配置无头浏览器失败: {}", e);
        BrowserError::LaunchFailed { source: e.into() }
    })?;

    let (browser, handler) = Browser::launch(browser_config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        BrowserError::LaunchFailed {
            source: Box::new(e),
        }
    })?;
    let session = BrowserSession::new(browser, handler);

    // 等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    info!("✅ 无头浏览器已就绪");
    Ok(session)
}
