/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::{ChainOutcome, ChainReport};

/// 初始化日志
///
/// 优先使用 `RUST_LOG`；否则默认 `info`，`verbose` 时本 crate 提升到 `debug`。
/// 重复调用不会报错。
pub fn init(verbose: bool) {
    let default_directive = if verbose {
        "info,quiz_chain_agent=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 答题代理启动");
    info!("🌐 监听地址: {}:{}", config.server_host, config.server_port);
    info!(
        "🔁 重试次数: {}, ⏱️ 链截止时间: {} 秒",
        config.retry_limit, config.chain_deadline_secs
    );
    match config.browser_debug_port {
        Some(port) => info!("🖥️ 浏览器: 连接已有实例 (端口 {})", port),
        None => info!("🖥️ 浏览器: 启动无头实例"),
    }
    info!("{}", "=".repeat(60));
}

/// 打印一条链的最终统计
pub fn log_chain_report(report: &ChainReport) {
    let elapsed = report.finished_at - report.started_at;
    let correct = report.submissions.iter().filter(|s| s.correct).count();

    info!("\n{}", "─".repeat(60));
    info!("📊 [链 {}] {}", report.chain_id, report.outcome.label());
    info!(
        "题目数: {}, 提交: {} (正确 {}), 耗时: {:.1} 秒",
        report.visited_urls().len(),
        report.submissions.len(),
        correct,
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    if let ChainOutcome::Error { step, url, .. } = &report.outcome {
        info!("失败步骤: {} @ {}", step, url);
    }
    info!("{}", "─".repeat(60));

    if let Ok(json) = serde_json::to_string(report) {
        debug!("链报告: {}", json);
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
