use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use quiz_chain_agent::{router, utils::logging, AgentState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load().context("加载配置失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);

    config.validate().context("配置校验失败")?;

    let addr = format!("{}:{}", config.server_host, config.server_port);

    // 初始化共享资源
    let state = AgentState::initialize(config)
        .await
        .context("初始化失败")?;

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {addr}"))?;
    info!("✅ 服务已启动: http://{}", addr);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("👋 已退出");
    Ok(())
}

/// 收到 Ctrl+C 后取消所有链并关闭浏览器
async fn shutdown_signal(state: AgentState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("监听退出信号失败: {}", e);
    }
    info!("收到退出信号，开始优雅关闭");
    state.shutdown().await;
}
