use box_office::{Config, Server, ServerState, print_banner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 环境与日志
    dotenv::dotenv().ok();
    let config = Config::from_env();
    box_office::init_logger_with_file(
        std::env::var("LOG_LEVEL").ok().as_deref(),
        Some(&config.work_dir),
    );

    print_banner();
    tracing::info!("Marquee Box Office starting...");

    // 2. 初始化服务器状态 (打开存储、装配服务)
    let state = ServerState::initialize(config)?;

    // 3. 启动 HTTP 服务器 (自动注册预留清扫任务)
    let server = Server::new(state);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
