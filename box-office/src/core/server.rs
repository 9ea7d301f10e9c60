//! HTTP 服务与后台任务装配
//!
//! 启动顺序：注册后台清扫任务 -> 绑定端口 -> serve；
//! 收到 Ctrl-C 后优雅关闭：先停 HTTP，再取消并等待后台任务。

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api;
use crate::core::{BackgroundTasks, ServerState, TaskKind};

/// Box-office 服务器
pub struct Server {
    state: ServerState,
    tasks: BackgroundTasks,
}

impl Server {
    pub fn new(state: ServerState) -> Self {
        Self {
            state,
            tasks: BackgroundTasks::new(),
        }
    }

    /// 运行至收到关闭信号
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.spawn_reservation_sweep();

        let app = api::build_app().with_state(self.state.clone());
        let addr = format!("0.0.0.0:{}", self.state.config.http_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(addr = %addr, "Box-office server listening");

        let shutdown = self.tasks.shutdown_token();
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown(shutdown))
            .await?;

        tracing::info!("HTTP server stopped, draining background tasks");
        self.tasks.shutdown().await;
        Ok(())
    }

    /// 过期预留清扫：周期释放超时未支付的结账占位
    fn spawn_reservation_sweep(&mut self) {
        let state = self.state.clone();
        let token = self.tasks.shutdown_token();
        let interval = Duration::from_secs(state.config.sweep_interval_secs);

        self.tasks
            .spawn("reservation_sweep", TaskKind::Periodic, async move {
                let mut ticker = tokio::time::interval(interval);
                // 首个 tick 立即到期，跳过以免启动即清扫
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(e) = state.orders.expire_stale_checkouts().await {
                                tracing::error!(error = %e, "Reservation sweep failed");
                            }
                        }
                    }
                }
            });
    }
}

/// Ctrl-C 或外部取消都会触发优雅关闭
async fn wait_for_shutdown(token: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}
