//! HTTP API
//!
//! 每个资源一个子模块 (`mod.rs` 路由 + `handler.rs` 处理器)，
//! 统一挂在 `/api` 前缀下。错误通过 [`crate::utils::AppError`]
//! 映射为带稳定错误码的 JSON 响应。

pub mod catalog;
pub mod health;
pub mod orders;
pub mod refund_requests;
pub mod settlement_requests;
pub mod tickets;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

/// 注册全部路由（无中间件）
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(catalog::router())
        .merge(orders::router())
        .merge(tickets::router())
        .merge(refund_requests::router())
        .merge(settlement_requests::router())
        .merge(health::router())
}

/// 完整应用：路由 + 中间件
pub fn build_app() -> Router<ServerState> {
    build_router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
