//! Marquee Box Office - 票务商务核心
//!
//! # 架构概述
//!
//! 本 crate 是 Marquee 平台的票务核心，提供以下功能：
//!
//! - **库存台账** (`inventory`): 计数器式容量核算，保证绝不超卖
//! - **定价** (`pricing`): 费用规则、优惠码校验、金额舍入
//! - **订单** (`orders`): 结账、支付确认、取消、过期清扫
//! - **门票** (`tickets`): 票码签发、QR 签名、exactly-once 核销
//! - **退款 / 结算** (`refunds` / `settlement`): 审批流 + 快照金额
//! - **HTTP API** (`api`): RESTful API 接口
//!
//! # 模块结构
//!
//! ```text
//! box-office/src/
//! ├── core/        # 配置、状态、后台任务、HTTP 服务
//! ├── db/          # 嵌入式 redb 存储层 (版本化记录 + CAS)
//! ├── inventory/   # 库存台账
//! ├── pricing/     # 费用、优惠码、金额工具
//! ├── orders/      # 订单生命周期
//! ├── tickets/     # 门票生命周期
//! ├── refunds/     # 退款工作流
//! ├── settlement/  # 结算工作流
//! ├── services/    # 通知等外围服务
//! ├── api/         # HTTP 路由和处理器
//! └── utils/       # 错误、日志
//! ```

pub mod api;
pub mod core;
pub mod db;
pub mod inventory;
pub mod orders;
pub mod pricing;
pub mod refunds;
pub mod services;
pub mod settlement;
pub mod tickets;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use db::Store;
pub use inventory::InventoryLedger;
pub use orders::OrderService;
pub use pricing::PromoValidator;
pub use tickets::TicketService;
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
    __  ___
   /  |/  /___ __________ ___  _____  ___
  / /|_/ / __ `/ ___/ __ `/ / / / _ \/ _ \
 / /  / / /_/ / /  / /_/ / /_/ /  __/  __/
/_/  /_/\__,_/_/   \__, /\__,_/\___/\___/
                     /_/
    "#
    );
}
