//! 服务器状态 - 持有所有服务的共享引用
//!
//! 所有服务都是轻量克隆（内部 Arc），`ServerState` 作为 axum 的
//! State 在请求间共享。

use std::sync::Arc;

use crate::core::Config;
use crate::db::{RetryPolicy, Store};
use crate::inventory::InventoryLedger;
use crate::orders::OrderService;
use crate::refunds::RefundService;
use crate::services::{LogNotifier, Notifier};
use crate::settlement::SettlementService;
use crate::tickets::TicketService;

/// 服务器状态
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | store | 嵌入式存储 (redb) |
/// | ledger | 库存台账 |
/// | tickets | 门票服务 |
/// | orders | 订单服务 |
/// | refunds | 退款服务 |
/// | settlements | 结算服务 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub store: Store,
    pub ledger: InventoryLedger,
    pub tickets: TicketService,
    pub orders: OrderService,
    pub refunds: RefundService,
    pub settlements: SettlementService,
}

impl ServerState {
    /// 初始化：打开工作目录下的数据库并装配服务
    pub fn initialize(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.work_dir)?;
        let db_path = std::path::Path::new(&config.work_dir).join("box-office.redb");
        let store = Store::open(&db_path)?;
        tracing::info!(path = %db_path.display(), "Opened record store");
        Ok(Self::assemble(config, store))
    }

    /// 在内存存储上装配（测试用）
    pub fn in_memory(config: Config) -> anyhow::Result<Self> {
        let store = Store::open_in_memory()?;
        Ok(Self::assemble(config, store))
    }

    fn assemble(config: Config, store: Store) -> Self {
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let ledger = InventoryLedger::new(store.clone(), RetryPolicy::from_config(&config));
        let tickets = TicketService::new(store.clone(), &config);
        let orders = OrderService::new(
            store.clone(),
            ledger.clone(),
            tickets.clone(),
            notifier.clone(),
            &config,
        );
        let refunds = RefundService::new(
            store.clone(),
            orders.clone(),
            ledger.clone(),
            tickets.clone(),
            notifier,
            &config,
        );
        let settlements = SettlementService::new(store.clone(), orders.clone(), &config);

        Self {
            config,
            store,
            ledger,
            tickets,
            orders,
            refunds,
            settlements,
        }
    }
}
