//! 订单号分配
//!
//! `ORD-YYYY-NNNNNN`，序号按年独立递增，由存储层的命名计数器
//! 保证唯一。

use chrono::{Datelike, Utc};

use crate::db::{Store, StorageResult};

/// 分配下一个订单号
pub fn allocate_order_number(store: &Store) -> StorageResult<String> {
    let year = Utc::now().year();
    let seq = store.next_counter(&format!("order_seq:{year}"))?;
    Ok(format!("ORD-{}-{:06}", year, seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_numbers_are_sequential() {
        let store = Store::open_in_memory().unwrap();
        let year = Utc::now().year();

        let first = allocate_order_number(&store).unwrap();
        let second = allocate_order_number(&store).unwrap();

        assert_eq!(first, format!("ORD-{}-000001", year));
        assert_eq!(second, format!("ORD-{}-000002", year));
    }
}
