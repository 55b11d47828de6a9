//! Explicit data access for the inventory ledger.
//!
//! Every function takes the connection or open transaction it should run on,
//! so callers decide the unit of work.

pub mod inventory_store;
pub mod transaction_log;

/// One page of rows plus the total row count across all pages
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn pages(&self, per_page: u64) -> u64 {
        if per_page == 0 {
            return 0;
        }
        self.total.div_ceil(per_page)
    }
}
