use chrono::Utc;
use serde::Serialize;

use crate::ids::{RegionId, TypeId};
use crate::order::Order;

/// All orders seen for a single `(region, type)` pair in one scrape pass.
#[derive(Clone, Debug, Serialize)]
pub struct Rowset {
    pub region_id: RegionId,
    pub type_id: TypeId,
    pub generated_at: chrono::DateTime<Utc>,
    pub rows: Vec<Order>,
}

impl Rowset {
    pub fn new(region_id: RegionId, type_id: TypeId) -> Self {
        Rowset {
            region_id,
            type_id,
            generated_at: Utc::now(),
            rows: Vec::new(),
        }
    }

    /// Sort ascending by `order_id`, collapse duplicates, and set
    /// `generated_at` from the earliest row. Returns the number of
    /// duplicate rows collapsed, for the caller to log.
    pub fn finalize(&mut self) -> usize {
        self.rows.sort_by_key(|o| o.order_id);

        let before = self.rows.len();
        self.rows.dedup_by_key(|o| o.order_id);
        let removed = before - self.rows.len();

        if let Some(first) = self.rows.first() {
            self.generated_at = first.generated_at;
        }

        removed
    }
}
