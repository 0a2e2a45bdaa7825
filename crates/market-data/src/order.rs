use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::{RegionId, SolarSystemId, StationId, TypeId};
use crate::range::OrderRange;

/// A single canonical order row, already resolved against the location
/// cache and ready to be placed into a [`crate::rowset::Rowset`].
#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub order_id: u64,
    pub type_id: TypeId,
    pub region_id: RegionId,
    pub station_id: StationId,
    pub solar_system_id: SolarSystemId,
    pub price: f64,
    pub vol_entered: u64,
    pub vol_remaining: u64,
    pub min_volume: u64,
    pub range: OrderRange,
    pub bid: bool,
    pub issue_date: DateTime<Utc>,
    pub duration: i64,
    pub generated_at: DateTime<Utc>,
}

impl Order {
    /// The fixed column order the wire envelope's `columns` field documents
    /// and every row array must follow.
    pub const COLUMNS: [&'static str; 9] = [
        "price",
        "volRemaining",
        "range",
        "orderID",
        "volEntered",
        "minVolume",
        "bid",
        "issueDate",
        "duration",
    ];

    /// Render this order as the positional tuple the wire envelope expects,
    /// in the exact order declared by [`Self::COLUMNS`].
    pub fn to_row(&self) -> serde_json::Value {
        serde_json::json!([
            self.price,
            self.vol_remaining,
            self.range.as_str(),
            self.order_id,
            self.vol_entered,
            self.min_volume,
            self.bid,
            self.issue_date.to_rfc3339(),
            self.duration,
        ])
    }
}
