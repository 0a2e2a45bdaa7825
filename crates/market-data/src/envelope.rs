use chrono::Utc;
use serde_json::json;

use crate::order::Order;
use crate::rowset::Rowset;

/// Wraps a batch of rowsets in the canonical exchange envelope consumed by
/// downstream subscribers. The wire format is positional (rows are arrays,
/// not objects), so every consumer depends on `columns` and the row order
/// matching [`Order::COLUMNS`].
pub struct Snapshot<'a> {
    pub uploader_name: &'a str,
    pub rowsets: &'a [Rowset],
}

impl<'a> Snapshot<'a> {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "resultType": "orders",
            "version": "0.1",
            "uploadKeys": [{ "name": self.uploader_name }],
            "currentTime": Utc::now().to_rfc3339(),
            "columns": Order::COLUMNS,
            "rowsets": self.rowsets.iter().map(|rs| json!({
                "generatedAt": rs.generated_at.to_rfc3339(),
                "regionID": rs.region_id.get(),
                "typeID": rs.type_id.get(),
                "rows": rs.rows.iter().map(Order::to_row).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        })
    }
}
