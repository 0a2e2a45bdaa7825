use market_data::OrderRange;
use serde::Deserialize;

use crate::universe::{fetch_page, Page};
use crate::{EsiClient, EsiError};

/// The order shape ESI hands back, before it has been resolved against a
/// location cache or folded into a canonical [`market_data::Order`].
#[derive(Deserialize, Debug, Clone)]
pub struct RawOrder {
    pub duration: u32,
    pub is_buy_order: bool,
    pub issued: String,
    pub location_id: u64,
    pub min_volume: u32,
    pub order_id: u64,
    pub price: f64,
    pub range: OrderRange,
    pub system_id: u32,
    pub type_id: u32,
    pub volume_remain: u32,
    pub volume_total: u32,
}

pub async fn region_orders_page(
    client: &EsiClient,
    region_id: u32,
    page: usize,
) -> Result<Page<RawOrder>, EsiError> {
    fetch_page(client, &format!("/markets/{region_id}/orders/?order_type=all&page={page}")).await
}

/// Requires an authenticated client; ESI rejects unauthenticated structure
/// market requests with 403, which the caller treats as a blacklist signal.
pub async fn structure_orders_page(
    client: &EsiClient,
    structure_id: u64,
    page: usize,
) -> Result<Page<RawOrder>, EsiError> {
    fetch_page(client, &format!("/markets/structures/{structure_id}/?page={page}")).await
}
