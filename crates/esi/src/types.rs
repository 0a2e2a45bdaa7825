use serde::Deserialize;

use crate::universe::{fetch_page, Page};
use crate::{EsiClient, EsiError};

pub async fn type_ids_page(client: &EsiClient, page: usize) -> Result<Page<u32>, EsiError> {
    fetch_page(client, &format!("/universe/types/?page={page}")).await
}

#[derive(Deserialize, Debug, Clone)]
pub struct TypeDetail {
    pub type_id: u32,
    pub published: bool,
    pub market_group_id: Option<u32>,
}

pub async fn type_detail(client: &EsiClient, type_id: u32) -> Result<TypeDetail, EsiError> {
    client.get_json(&format!("/universe/types/{type_id}/")).await
}
