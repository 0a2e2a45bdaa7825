use chrono::{DateTime, Utc};
use reqwest::header::HeaderValue;
use serde::Deserialize;
use tracing::warn;

use crate::{EsiClient, EsiError};

/// A single page of a paginated ESI list endpoint, with the scheduling
/// hints the caller needs to keep polling. `last_modified`/`expires` are
/// `None` both when the header is absent and when it's present but
/// unparseable -- a malformed scheduling header on any one page is never
/// worth aborting the fetch over; it's on the caller to decide whether
/// this particular page's headers matter enough to treat a `None` as fatal.
#[derive(Debug)]
pub struct Page<T> {
    pub body: Vec<T>,
    pub num_pages: usize,
    pub last_modified: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
}

fn parse_rfc2822_header(name: &str, value: Option<&HeaderValue>) -> Option<DateTime<Utc>> {
    let value = value?;
    let value = match value.to_str() {
        Ok(v) => v,
        Err(err) => {
            warn!(header = name, error = %err, "non-ascii scheduling header, ignoring");
            return None;
        }
    };
    match DateTime::parse_from_rfc2822(value) {
        Ok(parsed) => Some(parsed.to_utc()),
        Err(err) => {
            warn!(header = name, value, error = %err, "unparseable scheduling header, ignoring");
            None
        }
    }
}

/// Fetch a single page of a list endpoint and parse the pagination and
/// freshness headers ESI attaches to it.
pub async fn fetch_page<T: for<'de> Deserialize<'de>>(
    client: &EsiClient,
    path: &str,
) -> Result<Page<T>, EsiError> {
    let response = client.get(path).await?;
    let headers = response.headers();

    let num_pages: usize = headers
        .get("x-pages")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let last_modified = parse_rfc2822_header("last-modified", headers.get(reqwest::header::LAST_MODIFIED));
    let expires = parse_rfc2822_header("expires", headers.get(reqwest::header::EXPIRES));

    let body = response.json::<Vec<T>>().await?;

    Ok(Page {
        body,
        num_pages,
        last_modified,
        expires,
    })
}

/// The public universe region ID list.
pub async fn region_ids(client: &EsiClient) -> Result<Vec<u32>, EsiError> {
    client.get_json("/universe/regions/").await
}

/// The public (non-authenticated) structure ID list. Citadels requiring
/// authentication to even list are resolved separately by the caller.
pub async fn public_structure_ids(client: &EsiClient) -> Result<Vec<u64>, EsiError> {
    client.get_json("/universe/structures/").await
}

#[derive(Deserialize, Debug, Clone)]
pub struct StructureDetail {
    pub solar_system_id: u32,
    pub name: String,
}

/// Fetch detail for a single structure. Requires an authenticated client,
/// since structure detail is not public.
pub async fn structure_detail(client: &EsiClient, structure_id: u64) -> Result<StructureDetail, EsiError> {
    client
        .get_json(&format!("/universe/structures/{structure_id}/"))
        .await
}
