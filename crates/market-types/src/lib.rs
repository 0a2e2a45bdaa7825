use std::sync::{Arc, RwLock};
use std::time::Duration;

use esi::{types, EsiClient};
use market_data::TypeId;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

const REFRESH_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);
const DETAIL_CONCURRENCY: usize = 200;
const DETAIL_RETRIES: u32 = 3;

/// The set of type IDs that are actually tradable on the market: published
/// and assigned to a market group. Orders for types outside this set still
/// get a rowset (see the scraper), but this directory is what seeds the
/// initial rowset set for a scrape.
pub struct MarketTypeDirectory {
    client: Arc<EsiClient>,
    types: RwLock<Arc<Vec<TypeId>>>,
}

impl MarketTypeDirectory {
    pub async fn new(client: Arc<EsiClient>) -> Self {
        let directory = MarketTypeDirectory {
            client,
            types: RwLock::new(Arc::new(Vec::new())),
        };
        directory.refresh().await;
        directory
    }

    pub fn get_market_types(&self) -> Arc<Vec<TypeId>> {
        self.types.read().expect("market type directory lock poisoned").clone()
    }

    #[instrument(skip(self))]
    pub async fn refresh(&self) {
        let ids = match self.fetch_all_type_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "failed to list type ids, keeping previous directory");
                return;
            }
        };

        let semaphore = Arc::new(Semaphore::new(DETAIL_CONCURRENCY));
        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                fetch_detail_with_retry(&client, id).await
            }));
        }

        let mut qualified = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Some(detail)) if detail.published && detail.market_group_id.unwrap_or(0) != 0 => {
                    qualified.push(TypeId(detail.type_id));
                }
                Ok(Some(_)) => {} // not a market type
                Ok(None) => {}    // permanently failed after retries, drop this one type
                Err(err) => warn!(error = %err, "type detail task panicked"),
            }
        }

        info!(count = qualified.len(), "refreshed market type directory");
        *self.types.write().expect("market type directory lock poisoned") = Arc::new(qualified);
    }

    async fn fetch_all_type_ids(&self) -> Result<Vec<u32>, esi::EsiError> {
        let mut page = 1;
        let mut ids = Vec::new();
        loop {
            let result = types::type_ids_page(&self.client, page).await?;
            let got_any = !result.body.is_empty();
            ids.extend(result.body);
            if !got_any || page >= result.num_pages {
                break;
            }
            page += 1;
        }
        Ok(ids)
    }

    pub async fn run_refresh_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.refresh().await;
        }
    }
}

/// Retry up to `DETAIL_RETRIES` times, stopping on the first success.
/// Returns `None` only once every attempt has failed.
async fn fetch_detail_with_retry(client: &EsiClient, type_id: u32) -> Option<esi::types::TypeDetail> {
    for attempt in 1..=DETAIL_RETRIES {
        match types::type_detail(client, type_id).await {
            Ok(detail) => return Some(detail),
            Err(err) => {
                debug!(type_id, attempt, error = %err, "type detail fetch failed");
            }
        }
    }
    None
}
