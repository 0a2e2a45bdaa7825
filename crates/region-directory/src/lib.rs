use std::sync::{Arc, RwLock};
use std::time::Duration;

use esi::{universe, EsiClient};
use market_data::RegionId;
use tracing::{info, instrument, warn};

const REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Periodically refreshed list of regions whose market endpoints actually
/// return orders. Readers never take a lock on the hot path: the whole
/// list is replaced atomically on refresh, and reads clone the current
/// `Arc` snapshot.
pub struct RegionDirectory {
    client: Arc<EsiClient>,
    regions: RwLock<Arc<Vec<RegionId>>>,
}

impl RegionDirectory {
    pub async fn new(client: Arc<EsiClient>) -> Self {
        let directory = RegionDirectory {
            client,
            regions: RwLock::new(Arc::new(Vec::new())),
        };
        directory.refresh().await;
        directory
    }

    pub fn get_market_regions(&self) -> Arc<Vec<RegionId>> {
        self.regions.read().expect("region directory lock poisoned").clone()
    }

    #[instrument(skip(self))]
    pub async fn refresh(&self) {
        match universe::region_ids(&self.client).await {
            Ok(ids) => {
                let regions: Vec<RegionId> = ids
                    .into_iter()
                    .filter_map(|id| RegionId::try_from(id).ok())
                    .filter(RegionId::is_market_region)
                    .collect();

                info!(count = regions.len(), "refreshed region directory");
                *self.regions.write().expect("region directory lock poisoned") = Arc::new(regions);
            }
            Err(err) => {
                warn!(error = %err, "region directory refresh failed, keeping previous list");
            }
        }
    }

    /// Runs the 30-minute refresh loop forever. Intended to be spawned as
    /// its own task by the entry point.
    pub async fn run_refresh_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        ticker.tick().await; // consume the immediate first tick; `new` already refreshed once
        loop {
            ticker.tick().await;
            self.refresh().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn filters_out_non_market_regions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/universe/regions/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![
                10000002, 10000030, 11000001, 10000004, 10000019,
            ]))
            .mount(&server)
            .await;

        let client = Arc::new(EsiClient::with_base_url("test", "test-os", 8, &server.uri()));
        let directory = RegionDirectory::new(client).await;

        let regions = directory.get_market_regions();
        assert_eq!(regions.len(), 2);
        assert!(regions.contains(&RegionId::try_from(10000002).unwrap()));
        assert!(regions.contains(&RegionId::try_from(10000030).unwrap()));
    }
}
