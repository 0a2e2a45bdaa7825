use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use esi::{universe, EsiClient};
use location_cache::LocationCache;
use market_data::{CitadelId, RegionId};
use tracing::{info, instrument, warn};

const REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);
const BLACKLIST_WIPE_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// Tracks which citadels live in which region, and which citadels have
/// told us "no" (403) recently enough that polling them again is a waste.
pub struct CitadelDirectory {
    client: Arc<EsiClient>,
    locations: Arc<LocationCache>,
    by_region: RwLock<Arc<HashMap<RegionId, Vec<CitadelId>>>>,
    blacklist: DashMap<CitadelId, ()>,
}

impl CitadelDirectory {
    pub async fn new(client: Arc<EsiClient>, locations: Arc<LocationCache>) -> Self {
        let directory = CitadelDirectory {
            client,
            locations,
            by_region: RwLock::new(Arc::new(HashMap::new())),
            blacklist: DashMap::new(),
        };
        directory.refresh().await;
        directory
    }

    pub fn get_citadels_in_region(&self, region: RegionId) -> Vec<CitadelId> {
        let snapshot = self.by_region.read().expect("citadel directory lock poisoned").clone();
        snapshot
            .get(&region)
            .map(|ids| {
                ids.iter()
                    .filter(|id| !self.blacklist.contains_key(id))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_citadels_in_regions(&self, regions: &[RegionId]) -> Vec<CitadelId> {
        regions.iter().flat_map(|r| self.get_citadels_in_region(*r)).collect()
    }

    pub fn blacklist_citadel(&self, citadel: CitadelId) {
        self.blacklist.insert(citadel, ());
    }

    #[instrument(skip(self))]
    pub async fn refresh(&self) {
        let ids = match universe::public_structure_ids(&self.client).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "citadel directory refresh failed, keeping previous map");
                return;
            }
        };

        let resolved = match self.locations.get_locations(&ids).await {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(error = %err, "failed to resolve citadel locations, keeping previous map");
                return;
            }
        };

        let mut by_region: HashMap<RegionId, Vec<CitadelId>> = HashMap::new();
        for (id, location) in resolved {
            by_region.entry(location.region_id).or_default().push(CitadelId(id));
        }

        info!(citadels = ids.len(), regions = by_region.len(), "refreshed citadel directory");
        *self.by_region.write().expect("citadel directory lock poisoned") = Arc::new(by_region);
    }

    pub async fn run_refresh_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.refresh().await;
        }
    }

    pub async fn run_blacklist_wipe_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(BLACKLIST_WIPE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.blacklist.clear();
            info!("cleared citadel blacklist");
        }
    }
}
