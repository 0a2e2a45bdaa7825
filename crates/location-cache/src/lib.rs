use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use market_data::{RegionId, SolarSystemId, StationId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum LocationCacheError {
    #[error("transport error resolving locations: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A resolved station/system/region triple for a single location ID.
#[derive(Clone, Copy, Debug)]
pub struct Location {
    pub station_id: StationId,
    pub solar_system_id: SolarSystemId,
    pub region_id: RegionId,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    locations: &'a [u64],
}

#[derive(Deserialize, Debug)]
struct RawLocation {
    #[serde(rename = "stationID")]
    station_id: u64,
    #[serde(rename = "solarSystem")]
    solar_system: RawNestedId,
    region: RawNestedId,
}

#[derive(Deserialize, Debug)]
struct RawNestedId {
    id: u32,
}

/// Read-through cache mapping an upstream location ID to its resolved
/// station/system/region. Never evicts: once a location is known it is
/// assumed stable for the process lifetime. Backed by the separate
/// static-data service, not the game API client.
#[derive(Debug)]
pub struct LocationCache {
    cache: DashMap<u64, Location>,
    client: reqwest::Client,
    base_url: String,
}

impl LocationCache {
    pub fn new(base_url: impl Into<String>) -> Self {
        LocationCache {
            cache: DashMap::new(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build location-cache http client"),
            base_url: base_url.into(),
        }
    }

    /// Single-id convenience form. Reads through the same cache entry
    /// `get_locations` would populate, under the same per-shard lock --
    /// there is no separate unlocked fast path here.
    #[instrument(skip(self))]
    pub async fn get_location(&self, id: u64) -> Result<Option<Location>, LocationCacheError> {
        Ok(self.get_locations(&[id]).await?.remove(&id))
    }

    #[instrument(skip(self, ids))]
    pub async fn get_locations(&self, ids: &[u64]) -> Result<HashMap<u64, Location>, LocationCacheError> {
        let mut result = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();

        for &id in ids {
            if let Some(loc) = self.cache.get(&id) {
                result.insert(id, *loc);
            } else {
                missing.push(id);
            }
        }

        if missing.is_empty() {
            return Ok(result);
        }

        missing.sort_unstable();
        missing.dedup();

        debug!(missing = missing.len(), "resolving locations from static-data service");

        let response: HashMap<String, RawLocation> = self
            .client
            .post(&self.base_url)
            .json(&BatchRequest { locations: &missing })
            .send()
            .await?
            .json()
            .await?;

        for (id_str, raw) in response {
            let Ok(id) = id_str.parse::<u64>() else { continue };
            let Ok(region_id) = RegionId::try_from(raw.region.id) else { continue };

            let location = Location {
                station_id: StationId(raw.station_id),
                solar_system_id: SolarSystemId(raw.solar_system.id),
                region_id,
            };

            self.cache.insert(id, location);
            if ids.contains(&id) {
                result.insert(id, location);
            }
        }

        Ok(result)
    }
}
