pub mod error;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use citadel_directory::CitadelDirectory;
use esi::market::{self as esi_market, RawOrder};
use esi::{EsiClient, EsiError};
use location_cache::LocationCache;
use market_data::compress::compress;
use market_data::{CitadelId, Order, RegionId, Rowset, Snapshot, TypeId};
use market_types::MarketTypeDirectory;
use tracing::{debug, instrument, warn};

pub use error::ScrapeError;

/// CDN-lag guard: if `Expires` is already in the past, treat the region as
/// due again shortly rather than immediately (which would hammer a stale
/// cache edge).
const EXPIRED_HEADER_GRACE: ChronoDuration = ChronoDuration::seconds(10);
/// Extra safety margin added on top of `Expires` before the next poll.
const RESCHEDULE_MARGIN: ChronoDuration = ChronoDuration::seconds(5);

pub struct ScrapeOutcome {
    /// `None` when the upstream reports nothing has changed since the
    /// caller's `last_modified` hint -- the caller should reschedule but
    /// not publish.
    pub payload: Option<Vec<u8>>,
    pub run_again: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

pub struct Scraper {
    client: Arc<EsiClient>,
    locations: Arc<LocationCache>,
    citadels: Arc<CitadelDirectory>,
    market_types: Arc<MarketTypeDirectory>,
    uploader_name: String,
}

impl Scraper {
    pub fn new(
        client: Arc<EsiClient>,
        locations: Arc<LocationCache>,
        citadels: Arc<CitadelDirectory>,
        market_types: Arc<MarketTypeDirectory>,
        uploader_name: impl Into<String>,
    ) -> Self {
        Scraper {
            client,
            locations,
            citadels,
            market_types,
            uploader_name: uploader_name.into(),
        }
    }

    #[instrument(skip(self), fields(region_id = region.get()))]
    pub async fn scrape_market(
        &self,
        region: RegionId,
        last_modified_hint: DateTime<Utc>,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let mut rowsets: HashMap<TypeId, Rowset> = self
            .market_types
            .get_market_types()
            .iter()
            .map(|&type_id| (type_id, Rowset::new(region, type_id)))
            .collect();

        let first_page = esi_market::region_orders_page(&self.client, region.get(), 1).await?;

        // Only the region's own first page decides when this region is due
        // again, so only here is a missing or unparseable scheduling header
        // fatal to the whole scrape. Every other page (region page 2+, any
        // citadel page) degrades to `Utc::now()` below instead.
        let expires = first_page.expires.ok_or(ScrapeError::HeaderParseFailure)?;
        let new_last_modified = first_page.last_modified.ok_or(ScrapeError::HeaderParseFailure)?;

        let now = Utc::now();
        let effective_expiry = if expires < now { now + EXPIRED_HEADER_GRACE } else { expires };
        let run_again = effective_expiry + RESCHEDULE_MARGIN;

        if new_last_modified <= last_modified_hint {
            debug!("region not modified since last scrape, skipping publish");
            return Ok(ScrapeOutcome {
                payload: None,
                run_again,
                last_modified: new_last_modified,
            });
        }

        let mut raw_orders: Vec<(RawOrder, DateTime<Utc>)> = first_page
            .body
            .into_iter()
            .map(|o| (o, new_last_modified))
            .collect();

        let mut page = 2;
        loop {
            let next = esi_market::region_orders_page(&self.client, region.get(), page).await?;
            if next.body.is_empty() {
                break;
            }
            let page_time = next.last_modified.unwrap_or_else(Utc::now);
            raw_orders.extend(next.body.into_iter().map(|o| (o, page_time)));
            page += 1;
        }

        for citadel in self.citadels.get_citadels_in_region(region) {
            if let Err(err) = self.scrape_citadel(citadel, &mut raw_orders).await {
                return Err(err);
            }
        }

        let location_ids: Vec<u64> = {
            let mut ids: Vec<u64> = raw_orders.iter().map(|(o, _)| o.location_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let locations = self.locations.get_locations(&location_ids).await?;

        let mut duplicates_removed = 0usize;
        for (raw, generated_at) in raw_orders {
            let Some(order) = Self::assemble_order(region, raw, generated_at, &locations) else {
                continue;
            };
            rowsets
                .entry(order.type_id)
                .or_insert_with(|| Rowset::new(region, order.type_id))
                .rows
                .push(order);
        }

        let mut finalized: Vec<Rowset> = Vec::with_capacity(rowsets.len());
        for (_, mut rowset) in rowsets {
            duplicates_removed += rowset.finalize();
            if !rowset.rows.is_empty() {
                finalized.push(rowset);
            }
        }

        if duplicates_removed > 0 {
            debug!(duplicates_removed, "collapsed duplicate orders across pages");
        }

        let snapshot = Snapshot {
            uploader_name: &self.uploader_name,
            rowsets: &finalized,
        };
        let payload = compress(&snapshot.to_json())?;

        Ok(ScrapeOutcome {
            payload: Some(payload),
            run_again,
            last_modified: new_last_modified,
        })
    }

    /// Fetches every page of a single citadel's orders into `raw_orders`.
    /// A 403 on the first page blacklists the citadel and is swallowed
    /// (returns `Ok`); any other error propagates and aborts the scrape.
    async fn scrape_citadel(
        &self,
        citadel: CitadelId,
        raw_orders: &mut Vec<(RawOrder, DateTime<Utc>)>,
    ) -> Result<(), ScrapeError> {
        let mut page = 1;
        loop {
            let result = esi_market::structure_orders_page(&self.client, citadel.get(), page).await;
            let response = match result {
                Ok(response) => response,
                Err(EsiError::PermissionDenied) if page == 1 => {
                    warn!(citadel_id = citadel.get(), "citadel denied access, blacklisting");
                    self.citadels.blacklist_citadel(citadel);
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            if response.body.is_empty() {
                break;
            }
            let page_time = response.last_modified.unwrap_or_else(Utc::now);
            raw_orders.extend(response.body.into_iter().map(|o| (o, page_time)));
            page += 1;
        }
        Ok(())
    }

    /// Resolves a raw order against an already-fetched location map.
    /// Returns `None` (not an error) when the location is unknown or the
    /// issue date is unparseable -- the order is simply dropped, per the
    /// per-order `LocationUnknown` policy.
    fn assemble_order(
        region: RegionId,
        raw: RawOrder,
        generated_at: DateTime<Utc>,
        locations: &HashMap<u64, location_cache::Location>,
    ) -> Option<Order> {
        let Some(location) = locations.get(&raw.location_id) else {
            debug!(location_id = raw.location_id, "unknown location, skipping order");
            return None;
        };

        let issue_date = match DateTime::parse_from_rfc3339(&raw.issued) {
            Ok(d) => d.to_utc(),
            Err(_) => {
                debug!(order_id = raw.order_id, "unparseable issue date, skipping order");
                return None;
            }
        };

        Some(Order {
            order_id: raw.order_id,
            type_id: TypeId(raw.type_id),
            region_id: region,
            station_id: location.station_id,
            solar_system_id: location.solar_system_id,
            price: raw.price,
            vol_entered: raw.volume_total.into(),
            vol_remaining: raw.volume_remain.into(),
            min_volume: raw.min_volume.into(),
            range: raw.range,
            bid: raw.is_buy_order,
            issue_date,
            duration: (raw.duration as i64) * 24 * 3600,
            generated_at,
        })
    }
}

