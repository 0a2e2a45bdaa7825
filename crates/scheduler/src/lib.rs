use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use market_data::RegionId;
use publisher::Publisher;
use rand::Rng;
use region_directory::RegionDirectory;
use scraper_core::Scraper;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const REGION_REFRESH_INTERVAL: StdDuration = StdDuration::from_secs(5 * 60);
const TICK_INTERVAL: StdDuration = StdDuration::from_secs(1);
/// How far ahead a region is pre-emptively re-armed to when dispatched, so
/// a scrape task that never returns doesn't stall the region forever --
/// the next tick still won't re-dispatch it for ten minutes.
const PREEMPTIVE_REARM: ChronoDuration = ChronoDuration::seconds(600);
/// New regions get a randomized initial offset within this window so a
/// region-list refresh doesn't thundering-herd every region at once.
const INITIAL_JITTER_SECONDS: u64 = 300;

#[derive(Clone, Copy, Debug)]
struct ScheduleEntry {
    run_again: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("unix epoch is representable")
}

fn jittered_run_again() -> DateTime<Utc> {
    let offset = rand::thread_rng().gen_range(0..INITIAL_JITTER_SECONDS);
    Utc::now() + ChronoDuration::seconds(offset as i64)
}

/// The control loop: holds the live per-region schedule, dispatches due
/// regions to the scraper, and forwards their output to the publisher.
pub struct Scheduler {
    regions: Arc<RegionDirectory>,
    scraper: Arc<Scraper>,
    publisher: Arc<Publisher>,
    schedule: Mutex<HashMap<RegionId, ScheduleEntry>>,
}

impl Scheduler {
    pub fn new(regions: Arc<RegionDirectory>, scraper: Arc<Scraper>, publisher: Arc<Publisher>) -> Self {
        Scheduler {
            regions,
            scraper,
            publisher,
            schedule: Mutex::new(HashMap::new()),
        }
    }

    /// Number of regions currently tracked by the schedule. Exposed for
    /// health checks and tests; not used on any hot path.
    pub async fn scheduled_region_count(&self) -> usize {
        self.schedule.lock().await.len()
    }

    async fn initialize(&self) {
        let mut schedule = self.schedule.lock().await;
        for region in self.regions.get_market_regions().iter() {
            schedule.entry(*region).or_insert_with(|| ScheduleEntry {
                run_again: jittered_run_again(),
                last_modified: epoch(),
            });
        }
        info!(regions = schedule.len(), "scheduler initialized");
    }

    /// Runs forever: the region-refresh loop and the market-tick loop both
    /// run as independent tasks for the life of the process.
    pub async fn run(self: Arc<Self>) {
        self.initialize().await;

        let region_refresh = tokio::spawn({
            let this = self.clone();
            async move { this.run_region_refresh_loop().await }
        });
        let tick = tokio::spawn({
            let this = self.clone();
            async move { this.run_tick_loop().await }
        });

        // Neither loop returns under normal operation; this only resolves
        // if one of them panics.
        let _ = tokio::join!(region_refresh, tick);
    }

    #[instrument(skip(self))]
    async fn run_region_refresh_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(REGION_REFRESH_INTERVAL);
        ticker.tick().await; // `initialize` already ran the first merge
        loop {
            ticker.tick().await;
            self.merge_regions().await;
        }
    }

    async fn merge_regions(&self) {
        let current = self.regions.get_market_regions();
        let mut schedule = self.schedule.lock().await;

        schedule.retain(|id, _| current.contains(id));
        for region in current.iter() {
            schedule.entry(*region).or_insert_with(|| ScheduleEntry {
                run_again: jittered_run_again(),
                last_modified: epoch(),
            });
        }

        debug!(regions = schedule.len(), "merged region schedule");
    }

    async fn run_tick_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(self: &Arc<Self>) {
        let now = Utc::now();
        let due: Vec<(RegionId, DateTime<Utc>)> = {
            let mut schedule = self.schedule.lock().await;
            let mut due = Vec::new();
            for (region, entry) in schedule.iter_mut() {
                if entry.run_again < now {
                    due.push((*region, entry.last_modified));
                    // Pre-emptive re-arm happens before the scrape task is
                    // even spawned: if it never returns, the region is
                    // retried in ten minutes, not hammered every tick.
                    entry.run_again = now + PREEMPTIVE_REARM;
                }
            }
            due
        };

        for (region, last_modified) in due {
            let this = self.clone();
            tokio::spawn(async move { this.dispatch(region, last_modified).await });
        }
    }

    #[instrument(skip(self), fields(region_id = region.get()))]
    async fn dispatch(&self, region: RegionId, last_modified: DateTime<Utc>) {
        match self.scraper.scrape_market(region, last_modified).await {
            Ok(outcome) => {
                if let Some(payload) = outcome.payload {
                    match self.publisher.publish(payload).await {
                        Ok(()) => info!("published region snapshot"),
                        Err(err) => warn!(error = %err, "failed to enqueue snapshot for publish"),
                    }
                }
                self.schedule_region(region, outcome.run_again, outcome.last_modified).await;
            }
            Err(err) => {
                warn!(error = %err, "scrape failed, keeping pre-emptive reschedule");
            }
        }
    }

    /// The single mutation primitive for an existing schedule entry.
    async fn schedule_region(&self, region: RegionId, run_again: DateTime<Utc>, last_modified: DateTime<Utc>) {
        let mut schedule = self.schedule.lock().await;
        schedule.insert(region, ScheduleEntry { run_again, last_modified });
    }
}
