//! The three ETL tracks and the orchestrator that runs them.
//!
//! Fetch and map run concurrently for items, sellers and currency. Each
//! track owns its records until loading, which runs one track at a time
//! through the single warehouse handle. A failure in one track never stops
//! the others.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use meli_etl_listing_models::{CurrencyConversionRecord, ItemRecord, SellerRecord};
use meli_etl_models::{CurrencyPair, EtlConfig, RunSummary, Track, TrackReport, TrackState};
use meli_etl_source::mapping::{self, MappedBatch, SchemaError};
use meli_etl_source::progress::{ProgressCallback, null_progress};
use meli_etl_source::{MarketplaceApi, SourceError};
use meli_etl_warehouse::{TableRef, Warehouse, WarehouseRow};
use serde_json::Value;

use crate::config;

/// Progress sinks, one per track.
#[derive(Clone)]
pub struct EtlProgress {
    /// Items track.
    pub items: Arc<dyn ProgressCallback>,
    /// Sellers track.
    pub sellers: Arc<dyn ProgressCallback>,
    /// Currency track.
    pub currency: Arc<dyn ProgressCallback>,
}

impl EtlProgress {
    /// Progress that discards every update.
    #[must_use]
    pub fn null() -> Self {
        Self {
            items: null_progress(),
            sellers: null_progress(),
            currency: null_progress(),
        }
    }

    /// Returns the sink for `track`.
    #[must_use]
    pub const fn for_track(&self, track: Track) -> &Arc<dyn ProgressCallback> {
        match track {
            Track::Items => &self.items,
            Track::Sellers => &self.sellers,
            Track::Currency => &self.currency,
        }
    }
}

/// A track in flight: its report, its records and where to report
/// progress.
struct TrackRun<T> {
    report: TrackReport,
    table: TableRef,
    records: Vec<T>,
    progress: Arc<dyn ProgressCallback>,
    started: Instant,
}

impl<T> TrackRun<T> {
    /// Creates the track and moves it into `Fetching`.
    fn start(track: Track, table: TableRef, progress: &EtlProgress) -> Self {
        let mut run = Self {
            report: TrackReport::new(track, table.to_string()),
            table,
            records: Vec::new(),
            progress: Arc::clone(progress.for_track(track)),
            started: Instant::now(),
        };
        run.advance(TrackState::Fetching);
        run
    }

    fn advance(&mut self, next: TrackState) {
        debug_assert!(
            self.report.state.can_advance_to(next),
            "{} cannot move from {} to {next}",
            self.report.track,
            self.report.state
        );
        log::info!("[{}] {} -> {next}", self.report.track, self.report.state);
        self.report.state = next;
        self.progress.set_message(next.as_ref().to_ascii_lowercase());
    }

    fn fail(&mut self, error: String) {
        log::error!(
            "[{}] failed while {}: {error}",
            self.report.track,
            self.report.state.as_ref().to_ascii_lowercase()
        );
        self.advance(TrackState::Failed);
        self.report.error = Some(error);
    }

    /// Runs the fetch and map stages, leaving the track in `Mapping` with
    /// its records, or `Failed`.
    async fn fetch_and_map<F>(
        mut self,
        fetch: F,
        mapper: fn(&Value) -> Result<T, SchemaError>,
    ) -> Self
    where
        F: Future<Output = Result<Vec<Value>, SourceError>>,
    {
        let raws = match fetch.await {
            Ok(raws) => raws,
            Err(e) => {
                self.fail(e.to_string());
                return self;
            }
        };
        self.report.fetched = raws.len() as u64;

        self.advance(TrackState::Mapping);
        let MappedBatch { records, skipped } =
            mapping::map_batch(self.report.track.as_ref(), &raws, mapper);
        self.report.skipped = skipped;
        self.records = records;

        log::info!(
            "[{}] mapped {} of {} records ({skipped} skipped)",
            self.report.track,
            self.records.len(),
            self.report.fetched
        );

        self
    }
}

impl<T: WarehouseRow> TrackRun<T> {
    /// Loads the mapped records and returns the terminal report.
    fn load<W: Warehouse>(mut self, warehouse: &mut W) -> TrackReport {
        if !self.report.state.is_terminal() {
            self.advance(TrackState::Loading);

            match warehouse.append(&self.table, &self.records) {
                Ok(written) => {
                    self.report.written = written;
                    self.advance(TrackState::Done);
                }
                Err(e) => self.fail(e.to_string()),
            }
        }

        self.report.duration = self.started.elapsed();

        let summary = match &self.report.error {
            Some(e) => format!("failed: {e}"),
            None => format!("{} rows -> {}", self.report.written, self.table),
        };
        self.progress.finish(summary);

        self.report
    }
}

async fn fetch_currency_rates<A>(
    api: &A,
    pairs: &[CurrencyPair],
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<Value>, SourceError>
where
    A: MarketplaceApi + ?Sized,
{
    progress.set_total(pairs.len() as u64);

    let mut raws = Vec::with_capacity(pairs.len());
    for pair in pairs {
        log::debug!("[currency] fetching {pair}");
        raws.push(api.fetch_currency_rate(&pair.base, &pair.quote).await?);
        progress.inc(1);
    }
    Ok(raws)
}

/// Runs all three tracks and returns their reports.
///
/// Never fails as a whole: fetch and load errors end up in the failing
/// track's report. Records that do not match their schema are skipped and
/// counted.
pub async fn run_etl<A, W>(
    api: &A,
    warehouse: &mut W,
    config: &EtlConfig,
    progress: &EtlProgress,
) -> RunSummary
where
    A: MarketplaceApi + ?Sized,
    W: Warehouse,
{
    let started_at = Utc::now();
    let query = config::search_query(config);

    let mut items = TrackRun::<ItemRecord>::start(
        Track::Items,
        config::table_ref(config, Track::Items),
        progress,
    );
    let mut sellers = TrackRun::<SellerRecord>::start(
        Track::Sellers,
        config::table_ref(config, Track::Sellers),
        progress,
    );
    let currency = TrackRun::<CurrencyConversionRecord>::start(
        Track::Currency,
        config::table_ref(config, Track::Currency),
        progress,
    );

    let listings = async {
        match api.search(&query, &progress.items).await {
            Ok(hits) => {
                log::info!("[search] {} hits shared by items and sellers", hits.len());
                futures::join!(
                    items.fetch_and_map(
                        api.fetch_item_details(&query, &hits, &progress.items),
                        mapping::map_item
                    ),
                    sellers.fetch_and_map(
                        api.fetch_sellers(&hits, &progress.sellers),
                        mapping::map_seller
                    ),
                )
            }
            Err(e) => {
                let error = format!("search failed: {e}");
                items.fail(error.clone());
                sellers.fail(error);
                (items, sellers)
            }
        }
    };

    let ((items, mut sellers), currency) = futures::join!(
        listings,
        currency.fetch_and_map(
            fetch_currency_rates(api, &config.currency_pairs, &progress.currency),
            mapping::map_currency
        ),
    );

    sellers.records = mapping::dedup_sellers(std::mem::take(&mut sellers.records));

    let tracks = vec![
        items.load(warehouse),
        sellers.load(warehouse),
        currency.load(warehouse),
    ];

    RunSummary { started_at, tracks }
}
