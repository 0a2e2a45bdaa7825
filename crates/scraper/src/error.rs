use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error(transparent)]
    Upstream(#[from] esi::EsiError),

    #[error("failed to parse a scheduling header for this region")]
    HeaderParseFailure,

    #[error(transparent)]
    LocationResolution(#[from] location_cache::LocationCacheError),

    #[error("failed to compress the region snapshot: {0}")]
    Compression(#[from] std::io::Error),
}
