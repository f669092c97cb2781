// One adapter per external source. Each adapter owns its own rate-limited
// client and normalizes responses into the shared enrichment-block shapes;
// HTML-structure assumptions never leak past the adapter that holds them.

pub mod metacritic;
pub mod omdb;
pub mod rotten_tomatoes;
pub mod slug;
pub mod tmdb;

pub use metacritic::MetacriticScraper;
pub use omdb::OmdbClient;
pub use rotten_tomatoes::RottenTomatoesScraper;
pub use tmdb::TmdbClient;

/// Page-identity tolerance for scraped sources. A page whose release year is
/// further than this from the record's year is assumed to be a different film
/// that happens to share the slug.
pub(crate) const SCRAPE_YEAR_TOLERANCE: i32 = 3;
