use crate::config::Config;
use crate::error::{AdapterError, Result};
use crate::http::RateLimitedClient;
use crate::types::{CastMember, MovieRecord};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Primary source adapter. Paginates the top-rated listing and optionally
/// follows up with a per-movie detail fetch (a second call per movie) for
/// runtime, financials, full genres, cast, and the imdb_id join key.
pub struct TmdbClient {
    http: RateLimitedClient,
    api_key: String,
    base_url: String,
    language: String,
    top_cast: usize,
    genre_map: HashMap<u64, String>,
}

/// One page of the top-rated listing
pub struct PageResult {
    pub records: Vec<MovieRecord>,
    pub total_pages: u32,
}

/// Per-movie detail payload merged into a listing record
#[derive(Debug, Default)]
pub struct MovieDetail {
    pub imdb_id: Option<String>,
    pub status: Option<String>,
    pub runtime: Option<u32>,
    pub budget: Option<u64>,
    pub revenue: Option<u64>,
    pub genres: Vec<String>,
    pub cast: Vec<CastMember>,
}

impl TmdbClient {
    /// Build the client and fetch the genre id-to-name map once per run.
    pub async fn connect(config: &Config) -> Result<Self> {
        let api_key = config.tmdb_api_key()?;
        let http = RateLimitedClient::new(
            Duration::from_millis(config.tmdb.delay_ms),
            &config.http,
        )?;
        let mut client = Self {
            http,
            api_key,
            base_url: config.tmdb.base_url.clone(),
            language: config.tmdb.language.clone(),
            top_cast: config.tmdb.top_cast,
            genre_map: HashMap::new(),
        };
        client.genre_map = client.fetch_genre_map().await?;
        info!("Fetched {} movie genres from TMDB", client.genre_map.len());
        Ok(client)
    }

    async fn fetch_genre_map(&self) -> Result<HashMap<u64, String>> {
        let url = format!("{}/genre/movie/list", self.base_url);
        let data = self
            .http
            .get_json(&url, &self.base_query())
            .await?;
        let mut map = HashMap::new();
        if let Some(genres) = data["genres"].as_array() {
            for genre in genres {
                if let (Some(id), Some(name)) = (genre["id"].as_u64(), genre["name"].as_str()) {
                    map.insert(id, name.to_string());
                }
            }
        }
        Ok(map)
    }

    fn base_query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("api_key", self.api_key.clone()),
            ("language", self.language.clone()),
        ]
    }

    /// Fetch one page of the top-rated listing.
    #[instrument(skip(self))]
    pub async fn fetch_page(&self, page: u32) -> std::result::Result<PageResult, AdapterError> {
        let url = format!("{}/movie/top_rated", self.base_url);
        let mut query = self.base_query();
        query.push(("page", page.to_string()));
        let data = self.http.get_json(&url, &query).await?;
        Ok(parse_listing(&data, &self.genre_map))
    }

    /// Fetch full details plus credits for one movie.
    #[instrument(skip(self))]
    pub async fn fetch_detail(
        &self,
        tmdb_id: u64,
    ) -> std::result::Result<MovieDetail, AdapterError> {
        let url = format!("{}/movie/{}", self.base_url, tmdb_id);
        let mut query = self.base_query();
        query.push(("append_to_response", "credits".to_string()));
        let data = self.http.get_json(&url, &query).await?;
        Ok(parse_detail(&data, self.top_cast))
    }

    /// Walk the top-rated listing up to `max_pages` and `max_movies`,
    /// enriching each entry with its detail payload when `include_details`
    /// is set. A failed detail fetch downgrades that record to listing-only
    /// rather than aborting.
    pub async fn fetch_top_rated(
        &self,
        max_pages: u32,
        max_movies: Option<usize>,
        include_details: bool,
    ) -> Result<Vec<MovieRecord>> {
        if max_pages == 0 || max_movies == Some(0) {
            info!("Zero-sized run requested, nothing to fetch");
            return Ok(Vec::new());
        }
        let mut all_movies = Vec::new();
        let mut page = 1u32;
        'pages: loop {
            let result = self.fetch_page(page).await?;
            if result.records.is_empty() {
                info!("No more results found, stopping pagination");
                break;
            }
            let page_count = result.records.len();
            for mut record in result.records {
                if include_details {
                    match self.fetch_detail(record.tmdb_id).await {
                        Ok(detail) => apply_detail(&mut record, detail),
                        Err(e) => {
                            warn!(
                                tmdb_id = record.tmdb_id,
                                error = %e,
                                "Detail fetch failed, keeping listing data only"
                            );
                        }
                    }
                }
                all_movies.push(record);
                if max_movies.is_some_and(|cap| all_movies.len() >= cap) {
                    info!("Reached max_movies limit: {}", all_movies.len());
                    break 'pages;
                }
            }
            info!("Fetched {} movies from page {}", page_count, page);

            if page >= max_pages {
                info!("Reached max_pages limit: {}", max_pages);
                break;
            }
            if page >= result.total_pages {
                info!("Reached the last available page");
                break;
            }
            page += 1;
        }
        info!("Total movies fetched: {}", all_movies.len());
        Ok(all_movies)
    }
}

/// Parse one top-rated listing page. Entries missing an id or title are
/// skipped rather than failing the page.
fn parse_listing(data: &Value, genre_map: &HashMap<u64, String>) -> PageResult {
    let total_pages = data["total_pages"].as_u64().unwrap_or(1) as u32;
    let mut records = Vec::new();
    if let Some(results) = data["results"].as_array() {
        for item in results {
            match parse_listing_item(item, genre_map) {
                Some(record) => records.push(record),
                None => warn!("Skipping listing entry without id or title"),
            }
        }
    }
    PageResult {
        records,
        total_pages,
    }
}

fn parse_listing_item(item: &Value, genre_map: &HashMap<u64, String>) -> Option<MovieRecord> {
    let tmdb_id = item["id"].as_u64()?;
    let title = item["title"].as_str()?;

    let mut record = MovieRecord::new(tmdb_id, title);
    record.original_title = item["original_title"].as_str().map(str::to_string);
    record.overview = item["overview"].as_str().map(str::to_string);
    record.popularity = item["popularity"].as_f64();
    record.vote_average = item["vote_average"].as_f64();
    record.vote_count = item["vote_count"].as_u64();

    if let Some(date_str) = item["release_date"].as_str() {
        if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
            record.year = Some(chrono::Datelike::year(&date));
            record.release_date = Some(date);
        }
    }

    if let Some(genre_ids) = item["genre_ids"].as_array() {
        record.genres = genre_ids
            .iter()
            .filter_map(|gid| gid.as_u64())
            .map(|gid| {
                genre_map
                    .get(&gid)
                    .cloned()
                    .unwrap_or_else(|| gid.to_string())
            })
            .collect();
    }

    Some(record)
}

fn parse_detail(data: &Value, top_cast: usize) -> MovieDetail {
    let mut detail = MovieDetail {
        imdb_id: data["imdb_id"].as_str().map(str::to_string),
        status: data["status"].as_str().map(str::to_string),
        runtime: data["runtime"].as_u64().map(|r| r as u32),
        budget: data["budget"].as_u64().filter(|b| *b > 0),
        revenue: data["revenue"].as_u64().filter(|r| *r > 0),
        ..Default::default()
    };

    if let Some(genres) = data["genres"].as_array() {
        detail.genres = genres
            .iter()
            .filter_map(|g| g["name"].as_str())
            .map(str::to_string)
            .collect();
    }

    if let Some(cast) = data["credits"]["cast"].as_array() {
        let mut members: Vec<CastMember> = cast
            .iter()
            .filter_map(|member| {
                Some(CastMember {
                    name: member["name"].as_str()?.to_string(),
                    character: member["character"]
                        .as_str()
                        .filter(|c| !c.is_empty())
                        .map(str::to_string),
                    order: member["order"].as_u64().unwrap_or(u64::from(u32::MAX)) as u32,
                })
            })
            .collect();
        members.sort_by_key(|m| m.order);
        members.truncate(top_cast);
        detail.cast = members;
    }

    detail
}

/// Merge a detail payload into a listing record. Detail genres supersede the
/// id-mapped listing genres when present.
pub fn apply_detail(record: &mut MovieRecord, detail: MovieDetail) {
    if detail.imdb_id.is_some() {
        record.imdb_id = detail.imdb_id;
    }
    if detail.status.is_some() {
        record.status = detail.status;
    }
    if detail.runtime.is_some() {
        record.runtime = detail.runtime;
    }
    if detail.budget.is_some() {
        record.budget = detail.budget;
    }
    if detail.revenue.is_some() {
        record.revenue = detail.revenue;
    }
    if !detail.genres.is_empty() {
        record.genres = detail.genres;
    }
    if !detail.cast.is_empty() {
        record.cast = detail.cast;
    }
    record.updated_at = chrono::Utc::now();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal TMDB double: serves a genre list and a repeating three-movie
    /// listing page, counting listing requests.
    async fn stub_tmdb(listing_hits: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 2048];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let body = if request.contains("/genre/movie/list") {
                    json!({"genres": [{"id": 28, "name": "Action"}]}).to_string()
                } else if request.contains("/movie/top_rated") {
                    listing_hits.fetch_add(1, Ordering::SeqCst);
                    json!({
                        "total_pages": 5,
                        "results": [
                            {"id": 1, "title": "First"},
                            {"id": 2, "title": "Second"},
                            {"id": 3, "title": "Third"}
                        ]
                    })
                    .to_string()
                } else {
                    "{}".to_string()
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    fn quick_client(base_url: String) -> TmdbClient {
        TmdbClient {
            http: RateLimitedClient::new(Duration::ZERO, &HttpConfig::default()).unwrap(),
            api_key: "test-key".to_string(),
            base_url,
            language: "en-US".to_string(),
            top_cast: 10,
            genre_map: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn max_movies_caps_the_run_mid_page() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base_url = stub_tmdb(hits.clone()).await;

        let client = quick_client(base_url);
        let movies = client.fetch_top_rated(5, Some(2), false).await.unwrap();

        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].tmdb_id, 1);
        assert_eq!(movies[1].tmdb_id, 2);
        // Cap hit on page 1, so page 2 was never requested
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_sized_run_makes_no_requests() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base_url = stub_tmdb(hits.clone()).await;
        let client = quick_client(base_url);

        let movies = client.fetch_top_rated(0, None, true).await.unwrap();
        assert!(movies.is_empty());
        let movies = client.fetch_top_rated(5, Some(0), true).await.unwrap();
        assert!(movies.is_empty());

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    fn genre_map() -> HashMap<u64, String> {
        HashMap::from([(28, "Action".to_string()), (878, "Science Fiction".to_string())])
    }

    #[test]
    fn listing_page_parses_records_and_paging() {
        let data = json!({
            "page": 1,
            "total_pages": 42,
            "results": [
                {
                    "id": 603,
                    "title": "The Matrix",
                    "original_title": "The Matrix",
                    "release_date": "1999-03-30",
                    "overview": "A computer hacker learns the truth.",
                    "popularity": 85.1,
                    "vote_average": 8.2,
                    "vote_count": 24000,
                    "genre_ids": [28, 878, 12345]
                },
                { "title": "No id, skipped" }
            ]
        });
        let page = parse_listing(&data, &genre_map());
        assert_eq!(page.total_pages, 42);
        assert_eq!(page.records.len(), 1);

        let record = &page.records[0];
        assert_eq!(record.tmdb_id, 603);
        assert_eq!(record.year, Some(1999));
        assert_eq!(
            record.genres,
            vec!["Action", "Science Fiction", "12345"]
        );
        assert!(record.imdb_id.is_none());
    }

    #[test]
    fn detail_parses_cast_in_billing_order_and_truncates() {
        let data = json!({
            "imdb_id": "tt0133093",
            "status": "Released",
            "runtime": 136,
            "budget": 63000000,
            "revenue": 463517383,
            "genres": [{"id": 28, "name": "Action"}],
            "credits": {
                "cast": [
                    {"name": "Carrie-Anne Moss", "character": "Trinity", "order": 1},
                    {"name": "Keanu Reeves", "character": "Neo", "order": 0},
                    {"name": "Laurence Fishburne", "character": "Morpheus", "order": 2}
                ]
            }
        });
        let detail = parse_detail(&data, 2);
        assert_eq!(detail.imdb_id.as_deref(), Some("tt0133093"));
        assert_eq!(detail.runtime, Some(136));
        assert_eq!(detail.cast.len(), 2);
        assert_eq!(detail.cast[0].name, "Keanu Reeves");
        assert_eq!(detail.cast[1].name, "Carrie-Anne Moss");
    }

    #[test]
    fn zero_budget_is_treated_as_absent() {
        let data = json!({"budget": 0, "revenue": 0});
        let detail = parse_detail(&data, 10);
        assert!(detail.budget.is_none());
        assert!(detail.revenue.is_none());
    }

    #[test]
    fn apply_detail_merges_without_clobbering_listing_fields() {
        let mut record = MovieRecord::new(603, "The Matrix");
        record.overview = Some("listing overview".to_string());
        apply_detail(
            &mut record,
            MovieDetail {
                imdb_id: Some("tt0133093".to_string()),
                runtime: Some(136),
                ..Default::default()
            },
        );
        assert_eq!(record.imdb_id.as_deref(), Some("tt0133093"));
        assert_eq!(record.runtime, Some(136));
        assert_eq!(record.overview.as_deref(), Some("listing overview"));
    }
}
