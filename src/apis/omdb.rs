use crate::config::Config;
use crate::error::AdapterError;
use crate::http::RateLimitedClient;
use crate::types::{Enrichment, EnrichmentSource, MovieRecord, OmdbBlock, SourceName};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})").unwrap());

/// OMDb lookup adapter. Prefers the imdb_id key; falls back to title+year.
/// The API signals not-found in-band with `Response: "False"`, which is a
/// typed empty result here, never a parse error.
pub struct OmdbClient {
    http: RateLimitedClient,
    api_key: String,
    base_url: String,
    year_tolerance: i32,
}

impl OmdbClient {
    pub fn new(config: &Config) -> crate::error::Result<Self> {
        Ok(Self {
            http: RateLimitedClient::new(
                Duration::from_millis(config.omdb.delay_ms),
                &config.http,
            )?,
            api_key: config.omdb_api_key()?,
            base_url: config.omdb.base_url.clone(),
            year_tolerance: config.enhancement.year_tolerance,
        })
    }
}

#[async_trait::async_trait]
impl EnrichmentSource for OmdbClient {
    fn source_name(&self) -> SourceName {
        SourceName::Omdb
    }

    #[instrument(skip(self, movie), fields(tmdb_id = movie.tmdb_id, title = %movie.title))]
    async fn fetch_one(&self, movie: &MovieRecord) -> Result<Enrichment, AdapterError> {
        let mut query = vec![
            ("apikey", self.api_key.clone()),
            ("plot", "full".to_string()),
        ];
        match movie.join_key() {
            Some(imdb_id) => query.push(("i", imdb_id.to_string())),
            None => {
                query.push(("t", movie.title.clone()));
                if let Some(year) = movie.year {
                    query.push(("y", year.to_string()));
                }
            }
        }

        let data = self.http.get_json(&self.base_url, &query).await?;
        let (block, reported_year) = parse_response(&data)?;

        if let (Some(expected), Some(found)) = (movie.year, reported_year) {
            if !movie.year_matches(found, self.year_tolerance) {
                return Err(AdapterError::YearMismatch { expected, found });
            }
        }

        debug!(imdb_rating = ?block.imdb_rating, "OMDb lookup succeeded");
        Ok(Enrichment::Omdb(block))
    }
}

/// Normalize a raw OMDb payload into the enrichment block plus the year the
/// source reports for the title it matched.
fn parse_response(data: &Value) -> Result<(OmdbBlock, Option<i32>), AdapterError> {
    if data["Response"].as_str() != Some("True") {
        return Err(AdapterError::NotFound);
    }

    let block = OmdbBlock {
        imdb_rating: numeric_field(data, "imdbRating").and_then(|s| s.parse::<f64>().ok()),
        imdb_votes: numeric_field(data, "imdbVotes")
            .and_then(|s| s.replace(',', "").parse::<u64>().ok()),
        metascore: numeric_field(data, "Metascore").and_then(|s| s.parse::<u32>().ok()),
        box_office: text_field(data, "BoxOffice"),
        awards: text_field(data, "Awards"),
        plot: text_field(data, "Plot"),
    };

    // "Year" comes back as "1999" for films and "1999–2003" for series
    let year = text_field(data, "Year")
        .as_deref()
        .and_then(|y| YEAR_RE.captures(y))
        .and_then(|caps| caps[1].parse::<i32>().ok());

    Ok((block, year))
}

/// String field with the OMDb "N/A" sentinel mapped to None
fn text_field(data: &Value, key: &str) -> Option<String> {
    data[key]
        .as_str()
        .filter(|v| !v.is_empty() && *v != "N/A")
        .map(str::to_string)
}

fn numeric_field(data: &Value, key: &str) -> Option<String> {
    text_field(data, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn not_found_is_typed_not_a_parse_error() {
        let data = json!({"Response": "False", "Error": "Movie not found!"});
        match parse_response(&data) {
            Err(AdapterError::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn full_payload_is_normalized() {
        let data = json!({
            "Response": "True",
            "Title": "The Matrix",
            "Year": "1999",
            "imdbRating": "8.7",
            "imdbVotes": "1,234,567",
            "Metascore": "73",
            "BoxOffice": "$172,076,928",
            "Awards": "Won 4 Oscars.",
            "Plot": "A computer hacker learns the truth."
        });
        let (block, year) = parse_response(&data).unwrap();
        assert_eq!(block.imdb_rating, Some(8.7));
        assert_eq!(block.imdb_votes, Some(1_234_567));
        assert_eq!(block.metascore, Some(73));
        assert_eq!(block.box_office.as_deref(), Some("$172,076,928"));
        assert_eq!(year, Some(1999));
    }

    #[test]
    fn na_sentinels_become_none() {
        let data = json!({
            "Response": "True",
            "Year": "N/A",
            "imdbRating": "N/A",
            "imdbVotes": "N/A",
            "Metascore": "N/A",
            "BoxOffice": "N/A"
        });
        let (block, year) = parse_response(&data).unwrap();
        assert!(block.imdb_rating.is_none());
        assert!(block.imdb_votes.is_none());
        assert!(block.metascore.is_none());
        assert!(block.box_office.is_none());
        assert!(year.is_none());
    }

    #[test]
    fn series_year_ranges_take_the_first_year() {
        let data = json!({"Response": "True", "Year": "1999–2003"});
        let (_, year) = parse_response(&data).unwrap();
        assert_eq!(year, Some(1999));
    }
}
