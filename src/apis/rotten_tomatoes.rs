use crate::apis::{slug, SCRAPE_YEAR_TOLERANCE};
use crate::config::Config;
use crate::error::{AdapterError, FetchError};
use crate::http::RateLimitedClient;
use crate::types::{Enrichment, EnrichmentSource, MovieRecord, ScoreBlock, SourceName};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument, warn};

static COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\d,]+)").unwrap());
static PAGE_YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());

/// Rotten Tomatoes page scraper. Tries the bare slug first, then the
/// `{slug}_{year}` variant the site uses to disambiguate remakes.
pub struct RottenTomatoesScraper {
    http: RateLimitedClient,
    base_url: String,
}

impl RottenTomatoesScraper {
    pub fn new(config: &Config) -> crate::error::Result<Self> {
        Ok(Self {
            http: RateLimitedClient::new(
                Duration::from_millis(config.scraping.delay_ms),
                &config.http,
            )?,
            base_url: config.scraping.rotten_tomatoes_base_url.clone(),
        })
    }

    fn candidate_urls(&self, movie: &MovieRecord) -> Vec<String> {
        let slug = slug::slugify(&movie.title, '_');
        if slug.is_empty() {
            return Vec::new();
        }
        let mut urls = vec![format!("{}/m/{}", self.base_url, slug)];
        if let Some(year) = movie.year {
            urls.push(format!("{}/m/{}_{}", self.base_url, slug, year));
        }
        urls
    }
}

#[async_trait::async_trait]
impl EnrichmentSource for RottenTomatoesScraper {
    fn source_name(&self) -> SourceName {
        SourceName::RottenTomatoes
    }

    #[instrument(skip(self, movie), fields(tmdb_id = movie.tmdb_id, title = %movie.title))]
    async fn fetch_one(&self, movie: &MovieRecord) -> Result<Enrichment, AdapterError> {
        let urls = self.candidate_urls(movie);
        if urls.is_empty() {
            return Err(AdapterError::NotFound);
        }

        let mut year_mismatch: Option<AdapterError> = None;
        for url in &urls {
            let html = match self.http.get_text(url, &[]).await {
                Ok(html) => html,
                Err(FetchError::Rejected { status: 404, .. }) => continue,
                Err(e) => return Err(e.into()),
            };

            let scraped = match parse_scorecard(&html) {
                Ok(scraped) => scraped,
                Err(e) => {
                    debug!(url, error = %e, "Unrecognized page, trying next URL pattern");
                    continue;
                }
            };

            if let (Some(expected), Some(found)) = (movie.year, scraped.page_year) {
                if (expected - found).abs() > SCRAPE_YEAR_TOLERANCE {
                    warn!(url, expected, found, "Page year mismatch, trying next URL pattern");
                    year_mismatch = Some(AdapterError::YearMismatch { expected, found });
                    continue;
                }
            }

            if scraped.block.is_empty() {
                continue;
            }
            debug!(tomatometer = ?scraped.block.critic_score, "Rotten Tomatoes scrape succeeded");
            return Ok(Enrichment::RottenTomatoes(scraped.block));
        }

        // A wrong-year page is more informative than a plain miss
        Err(year_mismatch.unwrap_or(AdapterError::NotFound))
    }
}

#[derive(Debug)]
struct ScrapedPage {
    block: ScoreBlock,
    page_year: Option<i32>,
}

/// Pull tomatometer and audience scores out of the media-scorecard block.
fn parse_scorecard(html: &str) -> Result<ScrapedPage, AdapterError> {
    let document = Html::parse_document(html);

    let scorecard_sel = Selector::parse("media-scorecard").unwrap();
    if document.select(&scorecard_sel).next().is_none() {
        return Err(AdapterError::ParseFailure(
            "media-scorecard not found".to_string(),
        ));
    }

    let critic_score_sel = Selector::parse(r#"rt-text[slot="criticsScore"]"#).unwrap();
    let critic_count_sel = Selector::parse(r#"rt-link[slot="criticsReviews"]"#).unwrap();
    let audience_score_sel = Selector::parse(r#"rt-text[slot="audienceScore"]"#).unwrap();
    let audience_count_sel = Selector::parse(r#"rt-link[slot="audienceReviews"]"#).unwrap();
    let metadata_sel = Selector::parse(r#"rt-text[slot="metadataProp"]"#).unwrap();

    let block = ScoreBlock {
        critic_score: select_percent(&document, &critic_score_sel),
        critic_count: select_count(&document, &critic_count_sel),
        user_score: select_percent(&document, &audience_score_sel),
        user_count: select_count(&document, &audience_count_sel),
    };

    let page_year = document.select(&metadata_sel).find_map(|el| {
        let text = el.text().collect::<String>();
        PAGE_YEAR_RE
            .captures(&text)
            .and_then(|caps| caps[1].parse::<i32>().ok())
    });

    Ok(ScrapedPage { block, page_year })
}

fn select_percent(document: &Html, selector: &Selector) -> Option<f64> {
    document.select(selector).next().and_then(|el| {
        el.text()
            .collect::<String>()
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .ok()
    })
}

fn select_count(document: &Html, selector: &Selector) -> Option<u32> {
    document.select(selector).next().and_then(|el| {
        let text = el.text().collect::<String>();
        COUNT_RE
            .captures(&text)
            .and_then(|caps| caps[1].replace(',', "").parse::<u32>().ok())
    })
}
