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

/// Metacritic page scraper. All markup assumptions live here; an unrecognized
/// page degrades to a per-movie ParseFailure, never a batch abort.
pub struct MetacriticScraper {
    http: RateLimitedClient,
    base_url: String,
}

impl MetacriticScraper {
    pub fn new(config: &Config) -> crate::error::Result<Self> {
        Ok(Self {
            http: RateLimitedClient::new(
                Duration::from_millis(config.scraping.delay_ms),
                &config.http,
            )?,
            base_url: config.scraping.metacritic_base_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl EnrichmentSource for MetacriticScraper {
    fn source_name(&self) -> SourceName {
        SourceName::Metacritic
    }

    #[instrument(skip(self, movie), fields(tmdb_id = movie.tmdb_id, title = %movie.title))]
    async fn fetch_one(&self, movie: &MovieRecord) -> Result<Enrichment, AdapterError> {
        let slug = slug::slugify(&movie.title, '-');
        if slug.is_empty() {
            return Err(AdapterError::NotFound);
        }

        let url = format!("{}/movie/{}", self.base_url, slug);
        let html = match self.http.get_text(&url, &[]).await {
            Ok(html) => html,
            Err(FetchError::Rejected { status: 404, .. }) => return Err(AdapterError::NotFound),
            Err(e) => return Err(e.into()),
        };

        let (block, page_year) = parse_scorecard(&html)?;

        // Identity check: a slug can resolve to a different film entirely
        if let Some(expected) = movie.year {
            if (expected - page_year).abs() > SCRAPE_YEAR_TOLERANCE {
                warn!(expected, found = page_year, "Metacritic page year mismatch");
                return Err(AdapterError::YearMismatch {
                    expected,
                    found: page_year,
                });
            }
        }

        if block.is_empty() {
            return Err(AdapterError::NotFound);
        }
        debug!(critic_score = ?block.critic_score, "Metacritic scrape succeeded");
        Ok(Enrichment::Metacritic(block))
    }
}

/// Pull scores out of a Metacritic movie page. The page year is required for
/// the identity check; a page without one is an unrecognized structure.
fn parse_scorecard(html: &str) -> Result<(ScoreBlock, i32), AdapterError> {
    let document = Html::parse_document(html);

    let year_sel = Selector::parse(r#"div[data-testid="hero-metadata"] li span"#).unwrap();
    let critic_score_sel =
        Selector::parse(r#"div[data-testid="critic-score-info"] div.c-siteReviewScore span"#)
            .unwrap();
    let critic_count_sel = Selector::parse(r#"a[data-testid="critic-path"]"#).unwrap();
    let user_score_sel =
        Selector::parse(r#"div[data-testid="user-score-info"] div.c-siteReviewScore span"#)
            .unwrap();
    let user_count_sel = Selector::parse(r#"a[data-testid="user-path"]"#).unwrap();

    let year = document
        .select(&year_sel)
        .next()
        .and_then(|el| collect_text(&el).trim().parse::<i32>().ok())
        .ok_or_else(|| AdapterError::ParseFailure("could not extract page year".to_string()))?;

    let block = ScoreBlock {
        critic_score: select_number(&document, &critic_score_sel),
        critic_count: select_count(&document, &critic_count_sel),
        user_score: select_number(&document, &user_score_sel),
        user_count: select_count(&document, &user_count_sel),
    };

    Ok((block, year))
}

fn collect_text(element: &scraper::ElementRef) -> String {
    element.text().collect::<String>()
}

fn select_number(document: &Html, selector: &Selector) -> Option<f64> {
    document
        .select(selector)
        .next()
        .and_then(|el| collect_text(&el).trim().parse::<f64>().ok())
}

fn select_count(document: &Html, selector: &Selector) -> Option<u32> {
    document
        .select(selector)
        .next()
        .and_then(|el| {
            let text = collect_text(&el);
            COUNT_RE
                .captures(&text)
                .and_then(|caps| caps[1].replace(',', "").parse::<u32>().ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div data-testid="hero-metadata"><ul><li><span>1999</span></li></ul></div>
          <div data-testid="critic-score-info">
            <div class="c-siteReviewScore"><span>73</span></div>
            <a data-testid="critic-path">Based on 35 Critic Reviews</a>
          </div>
          <div data-testid="user-score-info">
            <div class="c-siteReviewScore"><span>8.7</span></div>
            <a data-testid="user-path">2,816 User Ratings</a>
          </div>
        </body></html>"#;

    #[test]
    fn scorecard_parses_scores_counts_and_year() {
        let (block, year) = parse_scorecard(PAGE).unwrap();
        assert_eq!(year, 1999);
        assert_eq!(block.critic_score, Some(73.0));
        assert_eq!(block.critic_count, Some(35));
        assert_eq!(block.user_score, Some(8.7));
        assert_eq!(block.user_count, Some(2816));
    }

    #[test]
    fn missing_year_is_a_parse_failure() {
        let html = "<html><body><p>Nothing here</p></body></html>";
        match parse_scorecard(html) {
            Err(AdapterError::ParseFailure(_)) => {}
            other => panic!("expected ParseFailure, got {other:?}"),
        }
    }

    #[test]
    fn partial_scorecards_keep_what_parsed() {
        let html = r#"
            <html><body>
              <div data-testid="hero-metadata"><ul><li><span>2010</span></li></ul></div>
              <div data-testid="critic-score-info">
                <div class="c-siteReviewScore"><span>64</span></div>
              </div>
            </body></html>"#;
        let (block, year) = parse_scorecard(html).unwrap();
        assert_eq!(year, 2010);
        assert_eq!(block.critic_score, Some(64.0));
        assert!(block.critic_count.is_none());
        assert!(block.user_score.is_none());
    }
}
