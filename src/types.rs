use crate::constants;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

static IMDB_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tt\d{7,8}$").unwrap());

/// External data sources feeding the pipeline
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceName {
    Tmdb,
    Omdb,
    Metacritic,
    RottenTomatoes,
}

impl SourceName {
    /// Fixed priority order in which enrichment sources are attempted
    pub const ENRICHMENT_ORDER: [SourceName; 3] = [
        SourceName::Omdb,
        SourceName::Metacritic,
        SourceName::RottenTomatoes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::Tmdb => constants::TMDB_SOURCE,
            SourceName::Omdb => constants::OMDB_SOURCE,
            SourceName::Metacritic => constants::METACRITIC_SOURCE,
            SourceName::RottenTomatoes => constants::ROTTEN_TOMATOES_SOURCE,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            constants::TMDB_SOURCE => Some(SourceName::Tmdb),
            constants::OMDB_SOURCE => Some(SourceName::Omdb),
            constants::METACRITIC_SOURCE => Some(SourceName::Metacritic),
            constants::ROTTEN_TOMATOES_SOURCE => Some(SourceName::RottenTomatoes),
            _ => None,
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One credited cast member, in billing order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    pub name: String,
    pub character: Option<String>,
    pub order: u32,
}

/// Enrichment block contributed by OMDb
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OmdbBlock {
    pub imdb_rating: Option<f64>,
    pub imdb_votes: Option<u64>,
    pub metascore: Option<u32>,
    pub box_office: Option<String>,
    pub awards: Option<String>,
    pub plot: Option<String>,
}

/// Enrichment block contributed by a review-aggregator scrape.
/// For Rotten Tomatoes, critic_score is the tomatometer and user_score
/// the audience score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBlock {
    pub critic_score: Option<f64>,
    pub critic_count: Option<u32>,
    pub user_score: Option<f64>,
    pub user_count: Option<u32>,
}

impl ScoreBlock {
    pub fn is_empty(&self) -> bool {
        self.critic_score.is_none()
            && self.critic_count.is_none()
            && self.user_score.is_none()
            && self.user_count.is_none()
    }
}

/// A successful per-source lookup, tagged by origin so merging is an
/// explicit setter rather than a field-by-field dictionary merge
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment {
    Omdb(OmdbBlock),
    Metacritic(ScoreBlock),
    RottenTomatoes(ScoreBlock),
}

impl Enrichment {
    pub fn source(&self) -> SourceName {
        match self {
            Enrichment::Omdb(_) => SourceName::Omdb,
            Enrichment::Metacritic(_) => SourceName::Metacritic,
            Enrichment::RottenTomatoes(_) => SourceName::RottenTomatoes,
        }
    }
}

/// The canonical unit flowing through the pipeline: created by the TMDB
/// adapter, mutated once per successful enrichment, frozen at staging time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieRecord {
    pub tmdb_id: u64,
    pub imdb_id: Option<String>,
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub overview: Option<String>,
    pub status: Option<String>,
    pub runtime: Option<u32>,
    pub budget: Option<u64>,
    pub revenue: Option<u64>,
    pub popularity: Option<f64>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<u64>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cast: Vec<CastMember>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omdb: Option<OmdbBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metacritic: Option<ScoreBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotten_tomatoes: Option<ScoreBlock>,

    /// Sources that contributed data to this record
    #[serde(default)]
    pub data_sources: BTreeSet<SourceName>,
    /// Sources whose reported release year disagreed with ours beyond the
    /// configured tolerance; their blocks were withheld, not merged
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub year_mismatches: Vec<SourceName>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MovieRecord {
    pub fn new(tmdb_id: u64, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            tmdb_id,
            imdb_id: None,
            title: title.into(),
            original_title: None,
            release_date: None,
            year: None,
            overview: None,
            status: None,
            runtime: None,
            budget: None,
            revenue: None,
            popularity: None,
            vote_average: None,
            vote_count: None,
            genres: Vec::new(),
            cast: Vec::new(),
            omdb: None,
            metacritic: None,
            rotten_tomatoes: None,
            data_sources: BTreeSet::from([SourceName::Tmdb]),
            year_mismatches: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The cross-source join key, validated against the `tt` id format.
    /// Returns None for absent or malformed ids.
    pub fn join_key(&self) -> Option<&str> {
        self.imdb_id
            .as_deref()
            .filter(|id| IMDB_ID_RE.is_match(id))
    }

    /// Merge one source's block into the record. Re-applying the same source
    /// overwrites that block without touching any other source's block.
    pub fn apply(&mut self, enrichment: Enrichment) {
        let source = enrichment.source();
        match enrichment {
            Enrichment::Omdb(block) => self.omdb = Some(block),
            Enrichment::Metacritic(block) => self.metacritic = Some(block),
            Enrichment::RottenTomatoes(block) => self.rotten_tomatoes = Some(block),
        }
        self.data_sources.insert(source);
        self.updated_at = Utc::now();
    }

    /// Record that a source resolved a conflicting release year
    pub fn flag_year_mismatch(&mut self, source: SourceName) {
        if !self.year_mismatches.contains(&source) {
            self.year_mismatches.push(source);
        }
        self.updated_at = Utc::now();
    }

    pub fn has_any_enrichment(&self) -> bool {
        self.omdb.is_some() || self.metacritic.is_some() || self.rotten_tomatoes.is_some()
    }

    /// Whether a source-reported year agrees with ours within `tolerance`.
    /// A record with no year of its own accepts any reported year.
    pub fn year_matches(&self, reported: i32, tolerance: i32) -> bool {
        match self.year {
            Some(year) => (year - reported).abs() <= tolerance,
            None => true,
        }
    }
}

/// Core trait that every enrichment source adapter implements
#[async_trait::async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Which source this adapter speaks for
    fn source_name(&self) -> SourceName;

    /// Look up enrichment data for one movie. `NotFound` and `ParseFailure`
    /// are valid empty results, not batch-fatal errors.
    async fn fetch_one(
        &self,
        movie: &MovieRecord,
    ) -> std::result::Result<Enrichment, crate::error::AdapterError>;
}
