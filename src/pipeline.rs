use crate::error::AdapterError;
use crate::types::{EnrichmentSource, MovieRecord, SourceName};
use metrics::counter;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Per-source attempt accounting for one enhancement run
#[derive(Debug, Default, Clone, Serialize)]
pub struct SourceTally {
    pub attempted: usize,
    pub succeeded: usize,
    pub not_found: usize,
    pub year_mismatches: usize,
    pub failed: usize,
}

/// Summary of a completed enhancement run
#[derive(Debug, Serialize)]
pub struct EnhancementReport {
    /// Records processed, in upstream listing order
    pub processed: usize,
    pub tallies: BTreeMap<SourceName, SourceTally>,
    /// tmdb_ids of records that received zero enrichment
    pub unenriched: Vec<u64>,
}

impl EnhancementReport {
    pub fn tally(&self, source: SourceName) -> SourceTally {
        self.tallies.get(&source).cloned().unwrap_or_default()
    }
}

/// Sequential enhancement orchestrator. Walks the batch one movie at a time,
/// attempting each enabled source in the fixed priority order the caller
/// supplied. One source failing for one movie never aborts that movie's
/// remaining sources, let alone the batch.
pub struct Enhancer {
    sources: Vec<Box<dyn EnrichmentSource>>,
    progress_interval: usize,
}

impl Enhancer {
    pub fn new(sources: Vec<Box<dyn EnrichmentSource>>, progress_interval: usize) -> Self {
        Self {
            sources,
            progress_interval,
        }
    }

    #[instrument(skip(self, batch), fields(batch_size = batch.len()))]
    pub async fn enhance(&self, batch: &mut [MovieRecord]) -> EnhancementReport {
        info!(
            "Starting enhancement of {} records across {} sources",
            batch.len(),
            self.sources.len()
        );

        let mut tallies: BTreeMap<SourceName, SourceTally> = BTreeMap::new();
        let mut unenriched = Vec::new();
        let total = batch.len();

        for (i, movie) in batch.iter_mut().enumerate() {
            for source in &self.sources {
                let name = source.source_name();
                let tally = tallies.entry(name).or_default();
                tally.attempted += 1;
                counter!("movielake_enrichment_attempts_total", "source" => name.as_str())
                    .increment(1);

                match source.fetch_one(movie).await {
                    Ok(enrichment) => {
                        movie.apply(enrichment);
                        tally.succeeded += 1;
                        counter!("movielake_enrichment_success_total", "source" => name.as_str())
                            .increment(1);
                    }
                    Err(AdapterError::NotFound) => {
                        tally.not_found += 1;
                        debug!(source = %name, title = %movie.title, "No data for movie");
                    }
                    Err(AdapterError::ParseFailure(reason)) => {
                        // Markup drift is expected; treat as an empty result
                        tally.not_found += 1;
                        warn!(source = %name, title = %movie.title, reason, "Unrecognized page structure");
                    }
                    Err(AdapterError::YearMismatch { expected, found }) => {
                        movie.flag_year_mismatch(name);
                        tally.year_mismatches += 1;
                        warn!(
                            source = %name,
                            title = %movie.title,
                            expected,
                            found,
                            "Year mismatch, block withheld"
                        );
                    }
                    Err(AdapterError::Fetch(e)) => {
                        tally.failed += 1;
                        counter!("movielake_enrichment_errors_total", "source" => name.as_str())
                            .increment(1);
                        warn!(source = %name, title = %movie.title, error = %e, "Source fetch failed");
                    }
                }
            }

            if !movie.has_any_enrichment() {
                unenriched.push(movie.tmdb_id);
            }

            if self.progress_interval > 0 && (i + 1) % self.progress_interval == 0 {
                info!("Enhanced {}/{} records", i + 1, total);
                println!("   Enhanced {}/{} records", i + 1, total);
            }
        }

        info!(
            "Enhancement complete: {} records, {} with zero enrichment",
            total,
            unenriched.len()
        );

        EnhancementReport {
            processed: total,
            tallies,
            unenriched,
        }
    }
}
