use clap::{Parser, Subcommand};
use movielake::apis::metacritic::MetacriticScraper;
use movielake::apis::omdb::OmdbClient;
use movielake::apis::rotten_tomatoes::RottenTomatoesScraper;
use movielake::apis::tmdb::TmdbClient;
use movielake::config::Config;
use movielake::constants;
use movielake::error::Result;
use movielake::loader::{BulkLoader, MemorySink, TableSink, TrinoSink};
use movielake::pipeline::{EnhancementReport, Enhancer};
use movielake::staging::StageWriter;
use movielake::types::{EnrichmentSource, MovieRecord, SourceName};
use movielake::{error::PipelineError, logging};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "movielake")]
#[command(about = "Movie ratings data pipeline: TMDB ingestion, multi-source enhancement, lakehouse loading")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the TMDB top-rated listing and stage it as raw JSON
    Ingest {
        /// Listing pages to fetch (20 movies per page)
        #[arg(long)]
        pages: Option<u32>,
        /// Skip the per-movie detail fetch (faster, no imdb_id/cast)
        #[arg(long)]
        skip_details: bool,
    },
    /// Enhance the newest staged batch with ratings sources and restage it
    Enhance {
        /// Sources to run (comma-separated). Available: omdb, metacritic, rotten_tomatoes
        #[arg(long)]
        sources: Option<String>,
    },
    /// Bulk-load staged enhanced batches into the destination tables
    Load {
        /// Project and batch rows without touching Trino
        #[arg(long)]
        dry_run: bool,
    },
    /// Run ingest, enhance, and load sequentially
    Run {
        /// Listing pages to fetch (20 movies per page)
        #[arg(long)]
        pages: Option<u32>,
        /// Sources to run (comma-separated)
        #[arg(long)]
        sources: Option<String>,
        /// Project and batch rows without touching Trino
        #[arg(long)]
        dry_run: bool,
    },
}

fn create_source(
    name: SourceName,
    config: &Config,
) -> Result<Option<Box<dyn EnrichmentSource>>> {
    let source: Box<dyn EnrichmentSource> = match name {
        SourceName::Omdb => Box::new(OmdbClient::new(config)?),
        SourceName::Metacritic => {
            if !config.scraping.metacritic_enabled {
                return Ok(None);
            }
            Box::new(MetacriticScraper::new(config)?)
        }
        SourceName::RottenTomatoes => {
            if !config.scraping.rotten_tomatoes_enabled {
                return Ok(None);
            }
            Box::new(RottenTomatoesScraper::new(config)?)
        }
        SourceName::Tmdb => return Ok(None),
    };
    Ok(Some(source))
}

/// Resolve a comma-separated source list, or the full priority order when
/// none was given. Sources always run in the fixed priority order no matter
/// how the flag was written.
fn resolve_sources(requested: Option<&str>) -> Result<Vec<SourceName>> {
    match requested {
        None => Ok(SourceName::ENRICHMENT_ORDER.to_vec()),
        Some(list) => {
            let mut sources: Vec<SourceName> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    SourceName::parse(s).ok_or_else(|| {
                        PipelineError::Config(format!(
                            "Unknown source '{}'. Available: {}",
                            s,
                            constants::get_supported_sources().join(", ")
                        ))
                    })
                })
                .collect::<Result<_>>()?;
            sources.sort_by_key(|source| {
                SourceName::ENRICHMENT_ORDER
                    .iter()
                    .position(|order| order == source)
            });
            sources.dedup();
            Ok(sources)
        }
    }
}

async fn run_ingest(
    config: &Config,
    pages: Option<u32>,
    skip_details: bool,
) -> Result<Vec<MovieRecord>> {
    let max_pages = pages.unwrap_or(config.tmdb.max_pages);
    let include_details = config.tmdb.include_details && !skip_details;

    let tmdb = TmdbClient::connect(config).await?;
    let movies = tmdb
        .fetch_top_rated(max_pages, config.tmdb.max_movies, include_details)
        .await?;

    let writer = StageWriter::new(&config.staging.dir);
    let path = writer.write(&movies, constants::RAW_STAGE_LABEL, chrono::Utc::now())?;

    println!("\n📊 Ingestion Results:");
    println!("   Movies fetched: {}", movies.len());
    println!("   Staged to: {}", path.display());
    Ok(movies)
}

async fn run_enhance(
    config: &Config,
    requested: Option<&str>,
    movies: Option<Vec<MovieRecord>>,
) -> Result<()> {
    let mut batch = match movies {
        Some(movies) => movies,
        None => load_latest_raw_batch(config)?,
    };

    let mut sources: Vec<Box<dyn EnrichmentSource>> = Vec::new();
    for name in resolve_sources(requested)? {
        match create_source(name, config)? {
            Some(source) => sources.push(source),
            None => info!(source = %name, "Source disabled, skipping"),
        }
    }
    if sources.is_empty() {
        return Err(PipelineError::Config(
            "No enrichment sources enabled".to_string(),
        ));
    }

    let enhancer = Enhancer::new(sources, config.enhancement.progress_interval);
    let report = enhancer.enhance(&mut batch).await;

    let writer = StageWriter::new(&config.staging.dir);
    let path = writer.write(&batch, constants::ENHANCED_STAGE_LABEL, chrono::Utc::now())?;

    print_enhancement_report(&report);
    println!("   Staged to: {}", path.display());
    Ok(())
}

fn load_latest_raw_batch(config: &Config) -> Result<Vec<MovieRecord>> {
    let writer = StageWriter::new(&config.staging.dir);
    let staged = writer.list_staged(constants::RAW_STAGE_LABEL)?;
    let latest = staged.last().ok_or_else(|| {
        PipelineError::Config(format!(
            "No staged '{}' batches found in {}; run ingest first",
            constants::RAW_STAGE_LABEL,
            config.staging.dir
        ))
    })?;
    info!("Enhancing newest staged batch: {}", latest.display());
    let content = std::fs::read_to_string(latest)?;
    Ok(serde_json::from_str(&content)?)
}

fn print_enhancement_report(report: &EnhancementReport) {
    println!("\n📊 Enhancement Results:");
    println!("   Movies processed: {}", report.processed);
    for (source, tally) in &report.tallies {
        println!(
            "   {}: {}/{} enriched, {} not found, {} year mismatches, {} errors",
            source,
            tally.succeeded,
            tally.attempted,
            tally.not_found,
            tally.year_mismatches,
            tally.failed
        );
    }
    if !report.unenriched.is_empty() {
        println!(
            "   ⚠️  {} movies received no enrichment at all",
            report.unenriched.len()
        );
    }
}

async fn run_load(config: &Config, dry_run: bool) -> Result<()> {
    let writer = StageWriter::new(&config.staging.dir);
    let files = writer.list_staged(constants::ENHANCED_STAGE_LABEL)?;
    if files.is_empty() {
        return Err(PipelineError::Config(format!(
            "No staged '{}' batches found in {}; run enhance first",
            constants::ENHANCED_STAGE_LABEL,
            config.staging.dir
        )));
    }

    let sink: Arc<dyn TableSink> = if dry_run {
        println!("🧪 Dry run: projecting into an in-memory sink");
        Arc::new(MemorySink::new())
    } else {
        Arc::new(TrinoSink::new(&config.trino)?)
    };

    let loader = BulkLoader::new(sink, config.trino.batch_size);
    let report = loader.load(&files).await?;

    println!("\n📊 Load Results:");
    println!("   Files loaded: {}", report.files_loaded);
    println!("   Records loaded: {}", report.records_loaded);
    println!("   Malformed records skipped: {}", report.records_malformed);
    for (table, rows) in &report.rows_per_table {
        println!("   {table}: {rows} rows written");
    }
    if !report.failed_files.is_empty() {
        println!("\n⚠️  Unreadable files skipped:");
        for (path, reason) in &report.failed_files {
            println!("   - {}: {}", path.display(), reason);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;

    let outcome = match cli.command {
        Commands::Ingest {
            pages,
            skip_details,
        } => {
            println!("📥 Running TMDB ingestion...");
            run_ingest(&config, pages, skip_details).await.map(|_| ())
        }
        Commands::Enhance { sources } => {
            println!("✨ Running enhancement...");
            run_enhance(&config, sources.as_deref(), None).await
        }
        Commands::Load { dry_run } => {
            println!("📤 Running bulk load...");
            run_load(&config, dry_run).await
        }
        Commands::Run {
            pages,
            sources,
            dry_run,
        } => {
            println!("🚀 Running full pipeline (ingest + enhance + load)...");
            run_full(&config, pages, sources.as_deref(), dry_run).await
        }
    };

    if let Err(e) = outcome {
        error!("Pipeline failed: {e}");
        println!("❌ {e}");
        std::process::exit(1);
    }
    println!("\n✅ Done");
    Ok(())
}

async fn run_full(
    config: &Config,
    pages: Option<u32>,
    sources: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    println!("\n📥 Step 1: Ingesting from TMDB...");
    let movies = run_ingest(config, pages, false).await?;

    println!("\n✨ Step 2: Enhancing with ratings sources...");
    run_enhance(config, sources, Some(movies)).await?;

    println!("\n📤 Step 3: Loading into the lakehouse...");
    run_load(config, dry_run).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_source_set_is_the_full_priority_order() {
        assert_eq!(
            resolve_sources(None).unwrap(),
            SourceName::ENRICHMENT_ORDER.to_vec()
        );
    }

    #[test]
    fn requested_sources_are_normalized_to_priority_order() {
        assert_eq!(
            resolve_sources(Some("rotten_tomatoes, omdb")).unwrap(),
            vec![SourceName::Omdb, SourceName::RottenTomatoes]
        );
        assert_eq!(
            resolve_sources(Some("omdb,omdb, metacritic")).unwrap(),
            vec![SourceName::Omdb, SourceName::Metacritic]
        );
    }

    #[test]
    fn unknown_source_is_a_config_error() {
        assert!(resolve_sources(Some("imdb")).is_err());
    }
}
