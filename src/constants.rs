/// Source and table name constants to ensure consistency across the codebase

// Source names as they appear in provenance and staged file labels
pub const TMDB_SOURCE: &str = "tmdb";
pub const OMDB_SOURCE: &str = "omdb";
pub const METACRITIC_SOURCE: &str = "metacritic";
pub const ROTTEN_TOMATOES_SOURCE: &str = "rotten_tomatoes";

// Staged file labels
pub const RAW_STAGE_LABEL: &str = "tmdb_movies";
pub const ENHANCED_STAGE_LABEL: &str = "movies";

// Destination tables in the movies_stage schema
pub const TMDB_MOVIES_TABLE: &str = "tmdb_movies";
pub const TMDB_GENRES_TABLE: &str = "tmdb_genres";
pub const TMDB_CAST_TABLE: &str = "tmdb_cast";
pub const OMDB_MOVIES_TABLE: &str = "omdb_movies";
pub const METACRITIC_RATINGS_TABLE: &str = "metacritic_ratings";
pub const ROTTEN_TOMATOES_RATINGS_TABLE: &str = "rotten_tomatoes_ratings";

/// Get all enrichment source names accepted by the CLI
pub fn get_supported_sources() -> Vec<&'static str> {
    vec![OMDB_SOURCE, METACRITIC_SOURCE, ROTTEN_TOMATOES_SOURCE]
}
