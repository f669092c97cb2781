//! Projection of staged records into per-table row batches. Nested arrays
//! (genres, cast) flatten into join tables keyed back to tmdb_id; enrichment
//! blocks project only for records that actually carry them.

use crate::constants;
use crate::loader::sql::SqlValue;
use crate::types::{MovieRecord, ScoreBlock};
use std::collections::BTreeSet;

/// Static description of one destination table
#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    /// Columns forming the overwrite key; every key column is also in
    /// `columns`
    pub keys: &'static [&'static str],
}

impl TableSchema {
    pub fn key_indices(&self) -> Vec<usize> {
        self.keys
            .iter()
            .map(|key| {
                self.columns
                    .iter()
                    .position(|c| c == key)
                    .expect("key column missing from column list")
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Row(pub Vec<SqlValue>);

#[derive(Debug)]
pub struct TableBatch {
    pub schema: &'static TableSchema,
    pub rows: Vec<Row>,
}

pub static TMDB_MOVIES: TableSchema = TableSchema {
    name: constants::TMDB_MOVIES_TABLE,
    columns: &[
        "tmdb_id",
        "imdb_id",
        "title",
        "original_title",
        "release_date",
        "release_year",
        "overview",
        "status",
        "runtime_minutes",
        "budget",
        "revenue",
        "popularity",
        "vote_average",
        "vote_count",
        "created_at",
        "updated_at",
    ],
    keys: &["tmdb_id"],
};

pub static TMDB_GENRES: TableSchema = TableSchema {
    name: constants::TMDB_GENRES_TABLE,
    columns: &["tmdb_id", "imdb_id", "genre"],
    keys: &["tmdb_id", "genre"],
};

pub static TMDB_CAST: TableSchema = TableSchema {
    name: constants::TMDB_CAST_TABLE,
    columns: &["tmdb_id", "imdb_id", "actor_name", "character_name", "cast_order"],
    keys: &["tmdb_id", "cast_order"],
};

pub static OMDB_MOVIES: TableSchema = TableSchema {
    name: constants::OMDB_MOVIES_TABLE,
    columns: &[
        "tmdb_id",
        "imdb_id",
        "title",
        "release_year",
        "imdb_rating",
        "imdb_votes",
        "metascore",
        "box_office",
        "awards",
        "plot",
        "updated_at",
    ],
    keys: &["tmdb_id"],
};

pub static METACRITIC_RATINGS: TableSchema = TableSchema {
    name: constants::METACRITIC_RATINGS_TABLE,
    columns: &RATING_COLUMNS,
    keys: &["tmdb_id"],
};

pub static ROTTEN_TOMATOES_RATINGS: TableSchema = TableSchema {
    name: constants::ROTTEN_TOMATOES_RATINGS_TABLE,
    columns: &RATING_COLUMNS,
    keys: &["tmdb_id"],
};

const RATING_COLUMNS: [&str; 9] = [
    "tmdb_id",
    "imdb_id",
    "title",
    "release_year",
    "critic_score",
    "critic_count",
    "user_score",
    "user_count",
    "updated_at",
];

pub static ALL_TABLES: [&TableSchema; 6] = [
    &TMDB_MOVIES,
    &TMDB_GENRES,
    &TMDB_CAST,
    &OMDB_MOVIES,
    &METACRITIC_RATINGS,
    &ROTTEN_TOMATOES_RATINGS,
];

/// Project a batch of records into one TableBatch per destination table.
/// Tables with no rows for this batch are omitted.
pub fn project_batch(records: &[MovieRecord]) -> Vec<TableBatch> {
    let mut movies = Vec::new();
    let mut genres = Vec::new();
    let mut cast = Vec::new();
    let mut omdb = Vec::new();
    let mut metacritic = Vec::new();
    let mut rotten_tomatoes = Vec::new();

    for record in records {
        let imdb_id: SqlValue = record.join_key().into();
        movies.push(movie_row(record, &imdb_id));

        // Dedup genres per record so the composite key holds
        let unique: BTreeSet<&str> = record.genres.iter().map(String::as_str).collect();
        for genre in unique {
            genres.push(Row(vec![
                record.tmdb_id.into(),
                imdb_id.clone(),
                genre.into(),
            ]));
        }

        for member in &record.cast {
            cast.push(Row(vec![
                record.tmdb_id.into(),
                imdb_id.clone(),
                member.name.as_str().into(),
                member.character.clone().into(),
                member.order.into(),
            ]));
        }

        let updated_at: SqlValue = record.updated_at.to_rfc3339().into();
        if let Some(block) = &record.omdb {
            omdb.push(Row(vec![
                record.tmdb_id.into(),
                imdb_id.clone(),
                record.title.as_str().into(),
                record.year.into(),
                block.imdb_rating.into(),
                block.imdb_votes.into(),
                block.metascore.into(),
                block.box_office.clone().into(),
                block.awards.clone().into(),
                block.plot.clone().into(),
                updated_at.clone(),
            ]));
        }
        if let Some(block) = &record.metacritic {
            metacritic.push(rating_row(record, &imdb_id, block, &updated_at));
        }
        if let Some(block) = &record.rotten_tomatoes {
            rotten_tomatoes.push(rating_row(record, &imdb_id, block, &updated_at));
        }
    }

    let batches = [
        (&TMDB_MOVIES, movies),
        (&TMDB_GENRES, genres),
        (&TMDB_CAST, cast),
        (&OMDB_MOVIES, omdb),
        (&METACRITIC_RATINGS, metacritic),
        (&ROTTEN_TOMATOES_RATINGS, rotten_tomatoes),
    ];
    batches
        .into_iter()
        .filter(|(_, rows)| !rows.is_empty())
        .map(|(schema, rows)| TableBatch { schema, rows })
        .collect()
}

fn movie_row(record: &MovieRecord, imdb_id: &SqlValue) -> Row {
    Row(vec![
        record.tmdb_id.into(),
        imdb_id.clone(),
        record.title.as_str().into(),
        record.original_title.clone().into(),
        record
            .release_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .into(),
        record.year.into(),
        record.overview.clone().into(),
        record.status.clone().into(),
        record.runtime.into(),
        record.budget.into(),
        record.revenue.into(),
        record.popularity.into(),
        record.vote_average.into(),
        record.vote_count.into(),
        record.created_at.to_rfc3339().into(),
        record.updated_at.to_rfc3339().into(),
    ])
}

fn rating_row(
    record: &MovieRecord,
    imdb_id: &SqlValue,
    block: &ScoreBlock,
    updated_at: &SqlValue,
) -> Row {
    Row(vec![
        record.tmdb_id.into(),
        imdb_id.clone(),
        record.title.as_str().into(),
        record.year.into(),
        block.critic_score.into(),
        block.critic_count.into(),
        block.user_score.into(),
        block.user_count.into(),
        updated_at.clone(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CastMember, Enrichment, OmdbBlock};

    fn record() -> MovieRecord {
        let mut m = MovieRecord::new(603, "The Matrix");
        m.imdb_id = Some("tt0133093".to_string());
        m.year = Some(1999);
        m.genres = vec![
            "Action".to_string(),
            "Science Fiction".to_string(),
            "Action".to_string(),
        ];
        m.cast = vec![
            CastMember {
                name: "Keanu Reeves".to_string(),
                character: Some("Neo".to_string()),
                order: 0,
            },
            CastMember {
                name: "Carrie-Anne Moss".to_string(),
                character: None,
                order: 1,
            },
        ];
        m
    }

    fn batch_for<'a>(batches: &'a [TableBatch], table: &str) -> Option<&'a TableBatch> {
        batches.iter().find(|b| b.schema.name == table)
    }

    #[test]
    fn every_schema_key_is_a_column() {
        for schema in ALL_TABLES {
            // panics if a key column is missing
            let indices = schema.key_indices();
            assert_eq!(indices.len(), schema.keys.len(), "{}", schema.name);
        }
    }

    #[test]
    fn arrays_flatten_into_join_tables_with_deduped_keys() {
        let batches = project_batch(&[record()]);

        let genres = batch_for(&batches, "tmdb_genres").unwrap();
        assert_eq!(genres.rows.len(), 2, "duplicate genre should collapse");
        assert!(genres
            .rows
            .iter()
            .all(|r| r.0[0] == SqlValue::Int(603) && r.0[1] == SqlValue::from("tt0133093")));

        let cast = batch_for(&batches, "tmdb_cast").unwrap();
        assert_eq!(cast.rows.len(), 2);
        assert_eq!(cast.rows[0].0[2], SqlValue::from("Keanu Reeves"));
        assert_eq!(cast.rows[1].0[3], SqlValue::Null, "missing character is NULL");
    }

    #[test]
    fn enrichment_tables_only_get_rows_for_enriched_records() {
        let mut enriched = record();
        enriched.apply(Enrichment::Omdb(OmdbBlock {
            imdb_rating: Some(8.7),
            ..Default::default()
        }));
        let plain = MovieRecord::new(604, "The Matrix Reloaded");

        let batches = project_batch(&[enriched, plain]);
        assert_eq!(batch_for(&batches, "tmdb_movies").unwrap().rows.len(), 2);
        assert_eq!(batch_for(&batches, "omdb_movies").unwrap().rows.len(), 1);
        assert!(batch_for(&batches, "metacritic_ratings").is_none());
        assert!(batch_for(&batches, "rotten_tomatoes_ratings").is_none());
    }

    #[test]
    fn malformed_imdb_id_projects_as_null_join_key() {
        let mut m = record();
        m.imdb_id = Some("not-an-id".to_string());
        let batches = project_batch(&[m]);
        let movies = batch_for(&batches, "tmdb_movies").unwrap();
        assert_eq!(movies.rows[0].0[1], SqlValue::Null);
    }
}
