use crate::error::StageWriteError;
use crate::types::MovieRecord;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Writes enriched batches to timestamped JSON files under the raw-data
/// directory. Files are immutable once written: a same-second rerun is a
/// collision error, and a crash mid-serialization leaves no truncated file
/// because everything goes through a temp path and an atomic rename.
pub struct StageWriter {
    dir: PathBuf,
}

impl StageWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Serialize `batch` to `{label}_{YYYYMMDD_HHMMSS}.json` and return the
    /// final path.
    #[instrument(skip(self, batch), fields(records = batch.len()))]
    pub fn write(
        &self,
        batch: &[MovieRecord],
        label: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf, StageWriteError> {
        fs::create_dir_all(&self.dir).map_err(|e| StageWriteError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let filename = format!("{label}_{}.json", timestamp.format("%Y%m%d_%H%M%S"));
        let final_path = self.dir.join(&filename);
        if final_path.exists() {
            return Err(StageWriteError::Collision(final_path));
        }

        let json = serde_json::to_vec_pretty(batch)?;

        let tmp_path = self.dir.join(format!("{filename}.tmp"));
        if let Err(e) = fs::write(&tmp_path, &json) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StageWriteError::Io {
                path: tmp_path,
                source: e,
            });
        }
        fs::rename(&tmp_path, &final_path).map_err(|e| StageWriteError::Io {
            path: final_path.clone(),
            source: e,
        })?;

        info!("Staged {} records to {}", batch.len(), final_path.display());
        Ok(final_path)
    }

    /// Staged files for a label, oldest first. The sortable timestamp in the
    /// filename makes lexicographic order chronological, which is the order
    /// the loader trusts for last-write-wins.
    pub fn list_staged(&self, label: &str) -> std::io::Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{label}_");
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().map_or(false, |ext| ext == "json")
                    && file_name_str(path).starts_with(&prefix)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

fn file_name_str(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MovieRecord;
    use chrono::TimeZone;

    fn batch() -> Vec<MovieRecord> {
        vec![MovieRecord::new(603, "The Matrix")]
    }

    fn ts(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, secs).unwrap()
    }

    #[test]
    fn writes_a_timestamped_file_and_cleans_up_the_temp_path() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StageWriter::new(dir.path());

        let path = writer.write(&batch(), "movies", ts(0)).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "movies_20240501_120000.json"
        );

        let content = fs::read_to_string(&path).unwrap();
        let records: Vec<MovieRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tmdb_id, 603);

        // No stray temp files left behind
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["movies_20240501_120000.json"]);
    }

    #[test]
    fn same_second_rerun_is_a_collision_not_an_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StageWriter::new(dir.path());

        writer.write(&batch(), "movies", ts(0)).unwrap();
        match writer.write(&batch(), "movies", ts(0)) {
            Err(StageWriteError::Collision(path)) => {
                assert!(path.ends_with("movies_20240501_120000.json"));
            }
            other => panic!("expected Collision, got {other:?}"),
        }

        // The original file survived untouched
        let content = fs::read_to_string(dir.path().join("movies_20240501_120000.json")).unwrap();
        assert!(!content.is_empty());
    }

    #[test]
    fn listing_returns_label_matches_in_chronological_order() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StageWriter::new(dir.path());

        writer.write(&batch(), "movies", ts(2)).unwrap();
        writer.write(&batch(), "movies", ts(1)).unwrap();
        writer.write(&batch(), "tmdb_movies", ts(1)).unwrap();

        let staged = writer.list_staged("movies").unwrap();
        let names: Vec<&str> = staged
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["movies_20240501_120001.json", "movies_20240501_120002.json"]
        );
    }

    #[test]
    fn listing_an_absent_directory_is_empty_not_an_error() {
        let writer = StageWriter::new("definitely/not/here");
        assert!(writer.list_staged("movies").unwrap().is_empty());
    }
}
