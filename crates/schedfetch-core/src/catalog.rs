use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::output::is_plain_filename;

/// One unit of work: a subject and the file its table is written to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TopicDefinition {
    pub name: String,
    pub filename: String,
}

impl TopicDefinition {
    pub fn new(name: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
        }
    }
}

/// On-disk shape of the catalog file.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    sports: Vec<TopicDefinition>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("topic catalog not found at {}", .path.display())]
    Missing { path: PathBuf },
    #[error("failed to read topic catalog {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("topic catalog is not a valid {{\"sports\": [...]}} document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("topic entry {position} has an empty \"{field}\"")]
    MissingField {
        position: usize,
        field: &'static str,
    },
    #[error("topic entry {position} ({name}) has an unsafe filename {filename:?}")]
    UnsafeFilename {
        position: usize,
        name: String,
        filename: String,
    },
}

/// Ordered topic list, read once per run. Order is processing order.
#[derive(Debug, Clone)]
pub struct TopicCatalog {
    topics: Vec<TopicDefinition>,
    warnings: Vec<String>,
}

impl TopicCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                CatalogError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                CatalogError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        let mut topics = Vec::with_capacity(file.sports.len());
        for (index, topic) in file.sports.into_iter().enumerate() {
            topics.push(validate(index + 1, topic)?);
        }

        let warnings = collect_warnings(&topics);
        Ok(Self { topics, warnings })
    }

    pub fn from_topics(topics: Vec<TopicDefinition>) -> Self {
        let warnings = collect_warnings(&topics);
        Self { topics, warnings }
    }

    pub fn topics(&self) -> &[TopicDefinition] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Non-fatal findings such as duplicate filenames.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Flag topics whose output would be replaced by the aggregate file.
    /// Returns the warnings added.
    pub fn check_reserved_filename(&mut self, aggregate_filename: &str) -> &[String] {
        let before = self.warnings.len();
        for topic in &self.topics {
            if topic.filename == aggregate_filename {
                self.warnings.push(format!(
                    "Topic '{}' writes '{}', which the aggregate step overwrites",
                    topic.name, topic.filename
                ));
            }
        }
        &self.warnings[before..]
    }
}

fn validate(position: usize, topic: TopicDefinition) -> Result<TopicDefinition, CatalogError> {
    let name = topic.name.trim();
    let filename = topic.filename.trim();
    if name.is_empty() {
        return Err(CatalogError::MissingField {
            position,
            field: "name",
        });
    }
    if filename.is_empty() {
        return Err(CatalogError::MissingField {
            position,
            field: "filename",
        });
    }
    if !is_plain_filename(filename) {
        return Err(CatalogError::UnsafeFilename {
            position,
            name: name.to_string(),
            filename: filename.to_string(),
        });
    }
    Ok(TopicDefinition::new(name, filename))
}

fn collect_warnings(topics: &[TopicDefinition]) -> Vec<String> {
    let mut warnings = Vec::new();
    if topics.is_empty() {
        warnings.push("Topic catalog is empty; nothing will be fetched".to_string());
    }

    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for topic in topics {
        if !seen.insert(topic.filename.as_str()) && reported.insert(topic.filename.as_str()) {
            warnings.push(format!(
                "Filename '{}' is used by more than one topic; later topics overwrite earlier output",
                topic.filename
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SIX_SPORTS: &str = r#"{
        "sports": [
            {"name": "Football", "filename": "Football.csv"},
            {"name": "Volleyball", "filename": "Volleyball.csv"},
            {"name": "Men's Basketball", "filename": "MensBasketball.csv"},
            {"name": "Women's Basketball", "filename": "WomensBasketball.csv"},
            {"name": "Softball", "filename": "Softball.csv"},
            {"name": "Baseball", "filename": "Baseball.csv"}
        ]
    }"#;

    #[test]
    fn preserves_declaration_order() {
        let catalog = TopicCatalog::from_json(SIX_SPORTS).expect("parses");
        let names: Vec<&str> = catalog.topics().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Football",
                "Volleyball",
                "Men's Basketball",
                "Women's Basketball",
                "Softball",
                "Baseball"
            ]
        );
        assert_eq!(catalog.len(), 6);
        assert!(catalog.warnings().is_empty());
    }

    #[test]
    fn load_reports_missing_file() {
        let temp = tempdir().expect("tempdir");
        let err = TopicCatalog::load(&temp.path().join("sports.json")).expect_err("missing");
        assert!(matches!(err, CatalogError::Missing { .. }));
    }

    #[test]
    fn load_reads_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("sports.json");
        fs::write(&path, SIX_SPORTS).expect("write fixture");
        let catalog = TopicCatalog::load(&path).expect("loads");
        assert_eq!(
            catalog.topics()[2],
            TopicDefinition::new("Men's Basketball", "MensBasketball.csv")
        );
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = TopicCatalog::from_json("{\"sports\": [").expect_err("malformed");
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn missing_sports_array_is_rejected() {
        for raw in [r#"{"topics": []}"#, r#"{"sports": {}}"#, r#"{"sports": [42]}"#] {
            let err = TopicCatalog::from_json(raw).expect_err(raw);
            assert!(matches!(err, CatalogError::Parse(_)), "{raw}");
        }
    }

    #[test]
    fn entry_without_filename_is_rejected() {
        let raw = r#"{"sports": [{"name": "Football", "filename": "Football.csv"}, {"name": "Golf"}]}"#;
        let err = TopicCatalog::from_json(raw).expect_err("missing filename");
        assert!(matches!(err, CatalogError::Parse(_)));
        assert!(err.to_string().contains("filename"), "{err}");
    }

    #[test]
    fn entry_with_blank_filename_is_rejected() {
        let raw = r#"{"sports": [{"name": "Football", "filename": "Football.csv"}, {"name": "Golf", "filename": " "}]}"#;
        let err = TopicCatalog::from_json(raw).expect_err("blank filename");
        assert!(matches!(
            err,
            CatalogError::MissingField {
                position: 2,
                field: "filename"
            }
        ));
    }

    #[test]
    fn extra_entry_keys_are_ignored() {
        let raw = r#"{"sports": [{"name": " Football ", "filename": "Football.csv", "season": 2025}]}"#;
        let catalog = TopicCatalog::from_json(raw).expect("parses");
        assert_eq!(catalog.topics()[0], TopicDefinition::new("Football", "Football.csv"));
    }

    #[test]
    fn entry_with_blank_name_is_rejected() {
        let raw = r#"{"sports": [{"name": "  ", "filename": "x.csv"}]}"#;
        let err = TopicCatalog::from_json(raw).expect_err("blank name");
        assert!(matches!(
            err,
            CatalogError::MissingField {
                position: 1,
                field: "name"
            }
        ));
    }

    #[test]
    fn path_like_filenames_are_rejected() {
        let raw = r#"{"sports": [{"name": "Football", "filename": "../Football.csv"}]}"#;
        let err = TopicCatalog::from_json(raw).expect_err("escapes output dir");
        assert!(matches!(err, CatalogError::UnsafeFilename { position: 1, .. }));
    }

    #[test]
    fn duplicate_filenames_are_kept_and_flagged() {
        let raw = r#"{"sports": [
            {"name": "Football", "filename": "Shared.csv"},
            {"name": "Baseball", "filename": "Shared.csv"},
            {"name": "Softball", "filename": "Shared.csv"}
        ]}"#;
        let catalog = TopicCatalog::from_json(raw).expect("duplicates are allowed");
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.warnings().len(), 1);
        assert!(catalog.warnings()[0].contains("Shared.csv"));
    }

    #[test]
    fn topic_colliding_with_aggregate_file_is_flagged() {
        let raw = r#"{"sports": [
            {"name": "Football", "filename": "Football.csv"},
            {"name": "Summary", "filename": "index.html"}
        ]}"#;
        let mut catalog = TopicCatalog::from_json(raw).expect("parses");

        let added = catalog.check_reserved_filename("index.html").to_vec();

        assert_eq!(added.len(), 1);
        assert!(added[0].contains("Summary"));
        assert_eq!(catalog.warnings(), added.as_slice());
        assert!(catalog.check_reserved_filename("schedules.html").is_empty());
    }

    #[test]
    fn empty_catalog_loads_with_warning() {
        let catalog = TopicCatalog::from_json(r#"{"sports": []}"#).expect("empty is allowed");
        assert!(catalog.is_empty());
        assert!(catalog.warnings()[0].contains("empty"));
    }
}
