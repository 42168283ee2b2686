//! Source documents on disk.
//!
//! The scraper output is laid out as one hierarchy index file, a directory of
//! per-domain enrichment documents (`<object_id>.json`) and a directory of
//! OpenAPI specification files. Files are read whole and handed to the
//! loaders as text; parsing is the loaders' business so that a malformed file
//! becomes a per-record error rather than an I/O failure.
//!
//! A directory file that cannot be read or is not UTF-8 is kept aside as a
//! [`RecordError`] of the stage that would have consumed it. Only the index
//! file is fatal, since nothing can be loaded without it.

use crate::ingest::error::{IngestError, RecordError, RecordErrorKind, Stage};
use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const ENRICHMENT_EXTENSIONS: [&str; 1] = ["json"];
const SPECIFICATION_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// One source file read into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// File name, used in reports
    pub name: String,
    /// File name without extension
    pub stem: String,
    pub contents: String,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let name = name.into();
        let stem = Path::new(&name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&name)
            .to_string();
        Self {
            name,
            stem,
            contents: contents.into(),
        }
    }

    async fn read(path: &Path) -> Result<Self, RecordErrorKind> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RecordErrorKind::Io(e.to_string()))?;
        let contents = String::from_utf8(bytes)
            .map_err(|e| RecordErrorKind::Parse(format!("not valid UTF-8: {}", e.utf8_error())))?;
        Ok(Self::new(file_name(path), contents))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Where the scraper output lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocations {
    pub hierarchy_file: PathBuf,
    pub service_domains_dir: PathBuf,
    pub specifications_dir: PathBuf,
}

/// Everything one pipeline run consumes
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    /// None when the index file does not exist; the pipeline refuses to run
    pub hierarchy: Option<SourceDocument>,
    pub domains: Vec<SourceDocument>,
    pub specifications: Vec<SourceDocument>,
    /// Directory files that could not be read, tagged with their stage
    pub unreadable: Vec<RecordError>,
}

impl PipelineInputs {
    /// Read all sources. Missing directories yield no documents.
    ///
    /// Fails only when the index file exists but cannot be read as text.
    pub async fn load(locations: &SourceLocations) -> Result<Self> {
        let hierarchy = if locations.hierarchy_file.is_file() {
            let document = SourceDocument::read(&locations.hierarchy_file)
                .await
                .map_err(|kind| IngestError::MalformedRoot {
                    source_name: locations.hierarchy_file.display().to_string(),
                    detail: kind.to_string(),
                })?;
            Some(document)
        } else {
            tracing::warn!(
                "Hierarchy index not found at {}",
                locations.hierarchy_file.display()
            );
            None
        };

        let mut unreadable = Vec::new();
        let domains = read_directory(
            &locations.service_domains_dir,
            &ENRICHMENT_EXTENSIONS,
            Stage::Enrichment,
            &mut unreadable,
        )
        .await;
        let specifications = read_directory(
            &locations.specifications_dir,
            &SPECIFICATION_EXTENSIONS,
            Stage::Specification,
            &mut unreadable,
        )
        .await;

        tracing::info!(
            "Loaded sources: hierarchy={}, {} domain documents, {} specifications, {} unreadable",
            hierarchy.is_some(),
            domains.len(),
            specifications.len(),
            unreadable.len()
        );

        Ok(Self {
            hierarchy,
            domains,
            specifications,
            unreadable,
        })
    }

    /// Unreadable files that belong to `stage`
    pub fn unreadable_for(&self, stage: Stage) -> impl Iterator<Item = &RecordError> {
        self.unreadable.iter().filter(move |e| e.stage == stage)
    }
}

/// List files with one of `extensions` directly under `dir`, sorted by name
pub fn list_files(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    files.sort();
    files
}

async fn read_directory(
    dir: &Path,
    extensions: &[&str],
    stage: Stage,
    unreadable: &mut Vec<RecordError>,
) -> Vec<SourceDocument> {
    if !dir.is_dir() {
        tracing::warn!("Source directory {} not found, skipping", dir.display());
        return Vec::new();
    }

    let mut documents = Vec::new();
    for path in list_files(dir, extensions) {
        match SourceDocument::read(&path).await {
            Ok(document) => documents.push(document),
            Err(kind) => {
                let error = RecordError::new(stage, file_name(&path), kind);
                tracing::warn!("{}", error);
                unreadable.push(error);
            }
        }
    }
    documents
}
