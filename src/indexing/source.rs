//! Read-only enumeration interface over the content corpus.
//!
//! Course/lesson/FAQ/announcement storage is an external collaborator; the
//! indexer only needs to enumerate published objects of a given type. The
//! bundled [`JsonContentSource`] reads a flat JSON file, which is what the
//! administrative CLI feeds from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::types::SourceType;

/// One published source object, ready for chunking and embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceRecord {
    pub id: String,
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("content source unavailable: {0}")]
    Unavailable(String),
    #[error("content source data invalid: {0}")]
    Invalid(String),
}

/// Enumerates published content of one type.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn list_published(&self, kind: SourceType) -> Result<Vec<SourceRecord>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    id: String,
    text: String,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentFile {
    #[serde(default)]
    courses: Vec<RawRecord>,
    #[serde(default)]
    lessons: Vec<RawRecord>,
    #[serde(default)]
    faqs: Vec<RawRecord>,
    #[serde(default)]
    announcements: Vec<RawRecord>,
}

/// File-backed [`ContentSource`] for the administrative CLI.
///
/// The file is a JSON object with optional `courses`, `lessons`, `faqs`, and
/// `announcements` arrays of `{id, text, updated_at?}` records; a missing
/// `updated_at` defaults to load time.
pub struct JsonContentSource {
    records: FxHashMap<SourceType, Vec<SourceRecord>>,
}

impl JsonContentSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|err| SourceError::Unavailable(err.to_string()))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SourceError> {
        let file: ContentFile =
            serde_json::from_str(raw).map_err(|err| SourceError::Invalid(err.to_string()))?;
        let loaded_at = Utc::now();
        let convert = |records: Vec<RawRecord>| -> Vec<SourceRecord> {
            records
                .into_iter()
                .map(|r| SourceRecord {
                    id: r.id,
                    text: r.text,
                    updated_at: r.updated_at.unwrap_or(loaded_at),
                })
                .collect()
        };
        let mut records = FxHashMap::default();
        records.insert(SourceType::Course, convert(file.courses));
        records.insert(SourceType::Lesson, convert(file.lessons));
        records.insert(SourceType::Faq, convert(file.faqs));
        records.insert(SourceType::Announcement, convert(file.announcements));
        Ok(Self { records })
    }
}

#[async_trait]
impl ContentSource for JsonContentSource {
    async fn list_published(&self, kind: SourceType) -> Result<Vec<SourceRecord>, SourceError> {
        Ok(self.records.get(&kind).cloned().unwrap_or_default())
    }
}
