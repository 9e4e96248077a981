use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::input::{validate_url, InputError};
use crate::models::detection::DetectionResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Upload,
    Url,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Upload => "upload",
            ImageKind::Url => "url",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(ImageKind::Upload),
            "url" => Some(ImageKind::Url),
            _ => None,
        }
    }
}

/// Where the analysed image came from.
/// Uploads may carry an opaque retained payload; URL submissions carry the URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub kind: ImageKind,
    pub payload_or_url: Option<String>,
}

/// What a client asks the store to persist. Ownership is never part of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    pub image_ref: ImageRef,
    pub result: DetectionResult,
}

impl RecordDraft {
    pub fn validate(&self) -> Result<(), InputError> {
        if !self.result.is_well_formed() {
            return Err(InputError::InvalidRecord(
                "probabilities must be within 0..=100 and processing time non-negative".into(),
            ));
        }
        match (self.image_ref.kind, self.image_ref.payload_or_url.as_deref()) {
            (ImageKind::Url, None) => Err(InputError::InvalidRecord("url image reference without a url".into())),
            (ImageKind::Url, Some(url)) => validate_url(url).map(|_| ()),
            (ImageKind::Upload, _) => Ok(()),
        }
    }
}

/// A persisted detection. Created once, never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub owner_id: String,
    pub owner_email: String,
    pub owner_display_name: String,
    pub image_ref: ImageRef,
    pub result: DetectionResult,
    pub created_at: DateTime<Utc>,
}

/// One page of an owner's history, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub records: Vec<HistoryRecord>,
    pub total: u64,
    pub limit: u64,
    pub skip: u64,
}

impl HistoryPage {
    pub fn new(records: Vec<HistoryRecord>, total: u64, limit: u64, skip: u64) -> Self {
        Self { records, total, limit, skip }
    }

    pub fn has_more(&self) -> bool {
        self.total > self.skip + self.limit
    }

    pub fn pagination(&self) -> Pagination {
        Pagination {
            total: self.total,
            limit: self.limit,
            skip: self.skip,
            has_more: self.has_more(),
        }
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    /// Drop a record and decrement the total. Returns false if it was not on this page.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.records.remove(idx);
                self.total = self.total.saturating_sub(1);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub limit: u64,
    pub skip: u64,
    pub has_more: bool,
}
