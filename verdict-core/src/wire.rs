//! JSON bodies exchanged between the daemon and its clients.

use serde::{Deserialize, Serialize};

use crate::models::{DetectionResult, HistoryPage, HistoryRecord, Pagination};

/// `POST /detect` success body: the canonical result plus the classifier's raw payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    #[serde(flatten)]
    pub result: DetectionResult,
    pub raw_response: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryListResponse {
    pub success: bool,
    pub data: Vec<HistoryRecord>,
    pub pagination: Pagination,
}

impl HistoryListResponse {
    pub fn from_page(page: HistoryPage) -> Self {
        let pagination = page.pagination();
        Self { success: true, data: page.records, pagination }
    }

    pub fn into_page(self) -> HistoryPage {
        HistoryPage::new(self.data, self.pagination.total, self.pagination.limit, self.pagination.skip)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveResponse {
    pub success: bool,
    pub data: HistoryRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Every non-2xx response carries this shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
