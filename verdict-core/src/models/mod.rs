pub mod detection;
pub mod history;
pub mod identity;

pub use detection::{DetectionResult, SourceMeta, Verdict};
pub use history::{HistoryPage, HistoryRecord, ImageKind, ImageRef, Pagination, RecordDraft};
pub use identity::Identity;
