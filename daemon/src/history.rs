use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use surrealdb::types::SurrealValue;
use thiserror::Error;
use tracing::{debug, info};
use ulid::{Generator, Ulid};
use verdict_core::input::InputError;
use verdict_core::models::{
	DetectionResult, HistoryPage, HistoryRecord, Identity, ImageKind, ImageRef, RecordDraft, SourceMeta, Verdict,
};

use crate::db::DbHandle;

#[derive(Debug, Error)]
pub enum StoreError {
	/// Deliberately covers both "absent" and "owned by someone else".
	#[error("history record not found or not owned by caller")]
	NotFoundOrForbidden,

	#[error(transparent)]
	InvalidDraft(#[from] InputError),

	#[error("database error: {0}")]
	DbError(String),
}

fn db_err(e: surrealdb::Error) -> StoreError {
	StoreError::DbError(e.to_string())
}

#[derive(Debug, Clone, SurrealValue)]
struct CountRow {
	total: i64,
}

/// Ownership-scoped persistence for saved detections.
///
/// Every query filters on the caller's id and email; nothing a client sends can
/// widen that scope.
#[derive(Clone)]
pub struct HistoryStore {
	db: DbHandle,
	ids: Arc<Mutex<Generator>>,
}

impl HistoryStore {
	pub fn new(db: DbHandle) -> Self {
		Self { db, ids: Arc::new(Mutex::new(Generator::new())) }
	}

	/// Monotonic key plus the creation instant it encodes.
	fn next_key(&self) -> Result<(Ulid, DateTime<Utc>), StoreError> {
		let now = Utc::now();
		let created_at = DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now);
		let key = self
			.ids
			.lock()
			.generate_from_datetime(SystemTime::from(created_at))
			.map_err(|e| StoreError::DbError(format!("id generation failed: {e}")))?;
		Ok((key, created_at))
	}

	/// Persist a new record for `owner` in a single statement.
	pub async fn append(&self, owner: &Identity, draft: RecordDraft) -> Result<HistoryRecord, StoreError> {
		draft.validate()?;
		let (key, created_at) = self.next_key()?;
		let id = key.to_string();
		let RecordDraft { image_ref, result } = draft;

		self.db
			.db
			.query(
				"CREATE type::record('detection', $key) CONTENT {
                    owner_id: $owner_id,
                    owner_email: $owner_email,
                    owner_name: $owner_name,
                    image_kind: $image_kind,
                    image_ref: $image_ref,
                    ai_probability: $ai_probability,
                    real_probability: $real_probability,
                    verdict: $verdict,
                    processing_time_ms: $processing_time_ms,
                    filename: $filename,
                    format: $format,
                    width: $width,
                    height: $height,
                    created_at: <datetime> $created_at,
                }",
			)
			.bind(("key", id.clone()))
			.bind(("owner_id", owner.id.clone()))
			.bind(("owner_email", owner.email.clone()))
			.bind(("owner_name", owner.display_name.clone()))
			.bind(("image_kind", image_ref.kind.as_str().to_string()))
			.bind(("image_ref", image_ref.payload_or_url.clone()))
			.bind(("ai_probability", result.ai_probability))
			.bind(("real_probability", result.real_probability))
			.bind(("verdict", result.verdict.as_str().to_string()))
			.bind(("processing_time_ms", result.processing_time_ms))
			.bind(("filename", result.source_meta.filename.clone()))
			.bind(("format", result.source_meta.format.clone()))
			.bind(("width", i64::from(result.source_meta.width)))
			.bind(("height", i64::from(result.source_meta.height)))
			.bind(("created_at", created_at.to_rfc3339_opts(SecondsFormat::Micros, true)))
			.await
			.map_err(db_err)?
			.check()
			.map_err(db_err)?;

		info!(id = %id, owner = %owner.id, kind = image_ref.kind.as_str(), "history record saved");

		Ok(HistoryRecord {
			id,
			owner_id: owner.id.clone(),
			owner_email: owner.email.clone(),
			owner_display_name: owner.display_name.clone(),
			image_ref,
			result,
			created_at,
		})
	}

	/// One page of `owner`'s records, newest first, plus the owner's total.
	pub async fn list(&self, owner: &Identity, limit: u64, skip: u64) -> Result<HistoryPage, StoreError> {
		let mut response = self
			.db
			.db
			.query(
				"SELECT record::id(id) AS key, owner_id, owner_email, owner_name, image_kind, image_ref,
                        ai_probability, real_probability, verdict, processing_time_ms,
                        filename, format, width, height, time::micros(created_at) AS created_micros
                 FROM detection
                 WHERE owner_id = $owner_id AND owner_email = $owner_email
                 ORDER BY created_micros DESC, key DESC
                 LIMIT $limit START $skip;
                 SELECT count() AS total FROM detection
                 WHERE owner_id = $owner_id AND owner_email = $owner_email
                 GROUP ALL;",
			)
			.bind(("owner_id", owner.id.clone()))
			.bind(("owner_email", owner.email.clone()))
			.bind(("limit", i64::try_from(limit.max(1)).unwrap_or(i64::MAX)))
			.bind(("skip", i64::try_from(skip).unwrap_or(i64::MAX)))
			.await
			.map_err(db_err)?;

		let rows: Vec<serde_json::Value> = response.take(0).map_err(db_err)?;
		let counts: Vec<CountRow> = response.take(1).map_err(db_err)?;
		let total = counts.first().map(|r| r.total.max(0) as u64).unwrap_or(0);

		let mut records = Vec::with_capacity(rows.len());
		if limit > 0 {
			for row in &rows {
				records.push(record_from_row(row)?);
			}
		}

		debug!(owner = %owner.id, returned = records.len(), total, limit, skip, "history page loaded");

		Ok(HistoryPage::new(records, total, limit, skip))
	}

	/// Delete `id` if, and only if, it belongs to `owner`.
	pub async fn remove(&self, owner: &Identity, id: &str) -> Result<bool, StoreError> {
		let key = match Ulid::from_string(id.trim()) {
			Ok(k) => k.to_string(),
			Err(_) => {
				debug!(id, "rejecting malformed history id");
				return Err(StoreError::NotFoundOrForbidden);
			}
		};

		let mut response = self
			.db
			.db
			.query(
				"DELETE type::record('detection', $key)
                 WHERE owner_id = $owner_id AND owner_email = $owner_email
                 RETURN BEFORE",
			)
			.bind(("key", key.clone()))
			.bind(("owner_id", owner.id.clone()))
			.bind(("owner_email", owner.email.clone()))
			.await
			.map_err(db_err)?;

		let deleted: Vec<serde_json::Value> = response.take(0).map_err(db_err)?;
		if deleted.is_empty() {
			debug!(id = %key, owner = %owner.id, "delete matched nothing");
			return Err(StoreError::NotFoundOrForbidden);
		}

		info!(id = %key, owner = %owner.id, "history record deleted");
		Ok(true)
	}
}

fn corrupt(field: &str, row: &serde_json::Value) -> StoreError {
	StoreError::DbError(format!("corrupt detection row, bad `{field}`: {row}"))
}

fn str_field<'a>(row: &'a serde_json::Value, field: &str) -> Result<&'a str, StoreError> {
	row[field].as_str().ok_or_else(|| corrupt(field, row))
}

fn f64_field(row: &serde_json::Value, field: &str) -> Result<f64, StoreError> {
	row[field].as_f64().ok_or_else(|| corrupt(field, row))
}

fn u32_field(row: &serde_json::Value, field: &str) -> Result<u32, StoreError> {
	row[field]
		.as_u64()
		.and_then(|n| u32::try_from(n).ok())
		.ok_or_else(|| corrupt(field, row))
}

fn opt_str(row: &serde_json::Value, field: &str) -> Option<String> {
	row[field].as_str().map(str::to_string)
}

fn record_from_row(row: &serde_json::Value) -> Result<HistoryRecord, StoreError> {
	let kind = ImageKind::from_wire(str_field(row, "image_kind")?).ok_or_else(|| corrupt("image_kind", row))?;
	let verdict = Verdict::from_wire(str_field(row, "verdict")?).ok_or_else(|| corrupt("verdict", row))?;
	let created_at = row["created_micros"]
		.as_i64()
		.and_then(DateTime::from_timestamp_micros)
		.ok_or_else(|| corrupt("created_at", row))?;

	Ok(HistoryRecord {
		id: str_field(row, "key")?.to_string(),
		owner_id: str_field(row, "owner_id")?.to_string(),
		owner_email: str_field(row, "owner_email")?.to_string(),
		owner_display_name: str_field(row, "owner_name")?.to_string(),
		image_ref: ImageRef { kind, payload_or_url: opt_str(row, "image_ref") },
		result: DetectionResult {
			ai_probability: f64_field(row, "ai_probability")?,
			real_probability: f64_field(row, "real_probability")?,
			verdict,
			processing_time_ms: f64_field(row, "processing_time_ms")?,
			source_meta: SourceMeta {
				filename: opt_str(row, "filename"),
				format: opt_str(row, "format"),
				width: u32_field(row, "width")?,
				height: u32_field(row, "height")?,
			},
		},
		created_at,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db;

	fn alice() -> Identity {
		Identity { id: "user-a".into(), email: "alice@example.com".into(), display_name: "Alice".into() }
	}

	fn bob() -> Identity {
		Identity { id: "user-b".into(), email: "bob@example.com".into(), display_name: "Bob".into() }
	}

	fn draft(ai: f64) -> RecordDraft {
		RecordDraft {
			image_ref: ImageRef { kind: ImageKind::Url, payload_or_url: Some("https://example.com/image.jpg".into()) },
			result: DetectionResult {
				ai_probability: ai,
				real_probability: 100.0 - ai,
				verdict: if ai >= 50.0 { Verdict::Ai } else { Verdict::Real },
				processing_time_ms: 1288.52,
				source_meta: SourceMeta {
					filename: Some("image.jpg".into()),
					format: Some("JPEG".into()),
					width: 800,
					height: 1066,
				},
			},
		}
	}

	async fn store() -> HistoryStore {
		HistoryStore::new(db::init_memory().await.unwrap())
	}

	#[tokio::test]
	async fn append_then_list_newest_first() {
		let store = store().await;
		let first = store.append(&alice(), draft(10.0)).await.unwrap();
		let second = store.append(&alice(), draft(20.0)).await.unwrap();
		let third = store.append(&alice(), draft(85.42)).await.unwrap();

		let page = store.list(&alice(), 50, 0).await.unwrap();
		let ids: Vec<&str> = page.records.iter().map(|r| r.id.as_str()).collect();
		assert_eq!(ids, vec![third.id.as_str(), second.id.as_str(), first.id.as_str()]);
		assert_eq!(page.total, 3);
		assert!(!page.has_more());

		assert_eq!(page.records[0], third);
		assert_eq!(page.records[0].result.verdict, Verdict::Ai);
		assert_eq!(page.records[0].result.source_meta.height, 1066);
	}

	#[tokio::test]
	async fn list_is_scoped_to_owner() {
		let store = store().await;
		store.append(&alice(), draft(10.0)).await.unwrap();
		store.append(&alice(), draft(20.0)).await.unwrap();
		store.append(&bob(), draft(30.0)).await.unwrap();

		let page = store.list(&bob(), 50, 0).await.unwrap();
		assert_eq!(page.total, 1);
		assert!(page.records.iter().all(|r| r.owner_email == "bob@example.com"));
	}

	#[tokio::test]
	async fn owner_match_requires_id_and_email() {
		let store = store().await;
		let rec = store.append(&alice(), draft(10.0)).await.unwrap();

		let impostor = Identity { id: "someone-else".into(), ..alice() };
		assert!(matches!(store.remove(&impostor, &rec.id).await, Err(StoreError::NotFoundOrForbidden)));
		assert_eq!(store.list(&impostor, 50, 0).await.unwrap().total, 0);
		assert_eq!(store.list(&alice(), 50, 0).await.unwrap().total, 1);
	}

	#[tokio::test]
	async fn remove_twice_is_success_then_not_found() {
		let store = store().await;
		let rec = store.append(&alice(), draft(10.0)).await.unwrap();

		assert!(store.remove(&alice(), &rec.id).await.unwrap());
		assert!(matches!(store.remove(&alice(), &rec.id).await, Err(StoreError::NotFoundOrForbidden)));
		assert_eq!(store.list(&alice(), 50, 0).await.unwrap().total, 0);
	}

	#[tokio::test]
	async fn cross_owner_delete_leaves_record() {
		let store = store().await;
		let rec = store.append(&alice(), draft(10.0)).await.unwrap();

		assert!(matches!(store.remove(&bob(), &rec.id).await, Err(StoreError::NotFoundOrForbidden)));
		let page = store.list(&alice(), 50, 0).await.unwrap();
		assert_eq!(page.records, vec![rec]);
	}

	#[tokio::test]
	async fn malformed_id_is_not_found() {
		let store = store().await;
		for id in ["", "not-a-ulid", "detection:1; DELETE detection"] {
			assert!(matches!(store.remove(&alice(), id).await, Err(StoreError::NotFoundOrForbidden)));
		}
	}

	#[tokio::test]
	async fn pagination_window() {
		let store = store().await;
		for i in 0..7 {
			store.append(&alice(), draft(i as f64)).await.unwrap();
		}

		for (limit, skip, expected, more) in [(3, 0, 3, true), (3, 3, 3, true), (3, 6, 1, false), (3, 9, 0, false), (50, 0, 7, false)] {
			let page = store.list(&alice(), limit, skip).await.unwrap();
			assert_eq!(page.records.len(), expected, "limit={limit} skip={skip}");
			assert_eq!(page.total, 7);
			assert_eq!(page.has_more(), more, "limit={limit} skip={skip}");
		}
	}

	#[tokio::test]
	async fn pages_do_not_overlap() {
		let store = store().await;
		for i in 0..5 {
			store.append(&alice(), draft(i as f64)).await.unwrap();
		}
		let first = store.list(&alice(), 2, 0).await.unwrap();
		let second = store.list(&alice(), 2, 2).await.unwrap();
		for r in &second.records {
			assert!(first.position(&r.id).is_none());
		}
	}

	#[tokio::test]
	async fn invalid_draft_persists_nothing() {
		let store = store().await;
		let mut bad = draft(10.0);
		bad.result.ai_probability = 140.0;
		assert!(matches!(store.append(&alice(), bad).await, Err(StoreError::InvalidDraft(_))));
		assert_eq!(store.list(&alice(), 50, 0).await.unwrap().total, 0);
	}

	#[tokio::test]
	async fn upload_without_retained_payload() {
		let store = store().await;
		let mut d = draft(60.0);
		d.image_ref = ImageRef { kind: ImageKind::Upload, payload_or_url: None };
		d.result.source_meta = SourceMeta::default();
		let rec = store.append(&alice(), d).await.unwrap();

		let page = store.list(&alice(), 50, 0).await.unwrap();
		assert_eq!(page.records[0].id, rec.id);
		assert_eq!(page.records[0].image_ref.payload_or_url, None);
		assert_eq!(page.records[0].result.source_meta.filename, None);
	}
}
