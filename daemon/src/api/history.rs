use actix_web::{error, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::info;
use verdict_core::models::RecordDraft;
use verdict_core::wire::{DeleteResponse, HistoryListResponse, SaveResponse};
use verdict_core::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

use super::{identify, ApiError, AppState};

/// Saved records may carry an upload payload, so allow a bit over the upload
/// limit once base64 inflation is counted.
const MAX_SAVE_BODY: usize = 14 * 1024 * 1024;

pub(super) fn json_config() -> web::JsonConfig {
	web::JsonConfig::default()
		.limit(MAX_SAVE_BODY)
		.error_handler(|err, _req| {
			let message = match &err {
				error::JsonPayloadError::ContentType => "expected application/json".to_string(),
				other => format!("malformed history record: {other}"),
			};
			ApiError::BadRequest(message).into()
		})
}

/// Query strings that do not even parse (duplicate keys and the like) get the
/// same JSON error body as everything else.
pub(super) fn query_config() -> web::QueryConfig {
	web::QueryConfig::default().error_handler(|err, _req| ApiError::BadRequest(format!("invalid query string: {err}")).into())
}

/// Query parameters arrive as raw strings so bad values fall back to defaults
/// instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ListQuery {
	limit: Option<String>,
	skip: Option<String>,
}

impl ListQuery {
	pub(super) fn limit(&self) -> u64 {
		match self.limit.as_deref().and_then(|l| l.trim().parse::<i64>().ok()) {
			Some(l) if l > 0 => (l as u64).min(MAX_PAGE_LIMIT),
			_ => DEFAULT_PAGE_LIMIT,
		}
	}

	pub(super) fn skip(&self) -> u64 {
		match self.skip.as_deref().and_then(|s| s.trim().parse::<i64>().ok()) {
			Some(s) if s > 0 => s as u64,
			_ => 0,
		}
	}
}

#[derive(Debug, Deserialize)]
pub(super) struct DeleteQuery {
	id: Option<String>,
}

/// `GET /history?limit&skip`
pub async fn list(
	req: HttpRequest,
	query: web::Query<ListQuery>,
	state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
	let owner = identify(&req, &state).await?;
	let page = state
		.history
		.list(&owner, query.limit(), query.skip())
		.await
		.map_err(|e| ApiError::from_store(e, "Failed to fetch history"))?;
	Ok(HttpResponse::Ok().json(HistoryListResponse::from_page(page)))
}

/// `POST /history` with a `RecordDraft` body. Ownership comes from the session only.
pub async fn save(
	req: HttpRequest,
	draft: web::Json<RecordDraft>,
	state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
	let owner = identify(&req, &state).await?;
	let record = state
		.history
		.append(&owner, draft.into_inner())
		.await
		.map_err(|e| ApiError::from_store(e, "Failed to save history"))?;
	Ok(HttpResponse::Created().json(SaveResponse { success: true, data: record }))
}

/// `DELETE /history?id=<id>`
pub async fn delete(
	req: HttpRequest,
	query: web::Query<DeleteQuery>,
	state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
	let owner = identify(&req, &state).await?;
	let id = query.id.as_deref().map(str::trim).filter(|id| !id.is_empty()).ok_or_else(ApiError::missing_id)?;

	state.history.remove(&owner, id).await.map_err(|e| ApiError::from_store(e, "Failed to delete history"))?;
	info!(owner = %owner.id, record = id, "history record deleted");
	Ok(HttpResponse::Ok().json(DeleteResponse { success: true, message: "History deleted successfully".into() }))
}
