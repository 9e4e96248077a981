mod detect;
mod error;
mod history;

use std::sync::Arc;

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use verdict_core::models::Identity;

use crate::auth::{IdentityResolver, RequestContext};
use crate::gateway::Gateway;
use crate::history::HistoryStore;

pub use error::ApiError;

/// Shared by every worker. All fields are cheap to clone.
#[derive(Clone)]
pub struct AppState {
	pub gateway: Gateway,
	pub history: HistoryStore,
	pub identities: Arc<dyn IdentityResolver>,
}

/// Mount all routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
	cfg.app_data(history::json_config())
		.app_data(history::query_config())
		.route("/health", web::get().to(health))
		.route("/detect", web::post().to(detect::detect))
		.service(
			web::resource("/history")
				.route(web::get().to(history::list))
				.route(web::post().to(history::save))
				.route(web::delete().to(history::delete)),
		);
}

async fn health() -> HttpResponse {
	HttpResponse::Ok().json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Resolve the caller once per request.
async fn identify(req: &HttpRequest, state: &AppState) -> Result<Identity, ApiError> {
	let header = req.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
	let ctx = RequestContext::from_authorization(header);
	Ok(state.identities.resolve(&ctx).await?)
}
