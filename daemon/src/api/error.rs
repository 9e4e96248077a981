use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use tracing::error;
use verdict_core::input::InputError;
use verdict_core::wire::ErrorBody;

use crate::auth::AuthError;
use crate::gateway::GatewayError;
use crate::history::StoreError;

/// Every failure the HTTP surface can report, with a fixed status and body.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("{0}")]
	BadRequest(String),

	#[error("Unauthorized")]
	Unauthorized,

	#[error("History not found or unauthorized")]
	NotFound,

	#[error("Classifier unavailable")]
	ClassifierUnavailable,

	#[error("Classifier rejected the request")]
	ClassifierRejected { status: u16, body: String },

	#[error("Failed to process image")]
	Processing,

	/// Storage or other server fault. The message is what the client sees.
	#[error("{0}")]
	Internal(&'static str),
}

impl ApiError {
	pub fn missing_id() -> Self {
		ApiError::BadRequest("History ID is required".into())
	}

	/// Map a store failure, using `context` as the client-facing message for faults.
	pub fn from_store(e: StoreError, context: &'static str) -> Self {
		match e {
			StoreError::NotFoundOrForbidden => ApiError::NotFound,
			StoreError::InvalidDraft(e) => e.into(),
			StoreError::DbError(msg) => {
				error!(error = %msg, "{context}");
				ApiError::Internal(context)
			}
		}
	}

	fn details(&self) -> Option<String> {
		match self {
			ApiError::ClassifierRejected { status, body } if body.is_empty() => Some(format!("status {status}")),
			ApiError::ClassifierRejected { status, body } => Some(format!("status {status}: {body}")),
			ApiError::ClassifierUnavailable => Some("the classifier did not respond; try again".into()),
			_ => None,
		}
	}
}

impl From<InputError> for ApiError {
	fn from(e: InputError) -> Self {
		ApiError::BadRequest(e.to_string())
	}
}

impl From<GatewayError> for ApiError {
	fn from(e: GatewayError) -> Self {
		match e {
			GatewayError::InvalidInput(e) => e.into(),
			GatewayError::ClassifierUnavailable(_) => ApiError::ClassifierUnavailable,
			GatewayError::ClassifierError { status, body } => ApiError::ClassifierRejected { status, body },
			GatewayError::Normalization(_) => ApiError::Processing,
		}
	}
}

impl From<AuthError> for ApiError {
	fn from(e: AuthError) -> Self {
		match e {
			AuthError::Unauthorized | AuthError::InvalidEmail(_) => ApiError::Unauthorized,
			AuthError::DbError(msg) => {
				error!(error = %msg, "session lookup failed");
				ApiError::Internal("Failed to resolve session")
			}
		}
	}
}

impl ResponseError for ApiError {
	fn status_code(&self) -> StatusCode {
		match self {
			ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
			ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
			ApiError::NotFound => StatusCode::NOT_FOUND,
			ApiError::ClassifierUnavailable => StatusCode::SERVICE_UNAVAILABLE,
			ApiError::ClassifierRejected { .. } => StatusCode::BAD_GATEWAY,
			ApiError::Processing | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn error_response(&self) -> HttpResponse {
		HttpResponse::build(self.status_code()).json(ErrorBody { error: self.to_string(), details: self.details() })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn statuses_follow_error_kind() {
		assert_eq!(ApiError::from(InputError::Missing).status_code(), StatusCode::BAD_REQUEST);
		assert_eq!(ApiError::from(AuthError::Unauthorized).status_code(), StatusCode::UNAUTHORIZED);
		assert_eq!(ApiError::from_store(StoreError::NotFoundOrForbidden, "x").status_code(), StatusCode::NOT_FOUND);
		assert_eq!(
			ApiError::from(GatewayError::ClassifierUnavailable("timeout".into())).status_code(),
			StatusCode::SERVICE_UNAVAILABLE
		);
		assert_eq!(
			ApiError::from(GatewayError::ClassifierError { status: 500, body: String::new() }).status_code(),
			StatusCode::BAD_GATEWAY
		);
		assert_eq!(
			ApiError::from(GatewayError::Normalization("bad label".into())).status_code(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
	}

	#[test]
	fn normalization_details_stay_internal() {
		let err = ApiError::from(GatewayError::Normalization("unknown label `cartoon`".into()));
		assert_eq!(err.to_string(), "Failed to process image");
		assert_eq!(err.details(), None);
	}

	#[test]
	fn storage_faults_use_context_message() {
		let err = ApiError::from_store(StoreError::DbError("disk on fire".into()), "Failed to fetch history");
		assert_eq!(err.to_string(), "Failed to fetch history");
		assert_eq!(err.details(), None);
	}

	#[test]
	fn upstream_status_in_details() {
		let err = ApiError::from(GatewayError::ClassifierError { status: 422, body: "bad image".into() });
		assert_eq!(err.details().as_deref(), Some("status 422: bad image"));
	}
}
