use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, multipart, Client};
use thiserror::Error;
use tracing::{debug, warn};
use verdict_core::input::{DetectionInput, UploadPayload, UrlPayload};
use verdict_core::normalize::RawClassifierResponse;

use crate::config::ClassifierConfig;

/// Longest slice of an error body kept for diagnostics.
const MAX_ERROR_BODY: usize = 2048;

#[derive(Debug, Error)]
pub enum ClassifierError {
	/// DNS, connect, reset or timeout. Safe for the caller to resubmit.
	#[error("classifier unavailable: {0}")]
	Unavailable(String),

	#[error("classifier returned {status}: {body}")]
	Status { status: u16, body: String },

	/// 2xx with a body that is not JSON.
	#[error("classifier sent an unreadable body: {0}")]
	Unreadable(String),

	#[error("classifier client setup failed: {0}")]
	Setup(String),
}

/// One outbound classification per call. Never retries.
#[async_trait]
pub trait Classifier: Send + Sync {
	async fn classify(&self, input: &DetectionInput) -> Result<RawClassifierResponse, ClassifierError>;
}

/// HTTP client for the external classifier's upload and URL endpoints.
pub struct HttpClassifier {
	client: Client,
	upload_endpoint: String,
	url_endpoint: String,
	bearer: String,
}

impl HttpClassifier {
	pub fn new(config: &ClassifierConfig, bearer: String) -> Result<Self, ClassifierError> {
		let client = Client::builder()
			.timeout(Duration::from_secs(config.timeout_secs))
			.connect_timeout(Duration::from_secs(config.connect_timeout_secs))
			.build()
			.map_err(|e| ClassifierError::Setup(e.to_string()))?;

		Ok(Self {
			client,
			upload_endpoint: config.upload_endpoint.clone(),
			url_endpoint: config.url_endpoint.clone(),
			bearer,
		})
	}

	async fn send_upload(&self, upload: &UploadPayload) -> Result<reqwest::Response, reqwest::Error> {
		debug!(bytes = upload.bytes.len(), content_type = %upload.content_type, "classifying upload");
		let filename = upload.filename.clone().unwrap_or_else(|| "image.jpg".to_string());
		let part = multipart::Part::bytes(upload.bytes.clone())
			.file_name(filename)
			.mime_str(&upload.content_type)?;
		let form = multipart::Form::new().part("file", part);

		self.client
			.post(&self.upload_endpoint)
			.header(header::AUTHORIZATION, &self.bearer)
			.multipart(form)
			.send()
			.await
	}

	async fn send_url(&self, payload: &UrlPayload) -> Result<reqwest::Response, reqwest::Error> {
		debug!(url_len = payload.url.len(), "classifying url");
		self.client
			.post(&self.url_endpoint)
			.header(header::AUTHORIZATION, &self.bearer)
			.json(&serde_json::json!({ "url": payload.url }))
			.send()
			.await
	}
}

fn transport_error(e: reqwest::Error) -> ClassifierError {
	if e.is_builder() {
		ClassifierError::Setup(e.to_string())
	} else {
		ClassifierError::Unavailable(e.to_string())
	}
}

fn truncate(mut body: String) -> String {
	if body.len() > MAX_ERROR_BODY {
		let mut cut = MAX_ERROR_BODY;
		while !body.is_char_boundary(cut) {
			cut -= 1;
		}
		body.truncate(cut);
		body.push_str("...");
	}
	body
}

#[async_trait]
impl Classifier for HttpClassifier {
	async fn classify(&self, input: &DetectionInput) -> Result<RawClassifierResponse, ClassifierError> {
		let response = match input {
			DetectionInput::Upload(upload) => self.send_upload(upload).await,
			DetectionInput::Url(payload) => self.send_url(payload).await,
		}
		.map_err(transport_error)?;

		let status = response.status();
		if !status.is_success() {
			let body = match response.text().await {
				Ok(body) => body,
				Err(e) => {
					debug!(status = status.as_u16(), error = %e, "could not read classifier error body");
					format!("<unreadable body: {e}>")
				}
			};
			warn!(status = status.as_u16(), kind = input.kind(), "classifier rejected request");
			return Err(ClassifierError::Status { status: status.as_u16(), body: truncate(body) });
		}

		let bytes = response.bytes().await.map_err(transport_error)?;
		let body: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
			ClassifierError::Unreadable(format!("{e} ({} bytes, status {})", bytes.len(), status.as_u16()))
		})?;
		Ok(RawClassifierResponse::new(body))
	}
}

#[cfg(test)]
mod tests {
	use std::net::TcpListener;

	use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};

	use super::*;

	fn prediction() -> serde_json::Value {
		serde_json::json!({
			"results": {
				"prediction_info": {
					"real": "14.58%",
					"artificial": "85.42%",
					"predicted_label": "artificial",
					"processing_time_ms": 1288.52
				},
				"meta_info": { "filename": "image.jpg", "original_format": "JPEG", "size": [800, 1066] }
			},
			"status": "success",
			"status_code": 200,
			"message": "ok"
		})
	}

	async fn predict_url(req: HttpRequest, body: web::Json<serde_json::Value>) -> HttpResponse {
		let auth = req.headers().get("authorization").and_then(|v| v.to_str().ok());
		if auth != Some("Bearer test-token") {
			return HttpResponse::Unauthorized().body("bad token");
		}
		if body["url"] != "https://example.com/image.jpg" {
			return HttpResponse::BadRequest().body("unexpected url");
		}
		HttpResponse::Ok().json(prediction())
	}

	async fn predict_upload(req: HttpRequest, body: web::Bytes) -> HttpResponse {
		let content_type = req.headers().get("content-type").and_then(|v| v.to_str().ok()).unwrap_or("");
		if !content_type.starts_with("multipart/form-data") {
			return HttpResponse::BadRequest().body("expected multipart");
		}
		let text = String::from_utf8_lossy(&body);
		if !text.contains("name=\"file\"") {
			return HttpResponse::BadRequest().body("missing file part");
		}
		HttpResponse::Ok().json(prediction())
	}

	async fn broken() -> HttpResponse {
		HttpResponse::InternalServerError().body("model exploded")
	}

	/// Error status whose body stream dies after the first chunk.
	async fn cut_off() -> HttpResponse {
		let chunks = futures_util::stream::unfold(0u8, |step| async move {
			match step {
				0 => Some((Ok::<_, std::io::Error>(web::Bytes::from_static(b"partial")), 1)),
				1 => {
					tokio::time::sleep(Duration::from_millis(100)).await;
					Some((Err(std::io::Error::other("upstream hung up")), 2))
				}
				_ => None,
			}
		});
		HttpResponse::BadGateway().streaming(chunks)
	}

	async fn not_json() -> HttpResponse {
		HttpResponse::Ok().body("<html>maintenance</html>")
	}

	async fn slow() -> HttpResponse {
		tokio::time::sleep(Duration::from_secs(3)).await;
		HttpResponse::Ok().json(prediction())
	}

	/// Spin up a throwaway classifier on an ephemeral port.
	fn spawn_classifier() -> String {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let port = listener.local_addr().unwrap().port();
		let server = HttpServer::new(|| {
			App::new()
				.route("/v1/predict", web::post().to(predict_upload))
				.route("/v1/predict-url", web::post().to(predict_url))
				.route("/broken", web::post().to(broken))
				.route("/not-json", web::post().to(not_json))
				.route("/cut-off", web::post().to(cut_off))
				.route("/slow", web::post().to(slow))
		})
		.workers(1)
		.listen(listener)
		.unwrap()
		.run();
		actix_web::rt::spawn(server);
		format!("http://127.0.0.1:{port}")
	}

	fn classifier(base: &str, upload: &str, url: &str, timeout_secs: u64) -> HttpClassifier {
		let config = ClassifierConfig {
			upload_endpoint: format!("{base}{upload}"),
			url_endpoint: format!("{base}{url}"),
			token: Some("test-token".into()),
			timeout_secs,
			connect_timeout_secs: 1,
			max_in_flight: 1,
		};
		HttpClassifier::new(&config, config.bearer().unwrap()).unwrap()
	}

	fn url_input() -> DetectionInput {
		DetectionInput::Url(UrlPayload { url: "https://example.com/image.jpg".into() })
	}

	#[actix_web::test]
	async fn url_request_carries_bearer_and_json() {
		let base = spawn_classifier();
		let client = classifier(&base, "/v1/predict", "/v1/predict-url", 5);
		let raw = client.classify(&url_input()).await.unwrap();
		assert_eq!(raw.as_json()["results"]["prediction_info"]["artificial"], "85.42%");
	}

	#[actix_web::test]
	async fn upload_is_sent_as_multipart_file() {
		let base = spawn_classifier();
		let client = classifier(&base, "/v1/predict", "/v1/predict-url", 5);
		let input = DetectionInput::Upload(UploadPayload {
			bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
			content_type: "image/jpeg".into(),
			filename: Some("cat.jpg".into()),
		});
		let raw = client.classify(&input).await.unwrap();
		assert_eq!(raw.as_json()["status"], "success");
	}

	#[actix_web::test]
	async fn non_success_status_is_typed() {
		let base = spawn_classifier();
		let client = classifier(&base, "/broken", "/broken", 5);
		match client.classify(&url_input()).await {
			Err(ClassifierError::Status { status, body }) => {
				assert_eq!(status, 500);
				assert_eq!(body, "model exploded");
			}
			other => panic!("expected status error, got {other:?}"),
		}
	}

	#[actix_web::test]
	async fn unreadable_error_body_is_marked() {
		let base = spawn_classifier();
		let client = classifier(&base, "/cut-off", "/cut-off", 5);
		match client.classify(&url_input()).await {
			Err(ClassifierError::Status { status, body }) => {
				assert_eq!(status, 502);
				assert!(body.starts_with("<unreadable body"), "{body}");
			}
			other => panic!("expected status error, got {other:?}"),
		}
	}

	#[actix_web::test]
	async fn wrong_token_surfaces_401() {
		let base = spawn_classifier();
		let mut client = classifier(&base, "/v1/predict", "/v1/predict-url", 5);
		client.bearer = "Bearer nope".into();
		assert!(matches!(client.classify(&url_input()).await, Err(ClassifierError::Status { status: 401, .. })));
	}

	#[actix_web::test]
	async fn non_json_success_is_unreadable() {
		let base = spawn_classifier();
		let client = classifier(&base, "/not-json", "/not-json", 5);
		assert!(matches!(client.classify(&url_input()).await, Err(ClassifierError::Unreadable(_))));
	}

	#[actix_web::test]
	async fn timeout_is_unavailable() {
		let base = spawn_classifier();
		let client = classifier(&base, "/slow", "/slow", 1);
		assert!(matches!(client.classify(&url_input()).await, Err(ClassifierError::Unavailable(_))));
	}

	#[actix_web::test]
	async fn refused_connection_is_unavailable() {
		let port = {
			let listener = TcpListener::bind("127.0.0.1:0").unwrap();
			listener.local_addr().unwrap().port()
		};
		let client = classifier(&format!("http://127.0.0.1:{port}"), "/v1/predict", "/v1/predict-url", 2);
		assert!(matches!(client.classify(&url_input()).await, Err(ClassifierError::Unavailable(_))));
	}

	#[test]
	fn long_bodies_are_truncated() {
		let body = truncate("x".repeat(MAX_ERROR_BODY + 10));
		assert_eq!(body.len(), MAX_ERROR_BODY + 3);
	}
}
