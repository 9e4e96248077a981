use actix_multipart::{Field, Multipart};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::debug;
use verdict_core::input::{normalize_content_type, DetectRequest, InputError, UploadPayload, MAX_UPLOAD_BYTES};
use verdict_core::wire::DetectResponse;

use super::{ApiError, AppState};

/// JSON detect bodies only ever carry a URL.
const MAX_JSON_BODY: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct UrlBody {
	url: Option<String>,
}

/// `POST /detect` with either `{url}` JSON or a multipart form holding `image`.
pub async fn detect(
	req: HttpRequest,
	payload: web::Payload,
	state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
	let content_type = req
		.headers()
		.get(header::CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.map(normalize_content_type)
		.unwrap_or_default();

	let request = match content_type.as_str() {
		"application/json" => read_json(payload).await?,
		"multipart/form-data" => read_multipart(Multipart::new(req.headers(), payload)).await?,
		other => {
			debug!(content_type = other, "detect with unsupported body");
			return Err(InputError::Malformed(format!("expected application/json or multipart/form-data, got `{other}`")).into());
		}
	};

	let detection = state.gateway.detect(request).await?;
	Ok(HttpResponse::Ok().json(DetectResponse { result: detection.result, raw_response: detection.raw.into_json() }))
}

async fn read_json(mut payload: web::Payload) -> Result<DetectRequest, InputError> {
	let mut body = web::BytesMut::new();
	while let Some(chunk) = payload.next().await {
		let chunk = chunk.map_err(|e| InputError::Malformed(e.to_string()))?;
		if body.len() + chunk.len() > MAX_JSON_BODY {
			return Err(InputError::Malformed("request body too large".into()));
		}
		body.extend_from_slice(&chunk);
	}
	let parsed: UrlBody = serde_json::from_slice(&body).map_err(|e| InputError::Malformed(e.to_string()))?;
	Ok(DetectRequest { file: None, url: parsed.url })
}

/// Forms carry exactly one `image` file. URLs go through the JSON body, so a
/// `url` field here is rejected whether or not an image came with it.
async fn read_multipart(mut form: Multipart) -> Result<DetectRequest, InputError> {
	let mut request = DetectRequest::default();
	let mut saw_url = false;

	while let Some(field) = form.next().await {
		let mut field = field.map_err(|e| InputError::Malformed(e.to_string()))?;
		let name = field.name().map(str::to_owned);
		match name.as_deref() {
			Some("image") => {
				if request.file.is_some() {
					return Err(InputError::Ambiguous);
				}
				let content_type = field.content_type().map(|m| m.essence_str().to_string()).unwrap_or_default();
				let filename = field
					.content_disposition()
					.and_then(|cd| cd.get_filename())
					.map(str::to_string);
				let bytes = read_field(&mut field, MAX_UPLOAD_BYTES).await.map_err(|e| match e {
					FieldError::TooLarge(size) => InputError::TooLarge { size, limit: MAX_UPLOAD_BYTES },
					FieldError::Stream(msg) => InputError::Malformed(msg),
				})?;
				request.file = Some(UploadPayload { bytes, content_type, filename });
			}
			other => {
				saw_url |= other == Some("url");
				// everything else is drained and ignored
				while let Some(chunk) = field.next().await {
					chunk.map_err(|e| InputError::Malformed(e.to_string()))?;
				}
			}
		}
	}

	match (saw_url, request.file.is_some()) {
		(true, true) => Err(InputError::Ambiguous),
		(true, false) => Err(InputError::Malformed("send urls as a JSON body, not a form field".into())),
		(false, false) => Err(InputError::Missing),
		(false, true) => Ok(request),
	}
}

enum FieldError {
	TooLarge(usize),
	Stream(String),
}

/// Read a field fully, stopping as soon as it passes `limit`.
async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, FieldError> {
	let mut bytes = Vec::new();
	while let Some(chunk) = field.next().await {
		let chunk = chunk.map_err(|e| FieldError::Stream(e.to_string()))?;
		if bytes.len() + chunk.len() > limit {
			return Err(FieldError::TooLarge(bytes.len() + chunk.len()));
		}
		bytes.extend_from_slice(&chunk);
	}
	Ok(bytes)
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::Ordering;

	use actix_web::http::StatusCode;
	use actix_web::{test, App};

	use super::*;
	use crate::api::configure;
	use crate::api::test_support::fixture;

	const BOUNDARY: &str = "----verdict-test-boundary";

	fn multipart_body(parts: &[(&str, Option<(&str, &str)>, &[u8])]) -> Vec<u8> {
		let mut body = Vec::new();
		for (name, file, data) in parts {
			body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
			match file {
				Some((filename, mime)) => {
					body.extend_from_slice(
						format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n").as_bytes(),
					);
					body.extend_from_slice(format!("Content-Type: {mime}\r\n\r\n").as_bytes());
				}
				None => {
					body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
				}
			}
			body.extend_from_slice(data);
			body.extend_from_slice(b"\r\n");
		}
		body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
		body
	}

	fn multipart_request(body: Vec<u8>) -> test::TestRequest {
		test::TestRequest::post()
			.uri("/detect")
			.insert_header((header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}")))
			.set_payload(body)
	}

	#[actix_web::test]
	async fn url_json_detection() {
		let fx = fixture().await;
		let app = test::init_service(App::new().app_data(web::Data::new(fx.state)).configure(configure)).await;

		let req = test::TestRequest::post()
			.uri("/detect")
			.set_json(serde_json::json!({ "url": "https://example.com/image.jpg" }))
			.to_request();
		let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

		assert_eq!(body["aiProbability"], 85.42);
		assert_eq!(body["realProbability"], 14.58);
		assert_eq!(body["final"], "AI");
		assert_eq!(body["processingTime"], 1288.52);
		assert_eq!(body["metaInfo"]["width"], 800);
		assert_eq!(body["metaInfo"]["height"], 1066);
		assert_eq!(body["rawResponse"]["status"], "success");
	}

	#[actix_web::test]
	async fn multipart_upload_detection() {
		let fx = fixture().await;
		let classifier = fx.classifier.clone();
		let app = test::init_service(App::new().app_data(web::Data::new(fx.state)).configure(configure)).await;

		let body = multipart_body(&[("image", Some(("cat.png", "image/png")), &b"\x89PNG\r\n\x1a\n...."[..])]);
		let resp = test::call_service(&app, multipart_request(body).to_request()).await;
		assert_eq!(resp.status(), StatusCode::OK);
		assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
	}

	#[actix_web::test]
	async fn disallowed_type_is_rejected_before_classifier() {
		let fx = fixture().await;
		let classifier = fx.classifier.clone();
		let app = test::init_service(App::new().app_data(web::Data::new(fx.state)).configure(configure)).await;

		let body = multipart_body(&[("image", Some(("doc.pdf", "application/pdf")), &b"%PDF-1.4"[..])]);
		let resp = test::call_service(&app, multipart_request(body).to_request()).await;
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
		assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
	}

	#[actix_web::test]
	async fn oversize_upload_is_rejected_before_classifier() {
		let fx = fixture().await;
		let classifier = fx.classifier.clone();
		let app = test::init_service(App::new().app_data(web::Data::new(fx.state)).configure(configure)).await;

		let big = vec![0u8; MAX_UPLOAD_BYTES + 1];
		let body = multipart_body(&[("image", Some(("big.jpg", "image/jpeg")), &big[..])]);
		let resp = test::call_service(&app, multipart_request(body).to_request()).await;
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
		assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
	}

	#[actix_web::test]
	async fn file_and_url_together_is_ambiguous() {
		let fx = fixture().await;
		let app = test::init_service(App::new().app_data(web::Data::new(fx.state)).configure(configure)).await;

		let body = multipart_body(&[
			("image", Some(("cat.png", "image/png")), &b"\x89PNG"[..]),
			("url", None, &b"https://example.com/image.jpg"[..]),
		]);
		let resp = test::call_service(&app, multipart_request(body).to_request()).await;
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
		let body: serde_json::Value = test::read_body_json(resp).await;
		assert!(body["error"].as_str().unwrap().contains("exactly one"));
	}

	#[actix_web::test]
	async fn url_only_form_is_rejected_before_classifier() {
		let fx = fixture().await;
		let classifier = fx.classifier.clone();
		let app = test::init_service(App::new().app_data(web::Data::new(fx.state)).configure(configure)).await;

		let body = multipart_body(&[("url", None, &b"https://example.com/image.jpg"[..])]);
		let resp = test::call_service(&app, multipart_request(body).to_request()).await;
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
		let body: serde_json::Value = test::read_body_json(resp).await;
		assert!(body["error"].as_str().unwrap().contains("JSON"));
		assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
	}

	#[actix_web::test]
	async fn form_without_image_is_missing_input() {
		let fx = fixture().await;
		let classifier = fx.classifier.clone();
		let app = test::init_service(App::new().app_data(web::Data::new(fx.state)).configure(configure)).await;

		let body = multipart_body(&[("note", None, &b"hello"[..])]);
		let resp = test::call_service(&app, multipart_request(body).to_request()).await;
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
		assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
	}

	#[actix_web::test]
	async fn empty_json_is_missing_input() {
		let fx = fixture().await;
		let app = test::init_service(App::new().app_data(web::Data::new(fx.state)).configure(configure)).await;

		let req = test::TestRequest::post().uri("/detect").set_json(serde_json::json!({})).to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
	}

	#[actix_web::test]
	async fn plain_text_body_rejected() {
		let fx = fixture().await;
		let app = test::init_service(App::new().app_data(web::Data::new(fx.state)).configure(configure)).await;

		let req = test::TestRequest::post()
			.uri("/detect")
			.insert_header((header::CONTENT_TYPE, "text/plain"))
			.set_payload("https://example.com/image.jpg")
			.to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
	}
}
