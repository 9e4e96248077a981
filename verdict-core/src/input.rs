use thiserror::Error;
use url::Url;

/// Uploads above this are rejected before any classifier call.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Declared MIME types accepted for upload.
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/webp"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
	#[error("no image file or url provided")]
	Missing,

	#[error("provide exactly one of an image file or a url")]
	Ambiguous,

	#[error("image file is empty")]
	EmptyFile,

	#[error("image is {size} bytes, limit is {limit}")]
	TooLarge { size: usize, limit: usize },

	#[error("unsupported image type: {0}")]
	UnsupportedType(String),

	#[error("invalid image url: {0}")]
	InvalidUrl(String),

	#[error("malformed request: {0}")]
	Malformed(String),

	#[error("invalid history record: {0}")]
	InvalidRecord(String),
}

/// Binary upload as received from the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPayload {
	pub bytes: Vec<u8>,
	pub content_type: String,
	pub filename: Option<String>,
}

/// A single absolute http(s) URL.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlPayload {
	pub url: String,
}

/// Validated detection input: exactly one source.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionInput {
	Upload(UploadPayload),
	Url(UrlPayload),
}

impl DetectionInput {
	pub fn kind(&self) -> &'static str {
		match self {
			DetectionInput::Upload(_) => "upload",
			DetectionInput::Url(_) => "url",
		}
	}
}

/// Raw, unvalidated detection request.
#[derive(Debug, Clone, Default)]
pub struct DetectRequest {
	pub file: Option<UploadPayload>,
	pub url: Option<String>,
}

impl DetectRequest {
	pub fn validate(self) -> Result<DetectionInput, InputError> {
		let url = self.url.filter(|u| !u.trim().is_empty());
		match (self.file, url) {
			(Some(_), Some(_)) => Err(InputError::Ambiguous),
			(None, None) => Err(InputError::Missing),
			(Some(file), None) => validate_upload(file).map(DetectionInput::Upload),
			(None, Some(url)) => validate_url(&url).map(|url| DetectionInput::Url(UrlPayload { url })),
		}
	}
}

/// Lowercase the MIME essence, dropping any parameters.
pub fn normalize_content_type(raw: &str) -> String {
	raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

pub fn validate_upload(mut file: UploadPayload) -> Result<UploadPayload, InputError> {
	if file.bytes.is_empty() {
		return Err(InputError::EmptyFile);
	}
	if file.bytes.len() > MAX_UPLOAD_BYTES {
		return Err(InputError::TooLarge { size: file.bytes.len(), limit: MAX_UPLOAD_BYTES });
	}
	let content_type = normalize_content_type(&file.content_type);
	if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
		return Err(InputError::UnsupportedType(file.content_type));
	}
	file.content_type = content_type;
	Ok(file)
}

/// Accepts only absolute http/https URLs with a host. Returns the trimmed URL.
pub fn validate_url(raw: &str) -> Result<String, InputError> {
	let trimmed = raw.trim();
	let parsed = Url::parse(trimmed).map_err(|e| InputError::InvalidUrl(format!("{trimmed}: {e}")))?;
	if !matches!(parsed.scheme(), "http" | "https") {
		return Err(InputError::InvalidUrl(format!("{trimmed}: scheme must be http or https")));
	}
	if parsed.host_str().map_or(true, str::is_empty) {
		return Err(InputError::InvalidUrl(format!("{trimmed}: missing host")));
	}
	Ok(trimmed.to_string())
}
