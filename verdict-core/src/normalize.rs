use serde_json::Value;
use thiserror::Error;

use crate::models::detection::{DetectionResult, SourceMeta, Verdict};

/// Label the classifier uses for generated images.
pub const ARTIFICIAL_LABEL: &str = "artificial";
/// Label the classifier uses for camera images.
pub const REAL_LABEL: &str = "real";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NormalizeError {
	#[error("classifier response is missing `{0}`")]
	MissingField(&'static str),

	#[error("classifier field `{field}` is not numeric: {value}")]
	NotNumeric { field: &'static str, value: String },

	#[error("classifier field `{field}` out of range: {value}")]
	OutOfRange { field: &'static str, value: f64 },

	#[error("unrecognized classifier label: {0:?}")]
	UnknownLabel(String),

	#[error("malformed classifier field `{0}`")]
	Malformed(&'static str),
}

/// Classifier response body exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub struct RawClassifierResponse(Value);

impl RawClassifierResponse {
	pub fn new(body: Value) -> Self {
		Self(body)
	}

	pub fn as_json(&self) -> &Value {
		&self.0
	}

	pub fn into_json(self) -> Value {
		self.0
	}
}

/// Map the classifier's loosely-typed payload onto a `DetectionResult`.
///
/// Percentages may arrive as decorated strings ("85.42%") or bare numbers and are
/// rounded to two decimals. Anything that cannot be read as the expected shape is an
/// error; no field is ever defaulted to NaN.
pub fn normalize(raw: &RawClassifierResponse) -> Result<DetectionResult, NormalizeError> {
	let prediction = raw
		.0
		.pointer("/results/prediction_info")
		.filter(|v| v.is_object())
		.ok_or(NormalizeError::MissingField("results.prediction_info"))?;

	let ai_probability = percentage(prediction, "artificial")?;
	let real_probability = percentage(prediction, "real")?;
	let verdict = verdict(prediction)?;
	let processing_time_ms = processing_time(prediction)?;
	let source_meta = source_meta(raw.0.pointer("/results/meta_info"))?;

	Ok(DetectionResult {
		ai_probability,
		real_probability,
		verdict,
		processing_time_ms,
		source_meta,
	})
}

fn round2(v: f64) -> f64 {
	(v * 100.0).round() / 100.0
}

/// "85.42%", " 85.42 % ", "85.42" or 85.42.
fn decorated_number(value: &Value) -> Option<f64> {
	let parsed = match value {
		Value::Number(n) => n.as_f64(),
		Value::String(s) => {
			let trimmed = s.trim().trim_end_matches('%').trim_end();
			if trimmed.is_empty() {
				None
			} else {
				trimmed.parse::<f64>().ok()
			}
		}
		_ => None,
	};
	parsed.filter(|v| v.is_finite())
}

fn percentage(prediction: &Value, field: &'static str) -> Result<f64, NormalizeError> {
	let value = prediction
		.get(field)
		.filter(|v| !v.is_null())
		.ok_or(NormalizeError::MissingField(field))?;
	let parsed = decorated_number(value).ok_or_else(|| NormalizeError::NotNumeric {
		field,
		value: value.to_string(),
	})?;
	if !(0.0..=100.0).contains(&parsed) {
		return Err(NormalizeError::OutOfRange { field, value: parsed });
	}
	Ok(round2(parsed))
}

fn verdict(prediction: &Value) -> Result<Verdict, NormalizeError> {
	let label = prediction
		.get("predicted_label")
		.and_then(Value::as_str)
		.ok_or(NormalizeError::MissingField("predicted_label"))?;
	match label.trim().to_ascii_lowercase().as_str() {
		ARTIFICIAL_LABEL => Ok(Verdict::Ai),
		REAL_LABEL => Ok(Verdict::Real),
		_ => Err(NormalizeError::UnknownLabel(label.to_string())),
	}
}

fn processing_time(prediction: &Value) -> Result<f64, NormalizeError> {
	let field = "processing_time_ms";
	let value = match prediction.get(field) {
		None | Some(Value::Null) => return Ok(0.0),
		Some(v) => v,
	};
	let parsed = decorated_number(value).ok_or_else(|| NormalizeError::NotNumeric {
		field,
		value: value.to_string(),
	})?;
	if parsed < 0.0 {
		return Err(NormalizeError::OutOfRange { field, value: parsed });
	}
	Ok(parsed)
}

fn optional_string(meta: &Value, key: &str, field: &'static str) -> Result<Option<String>, NormalizeError> {
	match meta.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(s)) => Ok(Some(s.clone())),
		Some(_) => Err(NormalizeError::Malformed(field)),
	}
}

fn source_meta(meta: Option<&Value>) -> Result<SourceMeta, NormalizeError> {
	let meta = match meta {
		None | Some(Value::Null) => return Ok(SourceMeta::default()),
		Some(m) if m.is_object() => m,
		Some(_) => return Err(NormalizeError::Malformed("meta_info")),
	};

	let filename = optional_string(meta, "filename", "meta_info.filename")?;
	let format = optional_string(meta, "original_format", "meta_info.original_format")?;

	let (width, height) = match meta.get("size") {
		None | Some(Value::Null) => (0, 0),
		Some(Value::Array(dims)) if dims.len() == 2 => {
			let dim = |v: &Value| v.as_u64().and_then(|n| u32::try_from(n).ok());
			match (dim(&dims[0]), dim(&dims[1])) {
				(Some(w), Some(h)) => (w, h),
				_ => return Err(NormalizeError::Malformed("meta_info.size")),
			}
		}
		Some(_) => return Err(NormalizeError::Malformed("meta_info.size")),
	};

	Ok(SourceMeta { filename, format, width, height })
}
