use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use verdict_core::input::{DetectRequest, InputError};
use verdict_core::models::DetectionResult;
use verdict_core::normalize::{normalize, RawClassifierResponse};

use crate::classifier::{Classifier, ClassifierError};

#[derive(Debug, Error)]
pub enum GatewayError {
	#[error(transparent)]
	InvalidInput(#[from] InputError),

	#[error("classifier unavailable: {0}")]
	ClassifierUnavailable(String),

	#[error("classifier returned {status}")]
	ClassifierError { status: u16, body: String },

	#[error("classifier response could not be normalized: {0}")]
	Normalization(String),
}

impl GatewayError {
	/// Whether resubmitting the same request might succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(self, GatewayError::ClassifierUnavailable(_))
	}
}

impl From<ClassifierError> for GatewayError {
	fn from(e: ClassifierError) -> Self {
		match e {
			ClassifierError::Unavailable(msg) | ClassifierError::Setup(msg) => GatewayError::ClassifierUnavailable(msg),
			ClassifierError::Status { status, body } => GatewayError::ClassifierError { status, body },
			ClassifierError::Unreadable(msg) => GatewayError::Normalization(msg),
		}
	}
}

/// A normalized verdict plus the classifier body it came from.
#[derive(Debug, Clone)]
pub struct Detection {
	pub result: DetectionResult,
	pub raw: RawClassifierResponse,
}

/// Validates detection requests and forwards them to the classifier,
/// with at most `max_in_flight` outbound calls at once.
///
/// `deadline` bounds the wait for a free slot plus the call itself.
#[derive(Clone)]
pub struct Gateway {
	classifier: Arc<dyn Classifier>,
	permits: Arc<Semaphore>,
	deadline: Duration,
}

impl Gateway {
	pub fn new(classifier: Arc<dyn Classifier>, max_in_flight: usize, deadline: Duration) -> Self {
		Self { classifier, permits: Arc::new(Semaphore::new(max_in_flight.max(1))), deadline }
	}

	pub async fn detect(&self, request: DetectRequest) -> Result<Detection, GatewayError> {
		let input = request.validate()?;
		let kind = input.kind();

		let call = async {
			let _permit = self
				.permits
				.acquire()
				.await
				.map_err(|e| ClassifierError::Unavailable(e.to_string()))?;
			self.classifier.classify(&input).await
		};
		let raw = match tokio::time::timeout(self.deadline, call).await {
			Ok(raw) => raw,
			Err(_) => {
				warn!(kind, deadline_ms = self.deadline.as_millis() as u64, "classification timed out");
				return Err(GatewayError::ClassifierUnavailable(format!(
					"no classifier response within {}s",
					self.deadline.as_secs_f64()
				)));
			}
		};

		let raw = match raw {
			Ok(raw) => raw,
			Err(e) => {
				warn!(kind, error = %e, "classification failed");
				return Err(e.into());
			}
		};

		match normalize(&raw) {
			Ok(result) => {
				info!(kind, verdict = result.verdict.as_str(), ai = result.ai_probability, "image classified");
				Ok(Detection { result, raw })
			}
			Err(e) => {
				error!(kind, error = %e, raw = %raw.as_json(), "unexpected classifier payload");
				Err(GatewayError::Normalization(e.to_string()))
			}
		}
	}
}
