use serde::{Deserialize, Serialize};

/// Two-valued classifier outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Verdict {
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "REAL")]
    Real,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Ai => "AI",
            Verdict::Real => "REAL",
        }
    }

    /// Parse the stored/wire form ("AI" / "REAL").
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "AI" => Some(Verdict::Ai),
            "REAL" => Some(Verdict::Real),
            _ => None,
        }
    }
}

/// What the classifier reported about the submitted image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceMeta {
    pub filename: Option<String>,
    pub format: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// Canonical, normalized classifier verdict. Not persisted by itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub ai_probability: f64,
    pub real_probability: f64,
    #[serde(rename = "final")]
    pub verdict: Verdict,
    #[serde(rename = "processingTime")]
    pub processing_time_ms: f64,
    #[serde(rename = "metaInfo")]
    pub source_meta: SourceMeta,
}

impl DetectionResult {
    /// Both probabilities finite and inside [0, 100], processing time non-negative.
    pub fn is_well_formed(&self) -> bool {
        let in_range = |p: f64| p.is_finite() && (0.0..=100.0).contains(&p);
        in_range(self.ai_probability)
            && in_range(self.real_probability)
            && self.processing_time_ms.is_finite()
            && self.processing_time_ms >= 0.0
    }
}
