use std::fmt;
use std::str::FromStr;

use verdict_core::models::{HistoryPage, HistoryRecord, Verdict};

/// Dashboard filter over the cached page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerdictFilter {
    #[default]
    All,
    Ai,
    Real,
}

impl VerdictFilter {
    pub fn matches(&self, record: &HistoryRecord) -> bool {
        match self {
            VerdictFilter::All => true,
            VerdictFilter::Ai => record.result.verdict == Verdict::Ai,
            VerdictFilter::Real => record.result.verdict == Verdict::Real,
        }
    }
}

impl FromStr for VerdictFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(VerdictFilter::All),
            "ai" => Ok(VerdictFilter::Ai),
            "real" => Ok(VerdictFilter::Real),
            other => Err(format!("unknown filter `{other}` (expected all, ai or real)")),
        }
    }
}

impl fmt::Display for VerdictFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VerdictFilter::All => "all",
            VerdictFilter::Ai => "ai",
            VerdictFilter::Real => "real",
        })
    }
}

/// Header numbers. `total` is the server count; `ai`/`real` count the cached page only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DashboardStats {
    pub total: u64,
    pub ai: usize,
    pub real: usize,
}

pub fn stats(page: &HistoryPage) -> DashboardStats {
    let ai = page.records.iter().filter(|r| r.result.verdict == Verdict::Ai).count();
    DashboardStats { total: page.total, ai, real: page.records.len() - ai }
}

pub fn filtered(page: &HistoryPage, filter: VerdictFilter) -> Vec<&HistoryRecord> {
    page.records.iter().filter(|r| filter.matches(r)).collect()
}
