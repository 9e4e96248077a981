use client::notification::{Notification, NotificationLevel};
use client::view::DashboardStats;
use console::style;
use verdict_core::models::{HistoryPage, HistoryRecord, ImageKind, Verdict};
use verdict_core::wire::DetectResponse;

pub fn verdict(v: Verdict) -> String {
    match v {
        Verdict::Ai => style("AI").red().bold().to_string(),
        Verdict::Real => style("REAL").green().bold().to_string(),
    }
}

pub fn detection(resp: &DetectResponse) {
    let r = &resp.result;
    println!("{}  {}", style("Verdict").bold(), verdict(r.verdict));
    println!("  AI probability:   {:>6.2}%", r.ai_probability);
    println!("  Real probability: {:>6.2}%", r.real_probability);
    println!("  Processing time:  {:.0} ms", r.processing_time_ms);
    let meta = &r.source_meta;
    if meta.width > 0 || meta.height > 0 {
        println!("  Dimensions:       {} x {}", meta.width, meta.height);
    }
    if let Some(format) = &meta.format {
        println!("  Format:           {format}");
    }
}

fn source(record: &HistoryRecord) -> String {
    match (record.image_ref.kind, record.image_ref.payload_or_url.as_deref()) {
        (ImageKind::Url, Some(url)) => url.to_string(),
        _ => record
            .result
            .source_meta
            .filename
            .clone()
            .unwrap_or_else(|| "upload".to_string()),
    }
}

pub fn record_line(index: usize, record: &HistoryRecord, pending: bool) {
    let marker = if pending { style("…").yellow().to_string() } else { " ".to_string() };
    println!(
        "{marker}{:>3}. {}  {}  AI {:>6.2}%  {}  {}",
        index + 1,
        style(&record.id).dim(),
        verdict(record.result.verdict),
        record.result.ai_probability,
        record.created_at.format("%Y-%m-%d %H:%M"),
        source(record),
    );
}

pub fn page_footer(page: &HistoryPage) {
    let first = if page.records.is_empty() { 0 } else { page.skip + 1 };
    let last = page.skip + page.records.len() as u64;
    let more = if page.has_more() { ", more available" } else { "" };
    println!("{}", style(format!("showing {first}-{last} of {}{more}", page.total)).dim());
}

pub fn stats(stats: &DashboardStats) {
    println!(
        "{} {}   {} {}   {} {}",
        style("Total").bold(),
        stats.total,
        style("AI").red(),
        stats.ai,
        style("Real").green(),
        stats.real
    );
}

pub fn notification(n: &Notification) {
    match n.level {
        NotificationLevel::Info => println!("{} {}", style("✓").green(), n.message),
        NotificationLevel::Warning => println!("{} {}", style("!").yellow(), n.message),
        NotificationLevel::Error => eprintln!("{} {}", style("✗").red(), n.message),
    }
}
