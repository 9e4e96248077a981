use std::io::Write;
use std::sync::Arc;

use client::api::HttpApi;
use client::notification::NotificationQueue;
use client::sync::{MutationState, Synchronizer};
use client::view::{self, VerdictFilter};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use crate::render;

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Quit,
    Refresh,
    Next,
    Prev,
    Filter(VerdictFilter),
    Delete(String),
    Invalid(String),
    Empty,
}

fn parse(line: &str) -> Command {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Command::Empty;
    };
    let arg = words.next();
    match (head.to_ascii_lowercase().as_str(), arg) {
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit" | "q", _) => Command::Quit,
        ("refresh" | "r", _) => Command::Refresh,
        ("next" | "n", _) => Command::Next,
        ("prev" | "p", _) => Command::Prev,
        ("filter" | "f", Some(f)) => match f.parse() {
            Ok(filter) => Command::Filter(filter),
            Err(e) => Command::Invalid(e),
        },
        ("delete" | "rm" | "d", Some(target)) => Command::Delete(target.to_string()),
        ("filter" | "f", None) => Command::Invalid("usage: filter all|ai|real".into()),
        ("delete" | "rm" | "d", None) => Command::Invalid("usage: delete <number|id>".into()),
        (other, _) => Command::Invalid(format!("unknown command `{other}`, try `help`")),
    }
}

/// Turn a 1-based row number in the current view, or a literal id, into a record id.
fn resolve_target(sync: &Synchronizer, filter: VerdictFilter, target: &str) -> Option<String> {
    let page = sync.page()?;
    if let Ok(n) = target.parse::<usize>() {
        return view::filtered(&page, filter).get(n.checked_sub(1)?).map(|r| r.id.clone());
    }
    page.position(target).map(|_| target.to_string())
}

fn help() {
    println!("  list is shown after every command");
    println!("  delete <n|id>   remove a record (applied immediately, confirmed in background)");
    println!("  filter all|ai|real");
    println!("  next / prev     page through history");
    println!("  refresh         reload from the server");
    println!("  quit");
}

fn show(sync: &Synchronizer, filter: VerdictFilter) {
    for n in sync.notifications().drain() {
        render::notification(&n);
    }
    let Some(page) = sync.page() else {
        println!("{}", style("history not loaded").dim());
        return;
    };
    render::stats(&view::stats(&page));
    let rows = view::filtered(&page, filter);
    if rows.is_empty() {
        println!("{}", style("no detections").dim());
    }
    for (i, record) in rows.iter().enumerate() {
        render::record_line(i, record, sync.state(&record.id) == MutationState::Pending);
    }
    render::page_footer(&page);
    if filter != VerdictFilter::All {
        println!("{}", style(format!("filter: {filter}")).dim());
    }
}

pub async fn run(api: HttpApi, limit: u64) -> anyhow::Result<()> {
    let sync = Synchronizer::new(Arc::new(api), Arc::new(NotificationQueue::new()));
    let mut filter = VerdictFilter::All;
    let mut deletes = JoinSet::new();

    // failures land in the notification queue
    let _ = sync.load(limit, 0).await;
    show(&sync, filter);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", style("verdict>").cyan());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse(&line) {
            Command::Empty => {}
            Command::Help => {
                help();
                continue;
            }
            Command::Quit => break,
            Command::Refresh => {
                let _ = sync.refresh().await;
            }
            Command::Next => match sync.page() {
                Some(page) if page.has_more() => {
                    let _ = sync.load(page.limit, page.skip + page.limit).await;
                }
                _ => println!("{}", style("already on the last page").dim()),
            },
            Command::Prev => match sync.page() {
                Some(page) if page.skip > 0 => {
                    let _ = sync.load(page.limit, page.skip.saturating_sub(page.limit)).await;
                }
                _ => println!("{}", style("already on the first page").dim()),
            },
            Command::Filter(f) => filter = f,
            Command::Delete(target) => match resolve_target(&sync, filter, &target) {
                Some(id) => match sync.begin_delete(&id) {
                    Ok(()) => {
                        let sync = sync.clone();
                        deletes.spawn(async move { sync.confirm_delete(&id).await });
                    }
                    Err(e) => eprintln!("{} {e}", style("✗").red()),
                },
                None => eprintln!("{} no record `{target}` on this page", style("✗").red()),
            },
            Command::Invalid(msg) => {
                eprintln!("{} {msg}", style("✗").red());
                continue;
            }
        }

        show(&sync, filter);
    }

    while deletes.join_next().await.is_some() {}
    for n in sync.notifications().drain() {
        render::notification(&n);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse(""), Command::Empty);
        assert_eq!(parse("  q "), Command::Quit);
        assert_eq!(parse("delete 3"), Command::Delete("3".into()));
        assert_eq!(parse("rm 01HZY"), Command::Delete("01HZY".into()));
        assert_eq!(parse("filter AI"), Command::Filter(VerdictFilter::Ai));
        assert!(matches!(parse("filter bogus"), Command::Invalid(_)));
        assert!(matches!(parse("delete"), Command::Invalid(_)));
        assert!(matches!(parse("launch"), Command::Invalid(_)));
    }
}
