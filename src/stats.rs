//! Index statistics and health overview.
//!
//! Summarizes both stores: tracked files, chunk and vector counts, database
//! sizes, and the most recently indexed files. Used by `docsync stats` to
//! give confidence that syncs are keeping up with the tree.

use anyhow::Result;

use crate::config::Config;
use crate::models::{FileRecord, NANOS_PER_SEC};
use crate::pipeline::Engine;

const RECENT_FILES: usize = 5;

/// Run the stats command: query both stores and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let engine = Engine::open(config).await?;

    let files = engine.metadata.row_count().await?;
    let chunks = engine.content.count().await?;
    let vectors = engine.content.indexed_count().await?;
    let records = engine.metadata.records().await?;

    println!("docsync — Index Stats");
    println!("=====================");
    println!();
    println!("  Root:        {}", config.index.root.display());
    println!(
        "  Metadata:    {} ({})",
        config.db.metadata_path.display(),
        format_bytes(file_size(&config.db.metadata_path))
    );
    println!(
        "  Content:     {} ({})",
        config.db.content_path.display(),
        format_bytes(file_size(&config.db.content_path))
    );
    println!();
    println!("  Files:       {}", files);
    println!("  Chunks:      {}", chunks);
    println!(
        "  Vectors:     {} / {} ({}%)",
        vectors,
        chunks,
        if chunks > 0 { (vectors * 100) / chunks } else { 0 }
    );
    if files > 0 {
        println!("  Per file:    {:.1} chunks", chunks as f64 / files as f64);
    }

    let recent = most_recent(records, RECENT_FILES);
    if !recent.is_empty() {
        println!();
        println!("  Recently modified:");
        println!("  {:<18}   {}", "MODIFIED", "PATH");
        println!("  {}", "-".repeat(76));
        for r in &recent {
            println!("  {:<18}   {}", format_ts_relative(r.last_updated_ns / NANOS_PER_SEC), r.path);
        }
    }

    println!();
    Ok(())
}

fn file_size(path: &std::path::Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn most_recent(mut records: Vec<FileRecord>, n: usize) -> Vec<FileRecord> {
    records.sort_by(|a, b| {
        b.last_updated_ns
            .cmp(&a.last_updated_ns)
            .then_with(|| a.path.cmp(&b.path))
    });
    records.truncate(n);
    records
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        format_ts_iso(ts)
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn old_timestamps_use_dates() {
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
    }

    #[test]
    fn most_recent_orders_newest_first() {
        let records = vec![
            FileRecord { path: "/a".into(), last_updated_ns: 10 },
            FileRecord { path: "/b".into(), last_updated_ns: 30 },
            FileRecord { path: "/c".into(), last_updated_ns: 20 },
        ];
        let recent = most_recent(records, 2);
        let paths: Vec<&str> = recent.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/b", "/c"]);
    }
}
