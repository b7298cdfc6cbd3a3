//! Lastlog ledger.
//!
//! Appends one line per disconnecting session, matching the original
//! `HoneyPotProtocol.lastlogExit` format:
//!
//! `root\tpts/0\t<ip>\t<start> - <end> (<duration>)`

use std::{
    fs::OpenOptions,
    io::Write,
    path::Path,
};

use anyhow::Context;
use chrono::{DateTime, Utc};

pub fn append(lastlog_path: &str, peer_addr: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> anyhow::Result<()> {
    let duration = end.signed_duration_since(start);
    let line = format!(
        "root\tpts/0\t{}\t{} - {} ({})\n",
        peer_addr,
        start.format("%a %b %e %H:%M"),
        end.format("%H:%M"),
        format_duration(duration),
    );

    if let Some(parent) = Path::new(lastlog_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating lastlog directory '{}'", parent.display()))?;
    }

    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(lastlog_path)
        .with_context(|| format!("opening lastlog file '{}'", lastlog_path))?;
    f.write_all(line.as_bytes())
        .with_context(|| format!("appending to lastlog file '{}'", lastlog_path))?;
    Ok(())
}

fn format_duration(d: chrono::Duration) -> String {
    let total_secs = d.num_seconds().max(0);
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    format!("{:02}:{:02}", mins, secs)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn appends_expected_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lastlog");
        let start = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 7, 28, 10, 1, 30).unwrap();

        append(path.to_str().unwrap(), "203.0.113.4", start, end).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("root\tpts/0\t203.0.113.4\t"));
        assert!(contents.contains("(01:30)"));
    }

    #[test]
    fn appends_rather_than_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lastlog");
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        append(path.to_str().unwrap(), "1.1.1.1", t, t).unwrap();
        append(path.to_str().unwrap(), "2.2.2.2", t, t).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
