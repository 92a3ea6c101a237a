//! LIST / MLSD response parser.
//!
//! Each line is tried as MLSD facts (RFC 3659), then Unix `ls -l`, then
//! Windows/IIS. Lines matching none of them are dropped, so error text a
//! server writes to the data channel never reads as a file.

use crate::types::{FtpEntry, FtpEntryKind};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref UNIX_RE: Regex = Regex::new(
        r"(?x)
        ^([dlcbps-][rwxsStT-]{9})[+@.]?\s+ # permissions
        \d+\s+                             # link count
        \S+\s+                             # owner
        (?:\S+\s+)?                        # group (absent on some servers)
        (\d+)\s+                           # size
        (\w{3}\s+\d{1,2}\s+[\d:]+)\s       # date
        (.+)$                              # name (possibly with -> target)
        "
    )
    .expect("valid unix listing regex");
    static ref WINDOWS_RE: Regex = Regex::new(
        r"(?x)
        ^(\d{2}-\d{2}-\d{2,4})\s+          # date
        (\d{1,2}:\d{2}(?:AM|PM)?)\s+       # time
        (<DIR>|\d+)\s+                     # size or <DIR>
        (.+)$                              # name
        "
    )
    .expect("valid windows listing regex");
}

/// Parse a full multi-line LIST or MLSD response body.
pub fn parse_listing(raw: &str) -> Vec<FtpEntry> {
    raw.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .filter(|l| !l.starts_with("total "))
        .filter_map(parse_line)
        .filter(|e| e.name != "." && e.name != "..")
        .collect()
}

/// Parse a single listing line, `None` if it matches no known format.
pub fn parse_line(line: &str) -> Option<FtpEntry> {
    if line.contains(';') && line.contains('=') {
        if let Some(e) = parse_mlsd(line) {
            return Some(e);
        }
    }
    parse_unix(line).or_else(|| parse_windows(line))
}

// ─── MLSD ────────────────────────────────────────────────────────────

/// `fact1=val1;fact2=val2; filename`
fn parse_mlsd(line: &str) -> Option<FtpEntry> {
    let line = line.trim_start();
    let (facts_str, name) = line.split_once(' ')?;
    if name.is_empty() || !facts_str.contains('=') {
        return None;
    }

    let facts: HashMap<String, String> = facts_str
        .split(';')
        .filter_map(|seg| seg.split_once('='))
        .map(|(k, v)| (k.to_lowercase(), v.to_string()))
        .collect();

    let kind = match facts.get("type").map(|s| s.to_lowercase()).as_deref() {
        Some("dir") | Some("cdir") | Some("pdir") => FtpEntryKind::Directory,
        Some("file") => FtpEntryKind::File,
        Some(t) if t.contains("link") => FtpEntryKind::Symlink,
        _ => FtpEntryKind::Unknown,
    };

    Some(FtpEntry {
        name: name.to_string(),
        kind,
        size: facts.get("size").and_then(|v| v.parse().ok()).unwrap_or(0),
        modified: facts.get("modify").and_then(|v| parse_mlsd_time(v)),
        permissions: facts.get("unix.mode").cloned(),
        link_target: None,
        facts,
    })
}

/// `YYYYMMDDHHmmSS[.fraction]`
fn parse_mlsd_time(s: &str) -> Option<DateTime<Utc>> {
    let base = s.get(..14)?;
    NaiveDateTime::parse_from_str(base, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

// ─── Unix ────────────────────────────────────────────────────────────

/// ```text
/// -rw-r--r--   1 user group  1234 Jan  1 12:00 file.txt
/// lrwxrwxrwx   1 user group    42 Jan  1  2025 link -> target
/// ```
fn parse_unix(line: &str) -> Option<FtpEntry> {
    let caps = UNIX_RE.captures(line)?;
    let perms = caps.get(1)?.as_str();
    let size = caps.get(2)?.as_str().parse::<u64>().unwrap_or(0);
    let name_raw = caps.get(4)?.as_str().trim_start();

    let kind = match perms.as_bytes()[0] {
        b'd' => FtpEntryKind::Directory,
        b'l' => FtpEntryKind::Symlink,
        b'-' => FtpEntryKind::File,
        _ => FtpEntryKind::Unknown,
    };

    let (name, link_target) = match (kind, name_raw.split_once(" -> ")) {
        (FtpEntryKind::Symlink, Some((n, t))) => (n.to_string(), Some(t.to_string())),
        _ => (name_raw.to_string(), None),
    };

    Some(FtpEntry {
        name,
        kind,
        size,
        modified: parse_unix_date(caps.get(3)?.as_str()),
        permissions: Some(perms.to_string()),
        link_target,
        facts: HashMap::new(),
    })
}

/// "Jan  1 12:00" (current year) or "Jan  1  2025".
fn parse_unix_date(s: &str) -> Option<DateTime<Utc>> {
    let normalised = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalised.contains(':') {
        let with_year = format!("{} {}", Utc::now().year(), normalised);
        let dt = NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M").ok()?;
        return Some(Utc.from_utc_datetime(&dt));
    }
    let date = NaiveDate::parse_from_str(&normalised, "%b %d %Y").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

// ─── Windows / IIS ───────────────────────────────────────────────────

/// ```text
/// 01-01-26  12:00AM       1234 file.txt
/// 01-01-26  12:00PM      <DIR> Directory Name
/// ```
fn parse_windows(line: &str) -> Option<FtpEntry> {
    let caps = WINDOWS_RE.captures(line)?;
    let size_or_dir = caps.get(3)?.as_str();
    let (kind, size) = if size_or_dir == "<DIR>" {
        (FtpEntryKind::Directory, 0)
    } else {
        (FtpEntryKind::File, size_or_dir.parse::<u64>().unwrap_or(0))
    };

    Some(FtpEntry {
        name: caps.get(4)?.as_str().to_string(),
        kind,
        size,
        modified: parse_windows_date(caps.get(1)?.as_str(), caps.get(2)?.as_str()),
        permissions: None,
        link_target: None,
        facts: HashMap::new(),
    })
}

fn parse_windows_date(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let combined = format!("{} {}", date, time);
    ["%m-%d-%y %I:%M%p", "%m-%d-%y %H:%M", "%m-%d-%Y %I:%M%p", "%m-%d-%Y %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&combined, fmt).ok())
        .map(|dt| Utc.from_utc_datetime(&dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_file() {
        let entries = parse_listing("-rw-r--r--   1 user group  1234 Jan  1 12:00 backup.db");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "backup.db");
        assert_eq!(entries[0].kind, FtpEntryKind::File);
        assert_eq!(entries[0].size, 1234);
        assert!(entries[0].modified.is_some());
    }

    #[test]
    fn unix_name_with_spaces_and_year() {
        let entries = parse_listing("-rw-r--r--   1 ftp ftp  10 Mar  3  2024 my report.json");
        assert_eq!(entries[0].name, "my report.json");
        let modified = entries[0].modified.unwrap();
        assert_eq!(modified.year(), 2024);
    }

    #[test]
    fn unix_symlink() {
        let entries = parse_listing("lrwxrwxrwx   1 root root    22 Jan  5 08:00 link -> /var/target");
        assert_eq!(entries[0].kind, FtpEntryKind::Symlink);
        assert_eq!(entries[0].name, "link");
        assert_eq!(entries[0].link_target.as_deref(), Some("/var/target"));
    }

    #[test]
    fn mlsd_facts() {
        let entries = parse_listing("type=file;size=1024;modify=20260101120000; example.bin");
        assert_eq!(entries[0].name, "example.bin");
        assert_eq!(entries[0].kind, FtpEntryKind::File);
        assert_eq!(entries[0].size, 1024);
        assert_eq!(entries[0].facts.get("type").map(String::as_str), Some("file"));
    }

    #[test]
    fn dots_and_totals_are_dropped() {
        let raw = "total 8\r\ntype=cdir; .\r\ntype=pdir; ..\r\ntype=file;size=10; real.txt\r\n";
        let entries = parse_listing(raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "real.txt");
    }

    #[test]
    fn windows_entries() {
        let entries = parse_listing("01-01-26  12:00AM      <DIR> My Documents\n02-14-26  03:30PM  2048 data.db");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, FtpEntryKind::Directory);
        assert_eq!(entries[0].name, "My Documents");
        assert_eq!(entries[1].size, 2048);
        assert!(entries[1].modified.is_some());
    }

    #[test]
    fn unrecognised_lines_are_dropped() {
        assert!(parse_line("backup.db").is_none());
        let raw = "ls: cannot access '/upload/a.db': No such file or directory\r\n";
        assert!(parse_listing(raw).is_empty());

        let mixed = "550 oops\r\n-rw-r--r--   1 ftp ftp  7 Jan  1 12:00 kept.db\r\n";
        let entries = parse_listing(mixed);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "kept.db");
    }
}
