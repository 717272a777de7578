//! Download progress line parsing.
//!
//! legendary and gogdl both log lines of the form
//! `... Progress: 45.32% (1.23/2.72 GiB), Running for 00:05:32, ETA: 00:06:30`
//! (gogdl omits the `%` and the parenthesised sizes on some versions).

use crate::adapter::InstallProgress;

/// Parses one helper log line. Returns `None` for non-progress lines.
pub fn parse_progress(app_id: &str, line: &str) -> Option<InstallProgress> {
    let (_, rest) = line.split_once("Progress:")?;
    let rest = rest.trim_start();

    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let percent: f32 = rest[..end].parse().ok()?;
    let rest = &rest[end..];

    let (downloaded, total) = match rest.find('(').zip(rest.find(')')) {
        Some((open, close)) if open < close => match rest[open + 1..close].split_once('/') {
            Some((a, b)) => (Some(a.trim().to_string()), Some(b.trim().to_string())),
            None => (None, None),
        },
        _ => (None, None),
    };

    let eta = rest.split_once("ETA:").map(|(_, eta)| {
        eta.split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    });

    Some(InstallProgress {
        app_id: app_id.to_string(),
        percent: percent.clamp(0.0, 100.0),
        downloaded,
        total,
        eta: eta.filter(|e| !e.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legendary_line() {
        let p = parse_progress(
            "Fortnite",
            "[cli] INFO: = Progress: 45.32% (1.23/2.72 GiB), Running for 00:05:32, ETA: 00:06:30",
        )
        .unwrap();
        assert_eq!(p.app_id, "Fortnite");
        assert!((p.percent - 45.32).abs() < 0.001);
        assert_eq!(p.downloaded.as_deref(), Some("1.23"));
        assert_eq!(p.total.as_deref(), Some("2.72 GiB"));
        assert_eq!(p.eta.as_deref(), Some("00:06:30"));
    }

    #[test]
    fn gogdl_line_without_sizes() {
        let p = parse_progress(
            "1207658924",
            "[PROGRESS] INFO: = Progress: 12.50 170/1360, Running for: 00:00:10, ETA: 00:01:10",
        )
        .unwrap();
        assert!((p.percent - 12.5).abs() < 0.001);
        assert_eq!(p.downloaded, None);
        assert_eq!(p.eta.as_deref(), Some("00:01:10"));
    }

    #[test]
    fn ignores_other_lines() {
        assert!(parse_progress("x", "[cli] INFO: Downloading manifest").is_none());
        assert!(parse_progress("x", "Progress: n/a").is_none());
    }
}
