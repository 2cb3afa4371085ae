//! Raw event log reader.
//!
//! The log is newline-delimited JSON, gzip-compressed when the file name ends
//! in `.gz`. Records repeating an earlier (post, user, event time) are dropped,
//! first occurrence wins.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use ranker_core::{Error, Event, Result};
use telemetry::metrics;
use tracing::{debug, info};

fn open(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let is_gzip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    let reader: Box<dyn Read> = if is_gzip {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Decode every record of the log at `path`, without deduplication.
pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    let reader = open(path)?;
    let mut events = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event =
            serde_json::from_str(&line).map_err(|e| Error::parse(path, idx + 1, e.to_string()))?;
        event
            .check()
            .map_err(|e| Error::parse(path, idx + 1, e.to_string()))?;
        events.push(event);
    }

    Ok(events)
}

/// Drop events repeating an earlier (post, user, event time), keeping the first.
pub fn deduplicate(events: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::with_capacity(events.len());
    events
        .into_iter()
        .filter(|e| seen.insert((e.post_id.clone(), e.user_id.clone(), e.event_time)))
        .collect()
}

/// Load the deduplicated event log.
pub fn load_events(path: &Path) -> Result<Vec<Event>> {
    info!(path = %path.display(), "Loading event log");

    let raw = read_events(path)?;
    let raw_count = raw.len();
    let events = deduplicate(raw);
    let duplicates = raw_count - events.len();

    metrics().events_loaded.inc_by(events.len() as u64);
    metrics().duplicate_events.inc_by(duplicates as u64);

    debug!(duplicates, "Dropped duplicate events");
    info!(events = events.len(), "Loaded event log");
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("store-reader-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    const LINES: &str = concat!(
        r#"{"trackable_id": 1, "user_id": 10, "tracker_created_at": "2021-05-01 10:00:00", "has_been_opened": false}"#,
        "\n",
        r#"{"trackable_id": 1, "user_id": 10, "tracker_created_at": "2021-05-01 10:00:00", "has_been_opened": true}"#,
        "\n\n",
        r#"{"trackable_id": 2, "user_id": 10, "tracker_created_at": "2021-05-01 11:00:00", "has_been_opened": true}"#,
        "\n",
    );

    #[test]
    fn test_load_gzip_log_deduplicates() {
        let path = temp_path("events.json.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(LINES.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let events = load_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        // First occurrence wins.
        assert!(!events[0].opened);
        assert_eq!(events[1].post_id.as_str(), "2");
    }

    #[test]
    fn test_plain_log_is_read_uncompressed() {
        let path = temp_path("events.jsonl");
        std::fs::write(&path, LINES).unwrap();

        assert_eq!(read_events(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let path = temp_path("broken.jsonl");
        std::fs::write(&path, "{\"trackable_id\": 1}\n").unwrap();

        match read_events(&path) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_post_age_is_rejected() {
        let path = temp_path("ancient.jsonl");
        let lines = concat!(
            r#"{"trackable_id": 1, "user_id": 10, "tracker_created_at": "2021-05-01 10:00:00", "post_age_in_minutes": 90}"#,
            "\n",
            r#"{"trackable_id": 2, "user_id": 10, "tracker_created_at": "2021-05-01 11:00:00", "post_age_in_minutes": -1e300}"#,
            "\n",
        );
        std::fs::write(&path, lines).unwrap();

        match read_events(&path) {
            Err(Error::Parse { line, message, .. }) => {
                assert_eq!(line, 2);
                assert!(message.contains("post_age_in_minutes"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_reports_path() {
        let path = temp_path("absent.json.gz");
        let err = load_events(&path).unwrap_err();
        assert!(err.to_string().contains("absent.json.gz"));
    }
}
