use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::payload::MimeType;
use crate::settings::GenerationSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Generate,
    Refine,
}

/// Milestones of a studio session. Image bytes never enter the journal;
/// images are referenced by content digest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        client: String,
        max_dim: u32,
    },
    GenerateStarted {
        settings: GenerationSettings,
        with_style: bool,
    },
    RefineStarted {
        instruction: String,
        base_digest: String,
    },
    PromptGenerated {
        chars: usize,
    },
    ImageComposed {
        kind: RunKind,
        mime_type: MimeType,
        digest: String,
        history_len: usize,
    },
    RunFailed {
        kind: RunKind,
        message: String,
    },
    HistoryRemoved {
        index: usize,
        id: String,
        history_len: usize,
    },
}

#[derive(Serialize)]
struct JournalLine<'a> {
    session_id: &'a str,
    ts: String,
    #[serde(flatten)]
    event: &'a SessionEvent,
}

/// Appends `SessionEvent`s to a JSONL file, stamping each line with the
/// session id and a UTC timestamp.
#[derive(Debug)]
pub struct SessionJournal {
    path: PathBuf,
    session_id: String,
}

impl SessionJournal {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
        }
    }

    pub fn record(&self, event: &SessionEvent) -> Result<()> {
        let line = serde_json::to_string(&JournalLine {
            session_id: &self.session_id,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open journal {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use serde_json::Value;

    use super::*;
    use crate::settings::AspectRatio;

    fn read_lines(path: &std::path::Path) -> Result<Vec<Value>> {
        fs::read_to_string(path)?
            .lines()
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }

    #[test]
    fn record_writes_tagged_line_with_session_stamp() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let journal = SessionJournal::new(&path, "session-123");

        journal.record(&SessionEvent::GenerateStarted {
            settings: GenerationSettings {
                aspect_ratio: AspectRatio::Landscape,
                ..GenerationSettings::default()
            },
            with_style: true,
        })?;

        let rows = read_lines(&path)?;
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row["type"], "generate_started");
        assert_eq!(row["session_id"], "session-123");
        assert_eq!(row["with_style"], true);
        assert_eq!(row["settings"]["aspect_ratio"], "16:9");

        let ts = row["ts"].as_str().unwrap_or_default();
        assert!(ts.ends_with('Z'));
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn failure_and_composition_events_carry_run_kind() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let journal = SessionJournal::new(&path, "s");

        journal.record(&SessionEvent::RunFailed {
            kind: RunKind::Refine,
            message: "No image was generated.".to_string(),
        })?;
        journal.record(&SessionEvent::ImageComposed {
            kind: RunKind::Generate,
            mime_type: MimeType::Jpeg,
            digest: "abc".to_string(),
            history_len: 1,
        })?;

        let rows = read_lines(&path)?;
        assert_eq!(rows[0]["type"], "run_failed");
        assert_eq!(rows[0]["kind"], "refine");
        assert_eq!(rows[1]["type"], "image_composed");
        assert_eq!(rows[1]["kind"], "generate");
        assert_eq!(rows[1]["mime_type"], "image/jpeg");
        assert_eq!(rows[1]["history_len"], 1);
        Ok(())
    }
}
