//! Event output: timestamped text lines or JSON lines

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::Write;
use steamworks_bridge::{PersonaStateChange, PersonaStateChangeFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct EventRecord {
    timestamp: String,
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    persona: Option<PersonaStateChange>,
}

/// Writes one line per observed event
pub struct EventReporter<W: Write> {
    format: OutputFormat,
    out: W,
    persona_changes: usize,
}

impl<W: Write> EventReporter<W> {
    pub fn new(format: OutputFormat, out: W) -> Self {
        Self {
            format,
            out,
            persona_changes: 0,
        }
    }

    pub fn persona_changes(&self) -> usize {
        self.persona_changes
    }

    pub fn persona_state_change(&mut self, at: DateTime<Local>, change: &PersonaStateChange) -> Result<()> {
        self.persona_changes += 1;
        match self.format {
            OutputFormat::Text => writeln!(
                self.out,
                "[{}] {} changed: {}",
                at.format("%H:%M:%S%.3f"),
                change.steam_id,
                describe_flags(change.change_flags)
            )?,
            OutputFormat::Json => self.json_line(EventRecord {
                timestamp: at.to_rfc3339(),
                event: "persona_state_change",
                persona: Some(*change),
            })?,
        }
        Ok(())
    }

    pub fn steam_shutdown(&mut self, at: DateTime<Local>) -> Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(
                self.out,
                "[{}] Steam is shutting down",
                at.format("%H:%M:%S%.3f")
            )?,
            OutputFormat::Json => self.json_line(EventRecord {
                timestamp: at.to_rfc3339(),
                event: "steam_shutdown",
                persona: None,
            })?,
        }
        Ok(())
    }

    fn json_line(&mut self, record: EventRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, &record)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

/// `NAME|STATUS`, or `none` for an empty set
pub fn describe_flags(flags: PersonaStateChangeFlags) -> String {
    if flags.is_empty() {
        return "none".to_string();
    }
    flags
        .iter_names()
        .map(|(name, _)| name)
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use steamworks_bridge::SteamId;

    fn sample_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap()
    }

    fn sample_change() -> PersonaStateChange {
        PersonaStateChange {
            steam_id: SteamId::new(12345),
            change_flags: PersonaStateChangeFlags::NAME | PersonaStateChangeFlags::STATUS,
        }
    }

    #[test]
    fn test_text_output() {
        let mut reporter = EventReporter::new(OutputFormat::Text, Vec::new());
        reporter.persona_state_change(sample_time(), &sample_change()).unwrap();
        reporter.steam_shutdown(sample_time()).unwrap();
        assert_eq!(reporter.persona_changes(), 1);

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[12:30:15.000] 12345 changed: NAME|STATUS");
        assert_eq!(lines[1], "[12:30:15.000] Steam is shutting down");
    }

    #[test]
    fn test_json_output() {
        let mut reporter = EventReporter::new(OutputFormat::Json, Vec::new());
        reporter.persona_state_change(sample_time(), &sample_change()).unwrap();
        reporter.steam_shutdown(sample_time()).unwrap();

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        let records: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(records[0]["event"], "persona_state_change");
        assert_eq!(records[0]["persona"]["steam_id"], 12345);
        assert_eq!(records[1]["event"], "steam_shutdown");
        assert!(records[1].get("persona").is_none());
    }

    #[test]
    fn test_describe_flags() {
        assert_eq!(describe_flags(PersonaStateChangeFlags::empty()), "none");
        assert_eq!(describe_flags(PersonaStateChangeFlags::AVATAR), "AVATAR");
    }
}
