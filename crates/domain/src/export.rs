use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::document::{EditDocument, Entry};
use crate::error::DomainError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Srt,
    Vtt,
    Json,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Srt => write!(f, "srt"),
            Self::Vtt => write!(f, "vtt"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "srt" => Ok(Self::Srt),
            "vtt" => Ok(Self::Vtt),
            "json" => Ok(Self::Json),
            other => Err(DomainError::Validation(format!(
                "unsupported export format: {other}"
            ))),
        }
    }
}

/// Read-only projection of the current entries in display order.
pub fn render(document: &EditDocument, format: ExportFormat) -> DomainResult<String> {
    let entries = document.sorted_entries();
    match format {
        ExportFormat::Srt => Ok(render_srt(&entries)),
        ExportFormat::Vtt => Ok(render_vtt(&entries)),
        ExportFormat::Json => render_json(&entries),
    }
}

fn render_srt(entries: &[Entry]) -> String {
    let mut lines = Vec::new();
    for entry in entries {
        lines.push(entry.sequence.to_string());
        lines.push(format!(
            "{} --> {}",
            format_timestamp(entry.start_time_ms, ','),
            format_timestamp(entry.end_time_ms, ',')
        ));
        lines.push(entry.translated_text.clone());
        lines.push(String::new());
    }
    lines.join("\n")
}

fn render_vtt(entries: &[Entry]) -> String {
    let mut lines = vec!["WEBVTT".to_string(), String::new()];
    for entry in entries {
        lines.push(format!(
            "{} --> {}",
            format_timestamp(entry.start_time_ms, '.'),
            format_timestamp(entry.end_time_ms, '.')
        ));
        lines.push(entry.translated_text.clone());
        lines.push(String::new());
    }
    lines.join("\n")
}

fn render_json(entries: &[Entry]) -> DomainResult<String> {
    serde_json::to_string_pretty(entries)
        .map_err(|err| DomainError::Storage(format!("failed to encode entries: {err}")))
}

/// `HH:MM:SS<sep>mmm`, e.g. `00:00:01,000` for SRT or `00:00:01.000` for VTT.
fn format_timestamp(offset_ms: i64, millis_separator: char) -> String {
    let offset_ms = offset_ms.max(0);
    let hours = offset_ms / 3_600_000;
    let minutes = (offset_ms % 3_600_000) / 60_000;
    let seconds = (offset_ms % 60_000) / 1_000;
    let millis = offset_ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02}{millis_separator}{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentStatus, DocumentVersion};

    fn entry(id: &str, sequence: u32, start_ms: i64, end_ms: i64, text: &str) -> Entry {
        Entry {
            id: id.to_string(),
            sequence,
            start_time_ms: start_ms,
            end_time_ms: end_ms,
            original_text: format!("line {sequence}"),
            translated_text: text.to_string(),
            notes: String::new(),
            confidence_score: 0.9,
            lock: None,
            updated_by: String::new(),
            updated_at_ms: 0,
        }
    }

    fn document() -> EditDocument {
        // Entries deliberately out of display order.
        let entries = vec![
            entry("e2", 2, 2_000, 3_500, "Zweite Zeile"),
            entry("e1", 1, 250, 1_000, "Erste Zeile"),
        ];
        EditDocument {
            id: "doc1".to_string(),
            title: "Pilot".to_string(),
            project_id: "p1".to_string(),
            source_language: "en".to_string(),
            target_language: "de".to_string(),
            status: DocumentStatus::Draft,
            entries: entries.clone(),
            current_version_id: "v1".to_string(),
            versions: vec![DocumentVersion {
                id: "v1".to_string(),
                document_id: "doc1".to_string(),
                label: "initial".to_string(),
                parent_version_id: None,
                created_by: "u1".to_string(),
                created_at_ms: 0,
                snapshot: entries,
                change_summary: Vec::new(),
            }],
            comments: Vec::new(),
            change_log: Vec::new(),
            active_sessions: Vec::new(),
            created_by: "u1".to_string(),
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }

    #[test]
    fn timestamp_formats_hours_minutes_seconds_millis() {
        assert_eq!(format_timestamp(0, ','), "00:00:00,000");
        assert_eq!(format_timestamp(1_000, ','), "00:00:01,000");
        assert_eq!(format_timestamp(3_661_042, '.'), "01:01:01.042");
    }

    #[test]
    fn srt_renders_in_display_order() {
        let output = render(&document(), ExportFormat::Srt).unwrap();
        let expected = "1\n00:00:00,250 --> 00:00:01,000\nErste Zeile\n\n2\n00:00:02,000 --> 00:00:03,500\nZweite Zeile\n";
        assert_eq!(output, expected);
    }

    #[test]
    fn vtt_starts_with_header_and_uses_dot_separator() {
        let output = render(&document(), ExportFormat::Vtt).unwrap();
        assert!(output.starts_with("WEBVTT\n\n"));
        assert!(output.contains("00:00:00.250 --> 00:00:01.000"));
        assert!(!output.contains(','));
    }

    #[test]
    fn json_export_round_trips_entries() {
        let output = render(&document(), ExportFormat::Json).unwrap();
        let entries: Vec<Entry> = serde_json::from_str(&output).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "e1");
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("SRT".parse::<ExportFormat>().unwrap(), ExportFormat::Srt);
        assert!("docx".parse::<ExportFormat>().is_err());
    }
}
