// 📥 Ingest - raw lines out of chat exports and tabular dumps
// Cada fuente termina en el mismo Vec<RawLine>; el resto del pipeline
// no sabe ni le importa de dónde vino el texto.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// TYPES
// ============================================================================

/// One line of source text, with enough provenance to point an operator
/// back at the original file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLine {
    pub text: String,
    /// 1-based line number in the source file (header-adjusted for tabular).
    pub line_number: usize,
    pub source_label: String,
}

/// Where a batch of lines came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    ChatTranscript,
    Tabular,
    Manual,
}

impl SourceKind {
    pub fn name(&self) -> &str {
        match self {
            SourceKind::ChatTranscript => "Chat transcript",
            SourceKind::Tabular => "Tabular export",
            SourceKind::Manual => "Manual entry",
        }
    }

    /// Stable code for persistence.
    pub fn code(&self) -> &str {
        match self {
            SourceKind::ChatTranscript => "chat",
            SourceKind::Tabular => "tabular",
            SourceKind::Manual => "manual",
        }
    }

    pub fn from_code(code: &str) -> Option<SourceKind> {
        match code {
            "chat" => Some(SourceKind::ChatTranscript),
            "tabular" => Some(SourceKind::Tabular),
            "manual" => Some(SourceKind::Manual),
            _ => None,
        }
    }
}

// ============================================================================
// CHAT TRANSCRIPTS
// ============================================================================

/// Load a plain-text chat export. Blank lines are dropped, everything
/// else passes through untouched for the extractors to interpret.
pub fn load_transcript<P: AsRef<Path>>(path: P) -> Result<Vec<RawLine>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {}", path.display()))?;

    let label = file_label(path);
    let lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| RawLine {
            text: line.trim().to_string(),
            line_number: idx + 1,
            source_label: label.clone(),
        })
        .collect();

    Ok(lines)
}

// ============================================================================
// TABULAR EXPORTS
// ============================================================================

/// Row shape for CSV exports. Spanish headers are primary, English
/// aliases accepted for tools that re-export with translated headers.
#[derive(Debug, Deserialize)]
struct TabularRow {
    #[serde(alias = "date")]
    fecha: String,
    #[serde(alias = "time", default)]
    hora: String,
    #[serde(alias = "sender", default)]
    remitente: String,
    #[serde(alias = "message")]
    mensaje: String,
}

/// Load a CSV export, recomposing each row into the chat-line shape the
/// extractors already understand: "fecha hora - remitente: mensaje".
pub fn load_tabular<P: AsRef<Path>>(path: P) -> Result<Vec<RawLine>> {
    let path = path.as_ref();
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open tabular export: {}", path.display()))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let label = file_label(path);
    let mut lines = Vec::new();

    for (idx, row) in reader.deserialize().enumerate() {
        // Row 1 is the header, so data rows start at 2.
        let line_number = idx + 2;
        let row: TabularRow = row.with_context(|| {
            format!("Malformed row {} in {}", line_number, path.display())
        })?;

        let mut text = row.fecha.clone();
        if !row.hora.is_empty() {
            text.push(' ');
            text.push_str(&row.hora);
        }
        if !row.remitente.is_empty() {
            text.push_str(" - ");
            text.push_str(&row.remitente);
            text.push(':');
        }
        text.push(' ');
        text.push_str(&row.mensaje);

        lines.push(RawLine {
            text,
            line_number,
            source_label: label.clone(),
        });
    }

    Ok(lines)
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Pick the loader from the file extension. Anything that is not a CSV
/// is treated as a chat transcript.
pub fn detect_source_kind<P: AsRef<Path>>(path: P) -> SourceKind {
    let is_csv = path
        .as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        SourceKind::Tabular
    } else {
        SourceKind::ChatTranscript
    }
}

/// Load any supported source file.
pub fn load_lines<P: AsRef<Path>>(path: P) -> Result<(Vec<RawLine>, SourceKind)> {
    let kind = detect_source_kind(&path);
    let lines = match kind {
        SourceKind::Tabular => load_tabular(&path)?,
        _ => load_transcript(&path)?,
    };
    Ok((lines, kind))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("unknown")
        .to_string()
}

// ============================================================================
// TESTS
// ============================================================================
