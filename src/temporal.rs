// 🕒 Temporal Extraction - timestamps out of free-form chat lines
// Los exports de chat mezclan formatos; probamos cada layout en orden
// y nos quedamos con el primero que produce una fecha válida.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

/// How the captured digit groups map onto date components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateLayout {
    /// "15/03/2024, 10:30" or "15/03/2024 10:30:45"
    DayFirstSlash,
    /// "2024/03/15 10:30"
    YearFirstSlash,
    /// "[15/03/24, 10:30:45]" - bracketed export, two or four digit year
    BracketedExport,
}

/// Recognizes the timestamp formats seen in fleet chat exports.
pub struct TemporalExtractor {
    layouts: Vec<(Regex, DateLayout)>,
}

impl TemporalExtractor {
    pub fn new() -> Self {
        // Static patterns: a failure here is a programming error.
        let layouts = vec![
            (
                Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})[,\s]+(\d{1,2}):(\d{2})(?::\d{2})?")
                    .unwrap(),
                DateLayout::DayFirstSlash,
            ),
            (
                Regex::new(r"(\d{4})/(\d{1,2})/(\d{1,2})[,\s]+(\d{1,2}):(\d{2})(?::\d{2})?")
                    .unwrap(),
                DateLayout::YearFirstSlash,
            ),
            (
                Regex::new(r"\[(\d{1,2})/(\d{1,2})/(\d{2,4}),?\s+(\d{1,2}):(\d{2}):(\d{2})\]")
                    .unwrap(),
                DateLayout::BracketedExport,
            ),
        ];

        TemporalExtractor { layouts }
    }

    /// First timestamp found in the line, or None.
    /// Lines with impossible components (month 13, hour 25) yield None
    /// instead of a guessed date.
    pub fn extract(&self, text: &str) -> Option<NaiveDateTime> {
        for (pattern, layout) in &self.layouts {
            if let Some(caps) = pattern.captures(text) {
                if let Some(timestamp) = build_timestamp(&caps, *layout) {
                    return Some(timestamp);
                }
            }
        }
        None
    }
}

impl Default for TemporalExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn build_timestamp(caps: &regex::Captures, layout: DateLayout) -> Option<NaiveDateTime> {
    let num = |idx: usize| -> Option<u32> { caps.get(idx)?.as_str().parse().ok() };

    let (year, month, day, hour, minute) = match layout {
        DateLayout::DayFirstSlash => (num(3)?, num(2)?, num(1)?, num(4)?, num(5)?),
        DateLayout::YearFirstSlash => (num(1)?, num(2)?, num(3)?, num(4)?, num(5)?),
        DateLayout::BracketedExport => {
            let mut year = num(3)?;
            if year < 100 {
                year += 2000;
            }
            (year, num(2)?, num(1)?, num(4)?, num(5)?)
        }
    };

    // Seconds dropped: the pipeline works at minute precision.
    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    Some(date.and_time(time))
}

// ============================================================================
// TESTS
// ============================================================================
