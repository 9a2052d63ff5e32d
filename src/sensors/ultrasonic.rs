//! Ultrasonic range-finder log parser
//!
//! The rig prints one line per burst, `HH:MM:SS.ffffff -> <numbers>`, where the
//! payload holds either `(index, s1, s2)` triples or `(s1, s2)` pairs with
//! arbitrary junk between them. Only the line carries a timestamp; samples on
//! a line are spread evenly over the gap to the next line.

use std::path::Path;
use std::sync::OnceLock;

use chrono::{NaiveTime, Timelike};
use regex::Regex;
use serde::Serialize;

use crate::config::ParserConfig;
use crate::error::Result;
use crate::types::{RangeReading, RangeSeries, TimeSeries};

const SECONDS_PER_DAY: f64 = 86_400.0;
const TIME_FORMAT: &str = "%H:%M:%S%.f";
/// Two-decimal numbers first, then bare integers.
const NUMBER_PATTERN: &str = r"[-+]?\d+\.\d{2}|[-+]?\d+";

/// Parsed series plus line accounting.
#[derive(Clone, Debug, Serialize)]
pub struct ParseReport {
    /// `(relative_time_s, s1, s2)`, time zero at the first parsed line.
    pub series: RangeSeries,
    /// Lines that contained the separator.
    pub lines_seen: usize,
    pub lines_parsed: usize,
    /// Lines with the separator that were dropped (bad time, no numbers,
    /// token count not a multiple of 2 or 3).
    pub lines_skipped: usize,
}

impl ParseReport {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

struct LogLine {
    seconds: f64,
    points: Vec<RangeReading>,
}

pub struct UltrasonicLogParser {
    config: ParserConfig,
}

impl UltrasonicLogParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn parse_path(&self, path: &Path) -> Result<ParseReport> {
        let text = std::fs::read_to_string(path)?;
        let report = self.parse_str(&text);
        log::info!(
            "{}: {} samples from {}/{} lines",
            path.display(),
            report.series.len(),
            report.lines_parsed,
            report.lines_seen
        );
        Ok(report)
    }

    /// Parse a whole log. Never fails; an unusable log yields an empty series.
    pub fn parse_str(&self, text: &str) -> ParseReport {
        let mut lines = Vec::new();
        let mut lines_seen = 0;

        for raw in text.lines() {
            if !raw.contains(self.config.separator.as_str()) {
                continue;
            }
            lines_seen += 1;
            match self.parse_line(raw) {
                Some(line) => lines.push(line),
                None => log::debug!("skipping log line: {raw:?}"),
            }
        }

        let lines_parsed = lines.len();
        let lines_skipped = lines_seen - lines_parsed;
        if lines_skipped > 0 {
            log::warn!("{lines_skipped} of {lines_seen} log lines could not be parsed");
        }

        ParseReport {
            series: self.spread_timestamps(&lines),
            lines_seen,
            lines_parsed,
            lines_skipped,
        }
    }

    fn parse_line(&self, raw: &str) -> Option<LogLine> {
        let mut parts = raw.split(self.config.separator.as_str());
        let time_str = parts.next()?.trim();
        let mut content = parts.next()?.trim();

        let stripped;
        if !self.config.startup_marker.is_empty() && content.contains(self.config.startup_marker.as_str()) {
            stripped = content.replace(self.config.startup_marker.as_str(), "");
            content = stripped.trim();
        }

        let time = parse_clock(time_str)?;
        let seconds = time.num_seconds_from_midnight() as f64 + time.nanosecond() as f64 * 1e-9;

        let tokens = scan_numbers(content);
        let points = group_samples(&tokens)?;
        Some(LogLine { seconds, points })
    }

    fn spread_timestamps(&self, lines: &[LogLine]) -> RangeSeries {
        let mut samples = Vec::new();
        let mut line_start = 0.0;

        for (i, line) in lines.iter().enumerate() {
            let duration = match lines.get(i + 1) {
                Some(next) => {
                    let delta = next.seconds - line.seconds;
                    if delta < 0.0 {
                        delta + SECONDS_PER_DAY
                    } else {
                        delta
                    }
                }
                None => self.config.last_line_duration_s,
            };
            let step = duration / line.points.len().max(1) as f64;
            for (j, point) in line.points.iter().enumerate() {
                samples.push((line_start + j as f64 * step, *point));
            }
            // Accumulated rather than recomputed from the clock so the series
            // stays monotonic across midnight
            line_start += duration;
        }

        if samples.is_empty() {
            TimeSeries::empty()
        } else {
            TimeSeries::from_unsorted(samples)
        }
    }
}

impl Default for UltrasonicLogParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

/// Parse `HH:MM:SS.ffffff`. The fraction is required and holds one to six
/// digits (microsecond precision).
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    let (_, fraction) = text.split_once('.')?;
    if fraction.is_empty() || fraction.len() > 6 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveTime::parse_from_str(text, TIME_FORMAT).ok()
}

/// Group a token list into samples.
///
/// Triples `(index, s1, s2)` are tried before pairs `(s1, s2)`, so a count
/// divisible by six is always read as triples.
pub fn group_samples(tokens: &[f64]) -> Option<Vec<RangeReading>> {
    if tokens.is_empty() {
        return None;
    }
    if tokens.len() % 3 == 0 {
        Some(
            tokens
                .chunks_exact(3)
                .map(|c| RangeReading { s1: c[1], s2: c[2] })
                .collect(),
        )
    } else if tokens.len() % 2 == 0 {
        Some(
            tokens
                .chunks_exact(2)
                .map(|c| RangeReading { s1: c[0], s2: c[1] })
                .collect(),
        )
    } else {
        None
    }
}

/// Extract numbers left to right: optional sign, digits, and an optional
/// fraction of exactly two digits. Everything else separates tokens, so
/// `12.345` reads as `12.34` then `5` and `-7-8` as `-7`, `-8`.
pub fn scan_numbers(content: &str) -> Vec<f64> {
    let Some(pattern) = number_pattern() else {
        return Vec::new();
    };
    pattern
        .find_iter(content)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(NUMBER_PATTERN) {
            Ok(re) => Some(re),
            Err(e) => {
                log::error!("number pattern failed to compile: {e}");
                None
            }
        })
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_scan_numbers() {
        assert_eq!(scan_numbers("61.25/70.10"), vec![61.25, 70.10]);
        assert_eq!(scan_numbers("S1: 61 cm | S2: -3"), vec![1.0, 61.0, 2.0, -3.0]);
        assert_eq!(scan_numbers("12.345"), vec![12.34, 5.0]);
        assert_eq!(scan_numbers("1.5"), vec![1.0, 5.0]);
        assert_eq!(scan_numbers("-7-8+9"), vec![-7.0, -8.0, 9.0]);
        assert_eq!(scan_numbers("--- x ---"), Vec::<f64>::new());
        assert_eq!(scan_numbers("42."), vec![42.0]);
        assert_eq!(scan_numbers("+3.14x-0.50"), vec![3.14, -0.5]);
        assert!(number_pattern().is_some());
    }

    #[test]
    fn test_parse_clock_requires_microsecond_fraction() {
        let t = parse_clock("12:34:56.250000").unwrap();
        assert_eq!(t.num_seconds_from_midnight(), 45_296);
        assert_eq!(t.nanosecond(), 250_000_000);
        assert!(parse_clock("12:34:56.5").is_some());
        assert!(parse_clock("12:34:56").is_none());
        assert!(parse_clock("12:34:56.").is_none());
        assert!(parse_clock("12:34:56.1234567").is_none());
        assert!(parse_clock("12:34:56.12a456").is_none());
    }

    #[test]
    fn test_lines_without_fraction_are_skipped() {
        let parser = UltrasonicLogParser::default();
        let report = parser.parse_str("10:00:00 -> 60 70\n10:00:00.500000 -> 61 71\n");
        assert_eq!(report.lines_skipped, 1);
        assert_eq!(report.series.values(), &[RangeReading { s1: 61.0, s2: 71.0 }]);
    }

    #[test]
    fn test_group_samples() {
        let triples = group_samples(&[1.0, 60.0, 70.0, 2.0, 61.0, 71.0]).unwrap();
        assert_eq!(triples.len(), 2);
        assert_eq!(triples[1], RangeReading { s1: 61.0, s2: 71.0 });

        let pairs = group_samples(&[60.0, 70.0, 61.0, 71.0]).unwrap();
        assert_eq!(pairs[0], RangeReading { s1: 60.0, s2: 70.0 });

        assert!(group_samples(&[1.0, 2.0, 3.0, 4.0, 5.0]).is_none());
        assert!(group_samples(&[]).is_none());
    }

    #[test]
    fn test_six_tokens_read_as_triples() {
        let parser = UltrasonicLogParser::default();
        let report = parser.parse_str("00:00:00.000000 -> 1 2 3\n00:00:01.000000 -> 4 5 6\n");
        assert_eq!(report.series.len(), 2);
        assert_eq!(report.series.values()[0], RangeReading { s1: 2.0, s2: 3.0 });
        assert_eq!(report.series.values()[1], RangeReading { s1: 5.0, s2: 6.0 });
        assert_eq!(report.series.times(), &[0.0, 1.0]);
    }

    #[test]
    fn test_samples_spread_over_line_duration() {
        let parser = UltrasonicLogParser::default();
        let log = "\
12:00:00.000000 -> 60.00 70.00 61.00 71.00
12:00:01.000000 -> 62 72
";
        let report = parser.parse_str(log);
        assert_eq!(report.series.times(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_midnight_wrap() {
        let parser = UltrasonicLogParser::default();
        let log = "\
23:59:59.900000 -> 60 70
00:00:00.100000 -> 61 71
";
        let report = parser.parse_str(log);
        let times = report.series.times();
        assert_eq!(times.len(), 2);
        assert_abs_diff_eq!(times[1] - times[0], 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_startup_marker_and_bad_lines() {
        let parser = UltrasonicLogParser::default();
        let log = "\
boot noise without separator
10:00:00.000000 -> --- STARTED ---
10:00:00.500000 -> --- STARTED --- 60 70
not-a-time -> 61 71
10:00:01.000000 -> 1 2 3 4 5
10:00:01.500000 -> 62 72
";
        let report = parser.parse_str(log);
        assert_eq!(report.lines_seen, 5);
        assert_eq!(report.lines_parsed, 2);
        assert_eq!(report.lines_skipped, 3);
        assert_eq!(report.series.values()[0], RangeReading { s1: 60.0, s2: 70.0 });
        // Skipped lines do not cut the first line's duration short
        assert_eq!(report.series.times(), &[0.0, 1.0]);
    }

    #[test]
    fn test_empty_log_is_empty_not_error() {
        let parser = UltrasonicLogParser::default();
        let report = parser.parse_str("nothing here\n");
        assert!(report.is_empty());
        assert_eq!(report.lines_seen, 0);
    }
}
