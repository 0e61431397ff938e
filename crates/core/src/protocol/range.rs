//! `Range:` header parsing (RFC 2326 §12.29).
//!
//! Three time formats are accepted:
//!
//! - `npt=<start>[-<end>]` — normal play time, seconds or `H:M:S[.f]`;
//!   `npt=now` leaves both ends open.
//! - `smpte=<start>[-<end>]` — `H:M:S[:frames]`; the frame subunit is
//!   accepted but dropped (seconds resolution). A trailing `;time=…`
//!   parameter is ignored.
//! - `clock=<ISO-UTC>[-<ISO-UTC>]` — absolute wall-clock times of the
//!   form `YYYYMMDDTHHMMSS[.f]Z`, converted to signed offsets in seconds
//!   from the current UTC instant (past dates positive, future negative).

use chrono::{DateTime, NaiveDateTime, Utc};

/// A parsed `Range:` header.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeHeader {
    /// Start position in seconds; `None` means "from now".
    pub start: Option<f64>,
    /// End position in seconds; `None` means open-ended.
    pub end: Option<f64>,
    /// Canonical value echoed back in the PLAY response.
    pub normalized: String,
}

impl RangeHeader {
    /// Parse a `Range:` header value. Returns `None` on any format the
    /// server does not understand; the caller maps that to 400.
    pub fn parse(value: &str) -> Option<Self> {
        Self::parse_at(value, Utc::now())
    }

    // Split out so tests can pin "now".
    fn parse_at(value: &str, now: DateTime<Utc>) -> Option<Self> {
        // Any ";time=…" (or other) parameter is not part of the range.
        let value = value.trim().split(';').next()?.trim();

        if let Some(times) = value.strip_prefix("npt=") {
            if times.trim() == "now" {
                return Some(Self {
                    start: None,
                    end: None,
                    normalized: "npt=now".to_string(),
                });
            }
            let (start, end) = split_range(times)?;
            let start = Some(parse_npt_time(start?)?);
            let end = match end {
                Some(e) => Some(parse_npt_time(e)?),
                None => None,
            };
            return Some(Self {
                start,
                end,
                normalized: normalize_npt(start, end),
            });
        }

        if let Some(times) = value.strip_prefix("smpte=") {
            let (start, end) = split_range(times)?;
            let start = Some(parse_smpte_time(start?)?);
            let end = match end {
                Some(e) => Some(parse_smpte_time(e)?),
                None => None,
            };
            return Some(Self {
                start,
                end,
                normalized: value.to_string(),
            });
        }

        if let Some(times) = value.strip_prefix("clock=") {
            let (start, end) = split_range(times)?;
            let start_date = parse_clock_date(start?)?;
            let start = Some((now - start_date).num_milliseconds() as f64 / 1000.0);
            let end = match end {
                Some(e) => {
                    let end_date = parse_clock_date(e)?;
                    Some((now - end_date).num_milliseconds() as f64 / 1000.0)
                }
                None => None,
            };
            return Some(Self {
                start,
                end,
                normalized: value.to_string(),
            });
        }

        None
    }
}

/// `"a-b"` → `(Some("a"), Some("b"))`; `"a-"` → `(Some("a"), None)`.
fn split_range(times: &str) -> Option<(Option<&str>, Option<&str>)> {
    let times = times.trim();
    if times.is_empty() {
        return None;
    }
    match times.split_once('-') {
        Some((start, end)) => {
            let start = Some(start.trim()).filter(|s| !s.is_empty());
            let end = Some(end.trim()).filter(|s| !s.is_empty());
            Some((start, end))
        }
        None => Some((Some(times), None)),
    }
}

/// NPT time: decimal seconds or `H:M:S[.f]` (RFC 2326 §3.6).
fn parse_npt_time(token: &str) -> Option<f64> {
    let parts: Vec<&str> = token.split(':').collect();
    match parts.len() {
        1 => parts[0].parse::<f64>().ok().filter(|v| *v >= 0.0),
        3 => {
            let hours = parts[0].parse::<f64>().ok()?;
            let minutes = parts[1].parse::<f64>().ok()?;
            let seconds = parts[2].parse::<f64>().ok()?;
            Some(hours * 3600.0 + minutes * 60.0 + seconds)
        }
        _ => None,
    }
}

/// SMPTE timestamp `H:M:S[:frames]` at seconds resolution (RFC 2326 §3.5).
fn parse_smpte_time(token: &str) -> Option<f64> {
    let parts: Vec<&str> = token.split(':').collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let hours = parts[0].parse::<f64>().ok()?;
    let minutes = parts[1].parse::<f64>().ok()?;
    let seconds = parts[2].parse::<f64>().ok()?;
    if parts.len() == 4 {
        parts[3].parse::<u32>().ok()?;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// ISO UTC timestamp `YYYYMMDDTHHMMSS[.f]Z` (RFC 2326 §3.7).
fn parse_clock_date(token: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(token, "%Y%m%dT%H%M%S%.fZ")
        .or_else(|_| NaiveDateTime::parse_from_str(token, "%Y%m%dT%H%M%SZ"))
        .ok()?;
    Some(naive.and_utc())
}

fn normalize_npt(start: Option<f64>, end: Option<f64>) -> String {
    let start = start.unwrap_or(0.0);
    match end {
        Some(end) => format!("npt={:.3}-{:.3}", start, end),
        None => format!("npt={:.3}-", start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npt_seconds() {
        let range = RangeHeader::parse("npt=0.000-").unwrap();
        assert_eq!(range.start, Some(0.0));
        assert_eq!(range.end, None);
        assert_eq!(range.normalized, "npt=0.000-");
    }

    #[test]
    fn npt_start_and_end() {
        let range = RangeHeader::parse("npt=12.5-30").unwrap();
        assert_eq!(range.start, Some(12.5));
        assert_eq!(range.end, Some(30.0));
        assert_eq!(range.normalized, "npt=12.500-30.000");
    }

    #[test]
    fn npt_hms() {
        let range = RangeHeader::parse("npt=1:02:03.5-").unwrap();
        assert_eq!(range.start, Some(3723.5));
    }

    #[test]
    fn npt_now_is_open() {
        let range = RangeHeader::parse("npt=now").unwrap();
        assert_eq!(range.start, None);
        assert_eq!(range.end, None);
    }

    #[test]
    fn smpte_drops_frames_and_time_param() {
        let range = RangeHeader::parse("smpte=0:10:00:12-0:20:00;time=19970123T153600Z").unwrap();
        assert_eq!(range.start, Some(600.0));
        assert_eq!(range.end, Some(1200.0));
    }

    #[test]
    fn clock_offsets_are_signed() {
        let now = parse_clock_date("20250601T120000Z").unwrap();
        let range = RangeHeader::parse_at("clock=20250601T115950Z-20250601T120030Z", now).unwrap();
        // 10 s in the past → positive; 30 s in the future → negative.
        assert_eq!(range.start, Some(10.0));
        assert_eq!(range.end, Some(-30.0));
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(RangeHeader::parse("frames=0-100").is_none());
        assert!(RangeHeader::parse("npt=abc-").is_none());
        assert!(RangeHeader::parse("smpte=1:2").is_none());
    }
}
