use chrono::NaiveDate;

/// Years strictly above this are assumed to be Buddhist era when parsing a
/// display string. Stored data predating the Buddhist-era rollout may carry
/// Gregorian years, so the threshold keeps those readable. Known limitation:
/// a genuine Gregorian year above 2400 (or Buddhist below it) would convert
/// wrong; neither occurs in practice.
pub const BUDDHIST_YEAR_THRESHOLD: i32 = 2400;

pub const BUDDHIST_ERA_OFFSET: i32 = 543;

/// A pure calendar date. `year` is always held as Gregorian; the Buddhist
/// era exists only at the display-string boundary. No timezone, not an
/// instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThaiDate {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

impl ThaiDate {
    pub fn new(day: u32, month: u32, year: i32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)?;
        Some(ThaiDate { day, month, year })
    }

    /// Parses a `DD/MM/YYYY` display string. A year above the threshold is
    /// treated as Buddhist and shifted back to Gregorian; anything else is
    /// kept as-is (older records stored Gregorian years in the same slot).
    pub fn parse_display(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        if parts.len() != 3 {
            return None;
        }
        if parts[0].len() > 2 || parts[2].len() != 4 {
            return None;
        }
        let day: u32 = parts[0].parse().ok()?;
        let month: u32 = parts[1].parse().ok()?;
        let mut year: i32 = parts[2].parse().ok()?;
        if year > BUDDHIST_YEAR_THRESHOLD {
            year -= BUDDHIST_ERA_OFFSET;
        }
        Self::new(day, month, year)
    }

    /// Parses an ISO `YYYY-MM-DD` string. ISO strings only ever come from
    /// date pickers, which are always Gregorian, so no era heuristic here.
    pub fn parse_iso(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.trim().split('-').collect();
        if parts.len() != 3 {
            return None;
        }
        let year: i32 = parts[0].parse().ok()?;
        let month: u32 = parts[1].parse().ok()?;
        let day: u32 = parts[2].parse().ok()?;
        Self::new(day, month, year)
    }

    pub fn iso(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    pub fn display(&self) -> String {
        format!(
            "{:02}/{:02}/{}",
            self.day,
            self.month,
            self.year + BUDDHIST_ERA_OFFSET
        )
    }

    pub fn buddhist_year(&self) -> i32 {
        self.year + BUDDHIST_ERA_OFFSET
    }
}

/// `DD/MM/YYYY` (Buddhist or legacy Gregorian) to ISO `YYYY-MM-DD`.
/// Malformed input yields `""`; this must never fail a whole page render.
pub fn to_iso(buddhist: &str) -> String {
    ThaiDate::parse_display(buddhist)
        .map(|d| d.iso())
        .unwrap_or_default()
}

/// ISO `YYYY-MM-DD` to Buddhist `DD/MM/YYYY`. The era offset is added
/// unconditionally; see `parse_iso`. Malformed input yields `""`.
pub fn to_buddhist(iso: &str) -> String {
    ThaiDate::parse_iso(iso)
        .map(|d| d.display())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_gregorian_date() {
        assert_eq!(to_buddhist("2024-03-15"), "15/03/2567");
        assert_eq!(to_iso("15/03/2567"), "2024-03-15");
        assert_eq!(to_iso(&to_buddhist("2024-03-15")), "2024-03-15");
    }

    #[test]
    fn legacy_gregorian_year_kept() {
        // Year at or below the threshold is assumed already Gregorian.
        assert_eq!(to_iso("15/03/2024"), "2024-03-15");
    }

    #[test]
    fn buddhist_year_shifted() {
        assert_eq!(to_iso("01/01/2500"), "1957-01-01");
    }

    #[test]
    fn malformed_inputs_yield_empty() {
        for s in [
            "",
            "15/03",
            "15/03/2567/9",
            "aa/bb/cccc",
            "15-03-2567",
            "123/03/2567",
            "15/03/67",
        ] {
            assert_eq!(to_iso(s), "", "input {:?}", s);
        }
        for s in ["", "2024-03", "2024/03/15", "yyyy-mm-dd", "2024-13-01"] {
            assert_eq!(to_buddhist(s), "", "input {:?}", s);
        }
    }

    #[test]
    fn impossible_calendar_date_rejected() {
        assert_eq!(to_iso("31/02/2567"), "");
        assert_eq!(to_buddhist("2023-02-29"), "");
    }

    #[test]
    fn leap_day_round_trip() {
        assert_eq!(to_buddhist("2024-02-29"), "29/02/2567");
        assert_eq!(to_iso("29/02/2567"), "2024-02-29");
    }
}
