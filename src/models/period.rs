use chrono::{DateTime, Duration, Utc};

/// Symbolic lookback window used by the price and stats queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
    Quarter,
    Year,
    All,
}

impl Period {
    /// Parse from the `period` query parameter (case-insensitive).
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "quarter" => Ok(Period::Quarter),
            "year" => Ok(Period::Year),
            "all" => Ok(Period::All),
            _ => Err(format!(
                "Invalid period: {}. Valid options: day, week, month, quarter, year, all",
                s
            )),
        }
    }

    /// Lookback in days, `None` for the unbounded window.
    pub fn lookback_days(&self) -> Option<i64> {
        match self {
            Period::Day => Some(1),
            Period::Week => Some(7),
            Period::Month => Some(30),
            Period::Quarter => Some(90),
            Period::Year => Some(365),
            Period::All => None,
        }
    }

    /// Cutoff timestamp relative to `now`, `None` for the unbounded window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lookback_days().map(|days| now - Duration::days(days))
    }
}

impl Default for Period {
    fn default() -> Self {
        Period::Day
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parsing() {
        assert_eq!(Period::from_str("day").unwrap(), Period::Day);
        assert_eq!(Period::from_str("QUARTER").unwrap(), Period::Quarter);
        assert_eq!(Period::from_str("all").unwrap(), Period::All);
        assert!(Period::from_str("fortnight").is_err());
    }

    #[test]
    fn test_lookback_days() {
        assert_eq!(Period::Day.lookback_days(), Some(1));
        assert_eq!(Period::Week.lookback_days(), Some(7));
        assert_eq!(Period::Year.lookback_days(), Some(365));
        assert_eq!(Period::All.lookback_days(), None);
        assert!(Period::All.cutoff(Utc::now()).is_none());
    }
}
