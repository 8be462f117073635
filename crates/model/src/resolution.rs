use std::fmt;
use std::str::FromStr;

use crate::ModelError;

/// Resolutions the chart widget offers in its toolbar.
pub const SUPPORTED_RESOLUTIONS: &[&str] = &[
    "1", "3", "5", "15", "30", "60", "120", "240", "360", "480", "720", "1D", "3D", "1W", "1M",
];

/// A chart bar resolution in the widget's vocabulary (`"15"`, `"1D"`, `"1W"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Minutes(u32),
    Days(u32),
    Weeks(u32),
    Months(u32),
}

impl Resolution {
    pub fn is_intraday(&self) -> bool {
        matches!(self, Resolution::Minutes(_))
    }

    /// Bar width in minutes for sub-daily resolutions.
    pub fn intraday_minutes(&self) -> Option<u32> {
        match self {
            Resolution::Minutes(m) => Some(*m),
            _ => None,
        }
    }

    /// Kline interval understood by the exchange; unknown widths fall back to `1d`.
    pub fn exchange_interval(&self) -> &'static str {
        match self {
            Resolution::Minutes(1) => "1m",
            Resolution::Minutes(3) => "3m",
            Resolution::Minutes(5) => "5m",
            Resolution::Minutes(15) => "15m",
            Resolution::Minutes(30) => "30m",
            Resolution::Minutes(60) => "1h",
            Resolution::Minutes(120) => "2h",
            Resolution::Minutes(240) => "4h",
            Resolution::Minutes(360) => "6h",
            Resolution::Minutes(480) => "8h",
            Resolution::Minutes(720) => "12h",
            Resolution::Days(1) => "1d",
            Resolution::Days(3) => "3d",
            Resolution::Weeks(1) => "1w",
            Resolution::Months(1) => "1M",
            _ => "1d",
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Days(1)
    }
}

impl FromStr for Resolution {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let invalid = || ModelError::UnsupportedResolution(raw.to_string());

        let (count, ctor): (&str, fn(u32) -> Resolution) = match trimmed.chars().last() {
            Some('D') => (&trimmed[..trimmed.len() - 1], Resolution::Days),
            Some('W') => (&trimmed[..trimmed.len() - 1], Resolution::Weeks),
            Some('M') => (&trimmed[..trimmed.len() - 1], Resolution::Months),
            Some(c) if c.is_ascii_digit() => (trimmed, Resolution::Minutes),
            _ => return Err(invalid()),
        };

        // "D", "W" and "M" alone mean a single unit.
        let count = if count.is_empty() {
            1
        } else {
            count.parse::<u32>().map_err(|_| invalid())?
        };
        if count == 0 {
            return Err(invalid());
        }
        Ok(ctor(count))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Minutes(m) => write!(f, "{m}"),
            Resolution::Days(d) => write!(f, "{d}D"),
            Resolution::Weeks(w) => write!(f, "{w}W"),
            Resolution::Months(m) => write!(f, "{m}M"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_toolbar_resolution() {
        for raw in SUPPORTED_RESOLUTIONS {
            let parsed: Resolution = raw.parse().expect("toolbar resolution should parse");
            assert_eq!(parsed.to_string(), *raw);
        }
    }

    #[test]
    fn bare_unit_letters_mean_one_unit() {
        assert_eq!("D".parse::<Resolution>(), Ok(Resolution::Days(1)));
        assert_eq!("W".parse::<Resolution>(), Ok(Resolution::Weeks(1)));
        assert_eq!("M".parse::<Resolution>(), Ok(Resolution::Months(1)));
    }

    #[test]
    fn rejects_garbage_and_zero_widths() {
        assert!("".parse::<Resolution>().is_err());
        assert!("0".parse::<Resolution>().is_err());
        assert!("0D".parse::<Resolution>().is_err());
        assert!("1S".parse::<Resolution>().is_err());
        assert!("xD".parse::<Resolution>().is_err());
    }

    #[test]
    fn maps_to_exchange_intervals() {
        assert_eq!(Resolution::Minutes(60).exchange_interval(), "1h");
        assert_eq!(Resolution::Minutes(720).exchange_interval(), "12h");
        assert_eq!(Resolution::Weeks(1).exchange_interval(), "1w");
        assert_eq!(Resolution::Months(1).exchange_interval(), "1M");
        assert_eq!(Resolution::Minutes(7).exchange_interval(), "1d");
        assert!(Resolution::Minutes(15).is_intraday());
        assert!(!Resolution::Days(3).is_intraday());
    }
}
