//! Sensor severity levels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity produced by a sensor run.
///
/// `Ok` and `Info` never alert. `Unknown` is not part of the numeric
/// worseness scale: it means the run could not determine a status, and it is
/// treated as at least as severe as `Critical` for alerting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensorStatus {
    #[default]
    Ok,
    Info,
    Warning,
    Critical,
    Unknown,
}

impl SensorStatus {
    /// All statuses, in display order.
    pub const ALL: [Self; 5] = [
        Self::Ok,
        Self::Info,
        Self::Warning,
        Self::Critical,
        Self::Unknown,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Process exit code / alerting-pipeline status code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok | Self::Info => 0,
            Self::Warning => 1,
            Self::Critical => 2,
            Self::Unknown => 3,
        }
    }

    /// Whether this status should be surfaced to operators.
    #[must_use]
    pub const fn is_alerting(self) -> bool {
        matches!(self, Self::Warning | Self::Critical | Self::Unknown)
    }

    /// Rank on the worseness scale. `Ok` and `Info` share the bottom rank;
    /// `Unknown` ranks with `Critical`.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Ok | Self::Info => 0,
            Self::Warning => 1,
            Self::Critical | Self::Unknown => 2,
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown sensor status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(SensorStatus::Ok.code(), 0);
        assert_eq!(SensorStatus::Info.code(), 0);
        assert_eq!(SensorStatus::Warning.code(), 1);
        assert_eq!(SensorStatus::Critical.code(), 2);
        assert_eq!(SensorStatus::Unknown.code(), 3);
    }

    #[test]
    fn test_unknown_ranks_with_critical() {
        assert_eq!(SensorStatus::Unknown.rank(), SensorStatus::Critical.rank());
        assert!(SensorStatus::Warning.rank() > SensorStatus::Info.rank());
        assert_eq!(SensorStatus::Ok.rank(), SensorStatus::Info.rank());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("critical".parse::<SensorStatus>(), Ok(SensorStatus::Critical));
        assert_eq!(" Warning ".parse::<SensorStatus>(), Ok(SensorStatus::Warning));
        assert!("bogus".parse::<SensorStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_uppercase_names() {
        let json = serde_json::to_string(&SensorStatus::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
        let parsed: SensorStatus = serde_json::from_str("\"UNKNOWN\"").unwrap();
        assert_eq!(parsed, SensorStatus::Unknown);
    }
}
