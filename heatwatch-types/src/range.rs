//! Time range selectors.

use core::fmt;
use core::str::FromStr;
use core::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::PayloadError;

/// A user-selected window scoping the queried data, e.g. `"24h"` or `"7d"`.
///
/// The selector is opaque to the client: it is passed verbatim to the server
/// and compared for equality, nothing more. [`TimeRange::span`] offers a
/// best-effort interpretation for log output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TimeRange(String);

impl TimeRange {
    /// Create a time range from a selector string.
    ///
    /// The selector is trimmed and must be a non-empty run of ASCII
    /// letters and digits, since it ends up in a query string.
    pub fn new(selector: impl AsRef<str>) -> Result<Self, PayloadError> {
        let selector = selector.as_ref().trim();
        if selector.is_empty() || !selector.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PayloadError::InvalidRange(selector.to_string()));
        }
        Ok(Self(selector.to_string()))
    }

    /// The selector as sent to the server.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret `<N>m`, `<N>h`, `<N>d` and `<N>w` selectors as a duration.
    ///
    /// Returns `None` for anything else; such selectors are still valid.
    pub fn span(&self) -> Option<Duration> {
        let (digits, unit) = self.0.split_at(self.0.len() - 1);
        let n: u64 = digits.parse().ok()?;
        let secs = match unit {
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            "w" => 604_800,
            _ => return None,
        };
        n.checked_mul(secs).map(Duration::from_secs)
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self("24h".to_string())
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TimeRange {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for TimeRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TimeRange::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_and_accepts_selectors() {
        assert_eq!(TimeRange::new(" 7d ").unwrap().as_str(), "7d");
        assert_eq!(TimeRange::new("all").unwrap().as_str(), "all");
    }

    #[test]
    fn test_new_rejects_bad_selectors() {
        assert!(TimeRange::new("").is_err());
        assert!(TimeRange::new("   ").is_err());
        assert!(TimeRange::new("24h&x=1").is_err());
        assert!(TimeRange::new("-1h").is_err());
    }

    #[test]
    fn test_span() {
        assert_eq!(TimeRange::new("1h").unwrap().span(), Some(Duration::from_secs(3_600)));
        assert_eq!(TimeRange::new("30d").unwrap().span(), Some(Duration::from_secs(30 * 86_400)));
        assert_eq!(TimeRange::new("15m").unwrap().span(), Some(Duration::from_secs(900)));
        assert_eq!(TimeRange::new("h").unwrap().span(), None);
        assert_eq!(TimeRange::new("all").unwrap().span(), None);
    }

    #[test]
    fn test_default_is_one_day() {
        assert_eq!(TimeRange::default().as_str(), "24h");
        assert_eq!(TimeRange::default().span(), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_serde_as_plain_string() {
        let range: TimeRange = serde_json::from_str("\"7d\"").unwrap();
        assert_eq!(range.as_str(), "7d");
        assert_eq!(serde_json::to_string(&range).unwrap(), "\"7d\"");
        assert!(serde_json::from_str::<TimeRange>("\"\"").is_err());
    }
}
