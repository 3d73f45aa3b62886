use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Position in a chain's block stream.
///
/// A cursor always names the *next* block height a session has to process,
/// so a fresh session starting at height `h` has cursor `h` and a session
/// that finished block `h` has cursor `h + 1`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cursor(pub u64);

impl Cursor {
    pub fn height(self) -> u64 {
        self.0
    }

    /// Cursor immediately after `height`
    pub fn after(height: u64) -> Self {
        Cursor(height.saturating_add(1))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Cursor {
    fn from(height: u64) -> Self {
        Cursor(height)
    }
}

/// Inclusive range of block heights a finding was observed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorWindow {
    pub start: u64,
    pub end: u64,
}

impl CursorWindow {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn single(height: u64) -> Self {
        Self {
            start: height,
            end: height,
        }
    }
}

impl fmt::Display for CursorWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..={}", self.start, self.end)
        }
    }
}

/// Where a newly created session begins reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartPosition {
    /// Chain head at the time the session is created
    #[default]
    Latest,
    /// Explicit block height
    Height(u64),
}

impl fmt::Display for StartPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartPosition::Latest => write!(f, "latest"),
            StartPosition::Height(h) => write!(f, "{}", h),
        }
    }
}

impl Serialize for StartPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StartPosition::Latest => serializer.serialize_str("latest"),
            StartPosition::Height(h) => serializer.serialize_u64(*h),
        }
    }
}

impl<'de> Deserialize<'de> for StartPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Height(u64),
            Keyword(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Height(h) => Ok(StartPosition::Height(h)),
            Raw::Keyword(k) if k.eq_ignore_ascii_case("latest") => Ok(StartPosition::Latest),
            Raw::Keyword(k) => k.trim().parse::<u64>().map(StartPosition::Height).map_err(|_| {
                serde::de::Error::custom(format!(
                    "invalid start position '{}'; expected \"latest\" or a block height",
                    k
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_position_parsing() {
        let latest: StartPosition = serde_json::from_str("\"latest\"").unwrap();
        assert_eq!(latest, StartPosition::Latest);

        let height: StartPosition = serde_json::from_str("1200").unwrap();
        assert_eq!(height, StartPosition::Height(1200));

        let quoted: StartPosition = serde_json::from_str("\"77\"").unwrap();
        assert_eq!(quoted, StartPosition::Height(77));

        assert!(serde_json::from_str::<StartPosition>("\"genesis\"").is_err());
    }

    #[test]
    fn test_window_display() {
        assert_eq!(CursorWindow::single(5).to_string(), "5");
        assert_eq!(CursorWindow::new(9, 3).to_string(), "3..=9");
    }
}
