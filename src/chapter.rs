//! Chapter identity types.
//!
//! Chapter numbers come from site markup and are not always parseable; the
//! [`ChapterNumber`] enum keeps the unresolved case explicit instead of
//! falling back to a sentinel string.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordinal identifier of a chapter within a series.
///
/// Sites expose chapter numbers as strings or integers; anything that does not
/// parse as a decimal ordinal becomes [`ChapterNumber::Unresolved`]. Unresolved
/// chapters sort as ordinal 0, before every resolved chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChapterNumber {
    /// A parsed decimal chapter ordinal.
    Ordinal(u32),
    /// The chapter number could not be parsed from site data.
    Unresolved,
}

impl ChapterNumber {
    /// Sort key: unresolved values are treated as ordinal 0 and placed before
    /// a genuine chapter 0.
    fn sort_key(self) -> (u32, u8) {
        match self {
            Self::Unresolved => (0, 0),
            Self::Ordinal(n) => (n, 1),
        }
    }
}

impl Ord for ChapterNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for ChapterNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinal(n) => write!(f, "{n}"),
            Self::Unresolved => write!(f, "Unknown"),
        }
    }
}

impl FromStr for ChapterNumber {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.trim()
            .parse::<u32>()
            .map_or(Self::Unresolved, Self::Ordinal))
    }
}

impl From<u32> for ChapterNumber {
    fn from(n: u32) -> Self {
        Self::Ordinal(n)
    }
}

// Persisted as the string form so the progress file matches what sites (and
// older files) store. Deserialization also accepts bare integers.
impl Serialize for ChapterNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct ChapterNumberVisitor;

impl Visitor<'_> for ChapterNumberVisitor {
    type Value = ChapterNumber;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a chapter number string or integer")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(value.parse().unwrap_or(ChapterNumber::Unresolved))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(u32::try_from(value)
            .map_or(ChapterNumber::Unresolved, ChapterNumber::Ordinal))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(u32::try_from(value)
            .map_or(ChapterNumber::Unresolved, ChapterNumber::Ordinal))
    }
}

impl<'de> Deserialize<'de> for ChapterNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ChapterNumberVisitor)
    }
}

/// One chapter as resolved by the catalog.
///
/// Immutable once resolved; identity is `(series, number)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Ordinal identifier within the series.
    pub number: ChapterNumber,
    /// Human-readable chapter title from the catalog listing.
    pub display_text: String,
    /// Locator of the chapter's image-listing endpoint.
    pub source_locator: String,
}

impl Chapter {
    /// Creates a new chapter.
    #[must_use]
    pub fn new(
        number: ChapterNumber,
        display_text: impl Into<String>,
        source_locator: impl Into<String>,
    ) -> Self {
        Self {
            number,
            display_text: display_text.into(),
            source_locator: source_locator.into(),
        }
    }
}

/// Sorts chapters into reading order by their number.
///
/// The sort is stable, so chapters with equal numbers (including multiple
/// unresolved ones) keep the catalog's original order.
pub fn sort_reading_order(chapters: &mut [Chapter]) {
    chapters.sort_by(|a, b| a.number.cmp(&b.number));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_string() {
        let number: ChapterNumber = "12".parse().unwrap();
        assert_eq!(number, ChapterNumber::Ordinal(12));
    }

    #[test]
    fn test_parse_garbage_is_unresolved() {
        let number: ChapterNumber = "extra".parse().unwrap();
        assert_eq!(number, ChapterNumber::Unresolved);
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(ChapterNumber::Ordinal(7).to_string(), "7");
        assert_eq!(ChapterNumber::Unresolved.to_string(), "Unknown");
    }

    #[test]
    fn test_unresolved_sorts_first() {
        let mut numbers = vec![
            ChapterNumber::Ordinal(3),
            ChapterNumber::Unresolved,
            ChapterNumber::Ordinal(0),
            ChapterNumber::Ordinal(1),
        ];
        numbers.sort();
        assert_eq!(
            numbers,
            vec![
                ChapterNumber::Unresolved,
                ChapterNumber::Ordinal(0),
                ChapterNumber::Ordinal(1),
                ChapterNumber::Ordinal(3),
            ]
        );
    }

    #[test]
    fn test_serde_string_form() {
        let json = serde_json::to_string(&ChapterNumber::Ordinal(12)).unwrap();
        assert_eq!(json, "\"12\"");
        let back: ChapterNumber = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChapterNumber::Ordinal(12));
    }

    #[test]
    fn test_serde_accepts_integers() {
        let number: ChapterNumber = serde_json::from_str("42").unwrap();
        assert_eq!(number, ChapterNumber::Ordinal(42));
    }

    #[test]
    fn test_serde_unknown_sentinel() {
        let number: ChapterNumber = serde_json::from_str("\"Unknown\"").unwrap();
        assert_eq!(number, ChapterNumber::Unresolved);
    }

    #[test]
    fn test_sort_reading_order_stable() {
        let mut chapters = vec![
            Chapter::new(ChapterNumber::Ordinal(2), "Chapter 2", "https://s/2"),
            Chapter::new(ChapterNumber::Unresolved, "Extra A", "https://s/a"),
            Chapter::new(ChapterNumber::Ordinal(1), "Chapter 1", "https://s/1"),
            Chapter::new(ChapterNumber::Unresolved, "Extra B", "https://s/b"),
        ];
        sort_reading_order(&mut chapters);
        assert_eq!(chapters[0].display_text, "Extra A");
        assert_eq!(chapters[1].display_text, "Extra B");
        assert_eq!(chapters[2].number, ChapterNumber::Ordinal(1));
        assert_eq!(chapters[3].number, ChapterNumber::Ordinal(2));
    }
}
