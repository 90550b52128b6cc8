//! TN ranges and the range codec.
//!
//! - `TnRange` is a closed run of stations on one prefix; a single TN is
//!   the degenerate range `start == end`.
//! - `TnSelection` is what an inbound document addresses: one TN, one
//!   range, or a non-contiguous list of ranges.
//! - `expand` / `expand_list` / `collapse` convert between ranges and
//!   individual TNs.

use crate::error::ValidationError;
use crate::tn::{MAX_STATION, TelephoneNumber, TnPrefix, tn_re};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct TnRange {
    start: TelephoneNumber,
    end_station: u16,
}

impl TnRange {
    pub fn single(tn: TelephoneNumber) -> Self {
        Self {
            start: tn,
            end_station: tn.station(),
        }
    }

    /// Range from a start TN and a closing station on the same prefix.
    pub fn new(start: TelephoneNumber, end_station: u16) -> Result<Self, ValidationError> {
        if end_station > MAX_STATION {
            return Err(ValidationError::MalformedRange(format!(
                "{start}-{end_station}"
            )));
        }
        if end_station < start.station() {
            return Err(ValidationError::ReversedRange {
                start: start.station(),
                end: end_station,
            });
        }
        Ok(Self { start, end_station })
    }

    pub fn between(start: TelephoneNumber, end: TelephoneNumber) -> Result<Self, ValidationError> {
        if start.prefix() != end.prefix() {
            return Err(ValidationError::SpansPrefixes {
                start: start.prefix().to_string(),
                end: end.prefix().to_string(),
            });
        }
        Self::new(start, end.station())
    }

    /// The range a notification addresses with a start TN and `count`
    /// registry object ids, one per consecutive station.
    pub fn from_object_count(
        start: TelephoneNumber,
        count: usize,
    ) -> Result<Self, ValidationError> {
        if count == 0 {
            return Err(ValidationError::EmptySelection);
        }
        let end = start
            .offset(count - 1)
            .ok_or_else(|| ValidationError::StationOverflow {
                start: start.to_string(),
                count,
            })?;
        Ok(Self {
            start,
            end_station: end.station(),
        })
    }

    pub fn prefix(&self) -> TnPrefix {
        self.start.prefix()
    }

    pub fn start_tn(&self) -> TelephoneNumber {
        self.start
    }

    pub fn end_tn(&self) -> TelephoneNumber {
        TelephoneNumber::new(self.start.prefix(), self.end_station).unwrap_or(self.start)
    }

    pub fn start_station(&self) -> u16 {
        self.start.station()
    }

    pub fn end_station(&self) -> u16 {
        self.end_station
    }

    pub fn len(&self) -> usize {
        usize::from(self.end_station - self.start.station()) + 1
    }

    /// A range always holds at least its start TN.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn is_single(&self) -> bool {
        self.end_station == self.start.station()
    }

    pub fn contains(&self, tn: &TelephoneNumber) -> bool {
        tn.prefix() == self.prefix()
            && tn.station() >= self.start.station()
            && tn.station() <= self.end_station
    }

    pub fn iter(&self) -> TnIter {
        TnIter {
            next: Some(self.start),
            end_station: self.end_station,
        }
    }

    pub fn parts(&self) -> TnParts {
        let prefix = self.prefix();
        let start = format!("{:04}", self.start.station());
        let dashx = start[..1].to_string();
        TnParts {
            npa: prefix.npa(),
            nxx: prefix.nxx(),
            npa_nxx: format!("{}{}", prefix.npa(), prefix.nxx()),
            npa_nxx_x: format!("{}{}{}", prefix.npa(), prefix.nxx(), dashx),
            dashx,
            start_tn: self.start.to_string(),
            end_tn: self.end_tn().to_string(),
            end_station: format!("{:04}", self.end_station),
        }
    }
}

impl Display for TnRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{:04}", self.start, self.end_station)
        }
    }
}

/// Parses either `NNN-NNN-NNNN` or `NNN-NNN-NNNN-NNNN`.
impl FromStr for TnRange {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if tn_re().is_match(s) {
            return Ok(Self::single(s.parse()?));
        }
        let malformed = || ValidationError::MalformedRange(s.to_string());
        let (head, tail) = s.rsplit_once('-').ok_or_else(malformed)?;
        if tail.len() != 4 || !tail.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let start: TelephoneNumber = head.parse().map_err(|_| malformed())?;
        let end_station = tail.parse::<u16>().map_err(|_| malformed())?;
        Self::new(start, end_station)
    }
}

impl TryFrom<String> for TnRange {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TnRange> for String {
    fn from(range: TnRange) -> Self {
        range.to_string()
    }
}

impl IntoIterator for &TnRange {
    type Item = TelephoneNumber;
    type IntoIter = TnIter;

    fn into_iter(self) -> TnIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct TnIter {
    next: Option<TelephoneNumber>,
    end_station: u16,
}

impl Iterator for TnIter {
    type Item = TelephoneNumber;

    fn next(&mut self) -> Option<TelephoneNumber> {
        let current = self.next?;
        self.next = if current.station() < self.end_station {
            current.offset(1)
        } else {
            None
        };
        Some(current)
    }
}

/// Textual decomposition of a range used by downstream field population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TnParts {
    pub npa: String,
    pub nxx: String,
    pub npa_nxx: String,
    /// First digit of the start station.
    pub dashx: String,
    pub npa_nxx_x: String,
    pub start_tn: String,
    pub end_tn: String,
    pub end_station: String,
}

/// The set of TNs an inbound document addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TnSelection {
    Single(TelephoneNumber),
    Range(TnRange),
    List(Vec<TnRange>),
}

impl TnSelection {
    /// Submitted elements in input order. A single TN is a one-station range.
    pub fn elements(&self) -> Vec<TnRange> {
        match self {
            Self::Single(tn) => vec![TnRange::single(*tn)],
            Self::Range(range) => vec![*range],
            Self::List(ranges) => ranges.clone(),
        }
    }

    pub fn expand(&self) -> Vec<TelephoneNumber> {
        expand_list(&self.elements())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::List(ranges) if ranges.is_empty() => Err(ValidationError::EmptySelection),
            _ => Ok(()),
        }
    }
}

/// Every TN in `range`, ascending.
pub fn expand(range: &TnRange) -> Vec<TelephoneNumber> {
    range.iter().collect()
}

/// Per-range expansion concatenated in input order. Duplicates survive.
pub fn expand_list(ranges: &[TnRange]) -> Vec<TelephoneNumber> {
    ranges.iter().flat_map(TnRange::iter).collect()
}

/// Sort, dedupe, then merge runs of consecutive stations on one prefix.
pub fn collapse(tns: impl IntoIterator<Item = TelephoneNumber>) -> Vec<TnRange> {
    let mut tns: Vec<TelephoneNumber> = tns.into_iter().collect();
    tns.sort_unstable();
    tns.dedup();

    let mut ranges: Vec<TnRange> = Vec::new();
    let mut iter = tns.into_iter();
    let Some(first) = iter.next() else {
        return ranges;
    };
    let mut start = first;
    let mut last = first;
    for tn in iter {
        if last.precedes(&tn) {
            last = tn;
            continue;
        }
        ranges.push(TnRange {
            start,
            end_station: last.station(),
        });
        start = tn;
        last = tn;
    }
    ranges.push(TnRange {
        start,
        end_station: last.station(),
    });
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tn(text: &str) -> TelephoneNumber {
        text.parse()
            .unwrap_or_else(|e| panic!("fixture tn {text} should parse: {e}"))
    }

    fn range(text: &str) -> TnRange {
        text.parse()
            .unwrap_or_else(|e| panic!("fixture range {text} should parse: {e}"))
    }

    #[test]
    fn collapse_merges_consecutive_stations() {
        let ranges = collapse([tn("530-012-8393"), tn("530-012-8391"), tn("530-012-8392")]);
        insta::assert_json_snapshot!(ranges, @r#"
        [
          "530-012-8391-8393"
        ]
        "#);
    }

    #[test]
    fn collapse_edges() {
        assert!(collapse(Vec::new()).is_empty());
        assert_eq!(collapse([tn("530-012-0001")]), vec![range("530-012-0001")]);

        let ranges = collapse([
            tn("530-012-9999"),
            tn("530-013-0000"),
            tn("530-012-0005"),
            tn("530-012-0005"),
            tn("530-012-0007"),
        ]);
        assert_eq!(
            ranges.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["530-012-0005", "530-012-0007", "530-012-9999", "530-013-0000"]
        );
    }

    #[test]
    fn single_tn_range_has_one_member() {
        let single = range("530-012-0005");
        assert_eq!(single.len(), 1);
        assert!(!single.is_empty());
        assert_eq!(single.iter().count(), single.len());
        assert_eq!(range("530-012-0005-0009").len(), 5);
    }

    #[test]
    fn expand_list_keeps_input_order_and_duplicates() {
        let tns = expand_list(&[
            range("530-012-0005-0006"),
            range("530-012-0001-0002"),
            range("530-012-0005"),
        ]);
        assert_eq!(
            tns.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![
                "530-012-0005",
                "530-012-0006",
                "530-012-0001",
                "530-012-0002",
                "530-012-0005"
            ]
        );
    }

    #[test]
    fn parses_range_text() {
        let parsed = range("530-012-8391-8393");
        assert_eq!(parsed.start_tn(), tn("530-012-8391"));
        assert_eq!(parsed.end_tn(), tn("530-012-8393"));
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.to_string(), "530-012-8391-8393");

        assert!(matches!(
            "530-012-8393-8391".parse::<TnRange>(),
            Err(ValidationError::ReversedRange { start: 8393, end: 8391 })
        ));
        assert!(matches!(
            "530-012-8393-839".parse::<TnRange>(),
            Err(ValidationError::MalformedRange(_))
        ));
        assert!(matches!(
            TnRange::between(tn("530-012-9999"), tn("530-013-0001")),
            Err(ValidationError::SpansPrefixes { .. })
        ));
    }

    #[test]
    fn end_station_from_object_count() {
        let derived =
            TnRange::from_object_count(tn("530-012-0098"), 5).expect("count should fit");
        assert_eq!(derived.to_string(), "530-012-0098-0102");
        assert_eq!(derived.parts().end_station, "0102");

        assert!(matches!(
            TnRange::from_object_count(tn("530-012-9998"), 3),
            Err(ValidationError::StationOverflow { count: 3, .. })
        ));
        assert!(matches!(
            TnRange::from_object_count(tn("530-012-9998"), 0),
            Err(ValidationError::EmptySelection)
        ));
    }

    #[test]
    fn parts_decompose_range() {
        let parts = range("530-012-8391-8393").parts();
        assert_eq!(parts.npa, "530");
        assert_eq!(parts.nxx, "012");
        assert_eq!(parts.npa_nxx, "530012");
        assert_eq!(parts.dashx, "8");
        assert_eq!(parts.npa_nxx_x, "5300128");
        assert_eq!(parts.start_tn, "530-012-8391");
        assert_eq!(parts.end_tn, "530-012-8393");
    }

    fn tn_strategy() -> impl Strategy<Value = TelephoneNumber> {
        (0u16..3, 0u16..40).prop_map(|(nxx, station)| {
            let prefix = TnPrefix::new(530, nxx).expect("prefix in range");
            TelephoneNumber::new(prefix, 9980 + station % 20).expect("station in range")
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

        #[test]
        fn collapse_is_a_fixed_point(tns in proptest::collection::vec(tn_strategy(), 0..60)) {
            let once = collapse(tns);
            let twice = collapse(expand_list(&once));
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn collapse_then_expand_covers_input(
            tns in proptest::collection::vec(tn_strategy(), 0..60)
        ) {
            let original: std::collections::BTreeSet<_> = tns.iter().copied().collect();
            let covered: std::collections::BTreeSet<_> =
                expand_list(&collapse(tns)).into_iter().collect();
            prop_assert_eq!(original, covered);
        }

        #[test]
        fn collapsed_ranges_never_touch(
            tns in proptest::collection::vec(tn_strategy(), 1..60)
        ) {
            let ranges = collapse(tns);
            for pair in ranges.windows(2) {
                prop_assert!(!pair[0].end_tn().precedes(&pair[1].start_tn()));
                prop_assert!(pair[0].end_tn() < pair[1].start_tn());
            }
        }
    }
}
