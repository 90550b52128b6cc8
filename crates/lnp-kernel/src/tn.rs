//! Telephone-number identities.
//!
//! A TN is `NPA-NXX-XXXX`: a six-digit prefix (area code + exchange) and a
//! four-digit station. Ordering is by prefix, then station, which gives a
//! total numeric order over the ten-digit value.

use crate::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::OnceLock;

pub const MAX_STATION: u16 = 9999;

pub(crate) fn tn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{3})-(\d{3})-(\d{4})$").expect("tn regex must compile"))
}

/// The `NPA-NXX` part of a telephone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TnPrefix {
    npa: u16,
    nxx: u16,
}

impl TnPrefix {
    pub fn new(npa: u16, nxx: u16) -> Option<Self> {
        (npa <= 999 && nxx <= 999).then_some(Self { npa, nxx })
    }

    /// Three-digit area code, zero padded.
    pub fn npa(&self) -> String {
        format!("{:03}", self.npa)
    }

    pub fn nxx(&self) -> String {
        format!("{:03}", self.nxx)
    }
}

impl Display for TnPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}-{:03}", self.npa, self.nxx)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct TelephoneNumber {
    prefix: TnPrefix,
    station: u16,
}

impl TelephoneNumber {
    pub fn new(prefix: TnPrefix, station: u16) -> Result<Self, ValidationError> {
        if station > MAX_STATION {
            return Err(ValidationError::MalformedTn(format!(
                "{prefix}-{station}"
            )));
        }
        Ok(Self { prefix, station })
    }

    pub fn prefix(&self) -> TnPrefix {
        self.prefix
    }

    pub fn station(&self) -> u16 {
        self.station
    }

    pub fn npa(&self) -> String {
        self.prefix.npa()
    }

    /// The TN `offset` stations later on the same prefix, if it exists.
    pub fn offset(&self, offset: usize) -> Option<Self> {
        let station = usize::from(self.station).checked_add(offset)?;
        if station > usize::from(MAX_STATION) {
            return None;
        }
        Some(Self {
            prefix: self.prefix,
            station: station as u16,
        })
    }

    /// True when `other` is the next station on the same prefix.
    pub fn precedes(&self, other: &Self) -> bool {
        self.prefix == other.prefix && u32::from(self.station) + 1 == u32::from(other.station)
    }
}

impl Display for TelephoneNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:04}", self.prefix, self.station)
    }
}

impl FromStr for TelephoneNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = tn_re()
            .captures(s.trim())
            .ok_or_else(|| ValidationError::MalformedTn(s.to_string()))?;
        let digits = |i: usize| -> Result<u16, ValidationError> {
            caps[i]
                .parse::<u16>()
                .map_err(|_| ValidationError::MalformedTn(s.to_string()))
        };
        let prefix = TnPrefix {
            npa: digits(1)?,
            nxx: digits(2)?,
        };
        Ok(Self {
            prefix,
            station: digits(3)?,
        })
    }
}

impl TryFrom<String> for TelephoneNumber {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TelephoneNumber> for String {
    fn from(tn: TelephoneNumber) -> Self {
        tn.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tn(text: &str) -> TelephoneNumber {
        text.parse()
            .unwrap_or_else(|e| panic!("fixture tn {text} should parse: {e}"))
    }

    #[test]
    fn parses_and_displays_canonical_form() {
        let parsed = tn("530-012-8391");
        assert_eq!(parsed.prefix().to_string(), "530-012");
        assert_eq!(parsed.station(), 8391);
        assert_eq!(parsed.to_string(), "530-012-8391");
        assert_eq!(tn("004-005-0007").to_string(), "004-005-0007");
    }

    #[test]
    fn rejects_other_shapes() {
        for bad in ["5300128391", "530-012-839", "530-012-83911", "53a-012-8391", ""] {
            assert!(
                matches!(
                    bad.parse::<TelephoneNumber>(),
                    Err(ValidationError::MalformedTn(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn orders_by_prefix_then_station() {
        let mut tns = vec![tn("530-013-0000"), tn("530-012-9999"), tn("530-012-0001")];
        tns.sort();
        assert_eq!(
            tns.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["530-012-0001", "530-012-9999", "530-013-0000"]
        );
    }

    #[test]
    fn offset_stops_at_last_station() {
        assert_eq!(tn("530-012-9998").offset(1), Some(tn("530-012-9999")));
        assert_eq!(tn("530-012-9998").offset(2), None);
        assert!(tn("530-012-0001").precedes(&tn("530-012-0002")));
        assert!(!tn("530-012-9999").precedes(&tn("530-013-0000")));
    }

    #[test]
    fn serde_uses_text_form() {
        let json = serde_json::to_string(&tn("530-012-8391")).expect("tn should serialize");
        assert_eq!(json, "\"530-012-8391\"");
        let back: TelephoneNumber = serde_json::from_str(&json).expect("tn should deserialize");
        assert_eq!(back, tn("530-012-8391"));
        assert!(serde_json::from_str::<TelephoneNumber>("\"530-012\"").is_err());
    }
}
