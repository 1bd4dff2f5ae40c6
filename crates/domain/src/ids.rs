//! Typed identifiers
//!
//! Each record kind gets its own newtype so a hospital id can never be
//! passed where a trip id is expected. All of them serialize as bare
//! integers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw numeric value
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

record_id!(
    /// Trip identifier
    TripId
);
record_id!(
    /// Incident identifier
    IncidentId
);
record_id!(
    /// Hospital identifier
    HospitalId
);
record_id!(
    /// Ambulance unit identifier
    AmbulanceId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_integers() {
        assert_eq!(serde_json::to_string(&TripId(7)).unwrap(), "7");
        let id: HospitalId = serde_json::from_str("12").unwrap();
        assert_eq!(id, HospitalId(12));
    }

    #[test]
    fn test_ids_parse_from_path_segments() {
        assert_eq!("42".parse::<TripId>().unwrap(), TripId(42));
        assert!("abc".parse::<AmbulanceId>().is_err());
        assert!("-1".parse::<IncidentId>().is_err());
    }
}
