use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Approval tier. Higher levels require every lower tier to be cleared first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SecurityLevel {
    Level1,
    Level2,
    Level3,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 3] = [Self::Level1, Self::Level2, Self::Level3];

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Level1 => 1,
            Self::Level2 => 2,
            Self::Level3 => 3,
        }
    }

    /// Lenient conversion used by lookups: anything outside 1..=3 is `None`.
    pub fn from_raw(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Level1),
            2 => Some(Self::Level2),
            3 => Some(Self::Level3),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Level1 => Some(Self::Level2),
            Self::Level2 => Some(Self::Level3),
            Self::Level3 => None,
        }
    }

    pub fn previous(self) -> Option<Self> {
        match self {
            Self::Level1 => None,
            Self::Level2 => Some(Self::Level1),
            Self::Level3 => Some(Self::Level2),
        }
    }
}

impl TryFrom<u8> for SecurityLevel {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_raw(i64::from(value)).ok_or(DomainError::InvalidSecurityLevel(value))
    }
}

impl From<SecurityLevel> for u8 {
    fn from(value: SecurityLevel) -> Self {
        value.as_u8()
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {}", self.as_u8())
    }
}

macro_rules! choice_enum {
    ($name:ident, $field:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let needle = value.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|choice| choice.label().eq_ignore_ascii_case(needle))
                    .ok_or_else(|| DomainError::UnknownChoice {
                        field: $field,
                        value: value.to_string(),
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

choice_enum!(TravelCategory, "category_of_travel", {
    Business => "Business",
    HomeLeave => "Home Leave",
    RestAndRecuperation => "R & R",
    Personal => "Personal",
    Medical => "Medical",
    Compassionate => "Compassionate",
});

choice_enum!(TravelType, "type_of_travel", {
    Domestic => "Domestic",
    IntraContinental => "IntraContinental",
    International => "International",
});

choice_enum!(TravelMode, "mode_of_travel", {
    Air => "Air",
    Land => "Land",
    Water => "Water",
});

choice_enum!(TravelerKind, "type_of_traveler", {
    Employee => "Employee",
    Dependant => "Dependant",
    Consultant => "Consultant",
    Partner => "Partner",
});
