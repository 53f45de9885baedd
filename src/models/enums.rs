use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The stored string doubles as the JSON representation.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Role {
    Doctor => "doctor",
    Pharmacy => "pharmacy",
    Patient => "patient",
});

str_enum!(DispenseStatus {
    Pending => "Pending",
    Dispensed => "Dispensed",
});

impl DispenseStatus {
    /// Parse client input. The browser client sends `"pending"` in lower case,
    /// so matching ignores ASCII case.
    pub fn parse_input(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("dispensed") {
            Some(Self::Dispensed)
        } else if s.eq_ignore_ascii_case("pending") {
            Some(Self::Pending)
        } else {
            None
        }
    }
}

impl Default for DispenseStatus {
    fn default() -> Self {
        Self::Pending
    }
}
