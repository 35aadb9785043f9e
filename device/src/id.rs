//! Logical device identities

use std::fmt;

use crate::error::IdError;

/// Logical identity of a device, independent of any one connection.
///
/// Several live connections may share an `Id` at the same time, for example
/// while a reconnecting device still has its old connection open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(String);

impl Id {
    /// Wrap a value verbatim, without validation
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse and normalize a `scheme:value` identity.
    ///
    /// Recognized schemes are `mac`, `uuid`, `dns` and `serial`, matched
    /// case-insensitively and normalized to lowercase. MAC values may use `:`,
    /// `-` or `.` separators; they are stripped and the twelve hex digits are
    /// lowercased, so `MAC:11-22-33-AA-BB-CC` becomes `mac:112233aabbcc`.
    pub fn parse(value: &str) -> Result<Self, IdError> {
        let invalid = || IdError::InvalidId(value.to_string());

        let (scheme, rest) = value.split_once(':').ok_or_else(invalid)?;
        let scheme = scheme.trim().to_ascii_lowercase();
        let rest = rest.trim();

        if rest.is_empty() {
            return Err(invalid());
        }

        match scheme.as_str() {
            "mac" => {
                let digits: String = rest
                    .chars()
                    .filter(|c| !matches!(c, ':' | '-' | '.'))
                    .collect();

                if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(invalid());
                }

                Ok(Self(format!("mac:{}", digits.to_ascii_lowercase())))
            }
            "uuid" | "dns" | "serial" => Ok(Self(format!("{scheme}:{rest}"))),
            _ => Err(invalid()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::new(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::new(s)
    }
}
