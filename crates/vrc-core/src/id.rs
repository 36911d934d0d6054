//! Opaque 32-character entity identifiers.
//!
//! Every server-owned entity (role, radio, net, call, endpoint, ...) is named
//! by an [`Id`]. Identifiers are unique within their entity type and stable
//! for the entity's lifetime. The "none / not found" sentinel is expressed as
//! `Option<Id>::None` rather than an empty string.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Length of every identifier, in characters.
pub const ID_LEN: usize = 32;

/// A validated 32-character entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(String);

impl Id {
    /// Parse and validate an identifier.
    ///
    /// Accepts exactly [`ID_LEN`] ASCII alphanumeric, `-` or `_` characters.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != ID_LEN {
            return Err(Error::Protocol(format!(
                "identifier must be {ID_LEN} characters, got {}: {s:?}",
                s.len()
            )));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(Error::Protocol(format!(
                "identifier contains invalid characters: {s:?}"
            )));
        }
        Ok(Id(s.to_string()))
    }

    /// Parse an optional identifier where an empty string or `none` means
    /// "no entity".
    pub fn parse_optional(s: &str) -> Result<Option<Self>> {
        if s.is_empty() || s == "none" {
            Ok(None)
        } else {
            Self::parse(s).map(Some)
        }
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Id::parse(s)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Id {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Format an optional identifier for the wire (`none` when absent).
pub fn wire_id(id: Option<&Id>) -> &str {
    id.map(Id::as_str).unwrap_or("none")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLE: &str = "0123456789abcdef0123456789ABCDEF";

    #[test]
    fn parse_valid() {
        let id = Id::parse(ROLE).unwrap();
        assert_eq!(id.as_str(), ROLE);
        assert_eq!(id.to_string(), ROLE);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(Id::parse("short").is_err());
        assert!(Id::parse(&format!("{ROLE}x")).is_err());
        assert!(Id::parse("").is_err());
    }

    #[test]
    fn parse_rejects_bad_characters() {
        let bad = "0123456789abcdef0123456789ABCDE ";
        assert_eq!(bad.len(), 32);
        assert!(Id::parse(bad).is_err());
    }

    #[test]
    fn parse_optional_sentinels() {
        assert_eq!(Id::parse_optional("").unwrap(), None);
        assert_eq!(Id::parse_optional("none").unwrap(), None);
        assert_eq!(
            Id::parse_optional(ROLE).unwrap(),
            Some(Id::parse(ROLE).unwrap())
        );
        assert!(Id::parse_optional("nope").is_err());
    }

    #[test]
    fn wire_id_formats_none() {
        let id = Id::parse(ROLE).unwrap();
        assert_eq!(wire_id(Some(&id)), ROLE);
        assert_eq!(wire_id(None), "none");
    }

    #[test]
    fn borrow_as_str_for_map_lookup() {
        let mut map = std::collections::HashMap::new();
        map.insert(Id::parse(ROLE).unwrap(), 7);
        assert_eq!(map.get(ROLE), Some(&7));
    }
}
