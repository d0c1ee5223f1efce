use std::{fmt, str::FromStr};

use crate::Str;

/// A session id issued by the server in the handshake [`OpenPacket`](crate::OpenPacket).
///
/// The client never generates nor interprets it: it is an opaque, non-empty string
/// that binds every request of one logical connection.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid(Str);

impl Sid {
    /// Get the session id as a string slice
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// A valid sid for default handshakes
    pub(crate) fn placeholder() -> Self {
        Sid(Str::from("AAAAAAAAAAAAAAAA"))
    }
}

/// Error type for [`Sid::from_str`]
#[derive(Debug)]
pub enum SidDecodeError {
    /// The server sent an empty session id
    Empty,
    /// The session id contains control or whitespace characters
    InvalidChar,
}
impl fmt::Display for SidDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SidDecodeError::Empty => write!(f, "Empty sid"),
            SidDecodeError::InvalidChar => write!(f, "Invalid sid character"),
        }
    }
}
impl std::error::Error for SidDecodeError {}

impl FromStr for Sid {
    type Err = SidDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sid::try_from(Str::from(s.to_owned()))
    }
}

impl TryFrom<Str> for Sid {
    type Error = SidDecodeError;

    fn try_from(s: Str) -> Result<Self, Self::Error> {
        if s.is_empty() {
            return Err(SidDecodeError::Empty);
        }
        // The sid is sent back in query strings and must survive the round trip untouched
        if s.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(SidDecodeError::InvalidChar);
        }
        Ok(Sid(s))
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Sid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

struct SidVisitor;
impl serde::de::Visitor<'_> for SidVisitor {
    type Value = Sid;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a valid sid")
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Sid::from_str(v).map_err(serde::de::Error::custom)
    }
}
impl<'de> serde::Deserialize<'de> for Sid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(SidVisitor)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::sid::Sid;

    #[test]
    fn test_sid_from_str() {
        let id = Sid::from_str("AA9AAA0AAzAAAAHs").unwrap();
        assert_eq!(id.to_string(), "AA9AAA0AAzAAAAHs");
        let id = Sid::from_str("abc").unwrap();
        assert_eq!(id.as_str(), "abc");
    }

    #[test]
    fn test_sid_from_str_invalid() {
        let err = Sid::from_str("").unwrap_err();
        assert_eq!(err.to_string(), "Empty sid");
        let err = Sid::from_str("ab c").unwrap_err();
        assert_eq!(err.to_string(), "Invalid sid character");
        let err = Sid::from_str("ab\nc").unwrap_err();
        assert_eq!(err.to_string(), "Invalid sid character");
    }

    #[test]
    fn test_placeholder_is_valid() {
        let sid = Sid::placeholder();
        assert_eq!(Sid::from_str(sid.as_str()).unwrap(), sid);
    }

    #[test]
    fn test_sid_deserialize() {
        let id: Sid = serde_json::from_str("\"Zx-_9\"").unwrap();
        assert_eq!(id.as_str(), "Zx-_9");
        assert!(serde_json::from_str::<Sid>("\"\"").is_err());
    }
}
