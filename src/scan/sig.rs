//! IDA-style signature representation and parsing

use std::fmt;
use std::str::FromStr;

/// A single signature position: a concrete byte, or `None` for a wildcard
/// that matches any byte.
pub type SigByte = Option<u8>;

/// Signature construction errors
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The signature has no elements
    #[error("signature is empty")]
    Empty,
    /// A token was not two hex digits, `?`, or `??`
    #[error("invalid token `{0}`. tokens must be two hex digits, ?, or ??")]
    InvalidToken(String),
    /// Every element is a wildcard, which would match everywhere
    #[error("signature consists only of wildcards")]
    AllWildcards,
}

/// An owned byte pattern with wildcard positions
///
/// Invariants: at least one element, at least one concrete element. The engine
/// borrows signatures as `&[SigByte]` views for the duration of a scan call.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    elems: Vec<SigByte>,
}

impl Signature {
    /// Parse an IDA-style pattern string
    ///
    /// Tokens are separated by whitespace. Each token is either exactly two
    /// hex digits (case-insensitive) or `?` / `??` for a wildcard.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sigscan::scan::Signature;
    ///
    /// let sig = Signature::parse("48 89 5c 24 ?? 48 89 6c").unwrap();
    /// assert_eq!(sig.len(), 8);
    /// ```
    pub fn parse(pattern: &str) -> Result<Self, SignatureError> {
        let mut elems = Vec::new();

        for token in pattern.split_whitespace() {
            match token {
                "?" | "??" => elems.push(None),

                _ => {
                    if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                        return Err(SignatureError::InvalidToken(token.to_owned()));
                    }

                    // cannot fail, both digits were just validated
                    let byte = u8::from_str_radix(token, 16)
                        .map_err(|_| SignatureError::InvalidToken(token.to_owned()))?;

                    elems.push(Some(byte));
                }
            }
        }

        Self::from_elems(elems)
    }

    /// Build a signature from a pre-assembled element sequence
    pub fn from_elems(elems: Vec<SigByte>) -> Result<Self, SignatureError> {
        if elems.is_empty() {
            return Err(SignatureError::Empty);
        }

        if elems.iter().all(|e| e.is_none()) {
            return Err(SignatureError::AllWildcards);
        }

        Ok(Self { elems })
    }

    /// Build an all-concrete signature from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        Self::from_elems(bytes.iter().copied().map(Some).collect())
    }

    /// Number of elements, wildcards included
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Always false; signatures cannot be empty
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Borrow the elements for a scan call
    pub fn elems(&self) -> &[SigByte] {
        &self.elems
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, elem) in self.elems.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }

            match elem {
                Some(b) => write!(f, "{b:02X}")?,
                None => f.write_str("??")?,
            }
        }

        Ok(())
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Signature {
    type Error = SignatureError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Strip leading wildcards from a signature view
///
/// Leading wildcards match anything, so scanning for the truncated view and
/// subtracting the wildcard count from the hit is equivalent, and lets every
/// kernel assume a concrete first byte. Returns the wildcard count and the
/// truncated view; the view is non-empty with a concrete head for any view
/// that upholds the [`Signature`] invariants.
pub(crate) fn truncate(elems: &[SigByte]) -> (usize, &[SigByte]) {
    let offset = elems.iter().take_while(|e| e.is_none()).count();
    (offset, &elems[offset..])
}
