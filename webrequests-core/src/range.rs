//! Byte ranges for the HTTP `Range` request header.

use std::fmt;

/// Errors produced when constructing a [`ByteRange`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ByteRangeError {
    /// `from` is past `to`.
    #[error("from cannot be greater than to (from {from}, to {to})")]
    FromGreaterThanTo { from: u64, to: u64 },
}

/// A closed or open-ended interval of bytes.
///
/// Both bounds are inclusive. An open-ended range (`to` absent) covers
/// everything from `from` to the end of the resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ByteRange {
    from: u64,
    to: Option<u64>,
}

impl ByteRange {
    /// A range starting at `from` and running to the end of the resource.
    pub fn starting_at(from: u64) -> Self {
        Self { from, to: None }
    }

    /// A closed range. Fails if `from > to`.
    pub fn new(from: u64, to: u64) -> Result<Self, ByteRangeError> {
        if from > to {
            return Err(ByteRangeError::FromGreaterThanTo { from, to });
        }
        Ok(Self { from, to: Some(to) })
    }

    pub fn from(&self) -> u64 {
        self.from
    }

    /// The inclusive end, if the range has one.
    pub fn to(&self) -> Option<u64> {
        self.to
    }

    pub fn has_end(&self) -> bool {
        self.to.is_some()
    }

    /// Number of bytes covered, when the range is closed and the count
    /// fits in a `u64`.
    pub fn len(&self) -> Option<u64> {
        self.to.and_then(|to| (to - self.from).checked_add(1))
    }

    /// Value for the `Range` header: `bytes=<from>-<to?>`.
    pub fn to_header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            Some(to) => write!(f, "bytes={}-{}", self.from, to),
            None => write!(f, "bytes={}-", self.from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_range_exposes_bounds() {
        let range = ByteRange::new(100, 199).unwrap();
        assert_eq!(range.from(), 100);
        assert_eq!(range.to(), Some(199));
        assert!(range.has_end());
        assert_eq!(range.len(), Some(100));
    }

    #[test]
    fn single_byte_range_is_valid() {
        let range = ByteRange::new(0, 0).unwrap();
        assert_eq!(range.len(), Some(1));
    }

    #[test]
    fn full_u64_range_has_no_len() {
        let range = ByteRange::new(0, u64::MAX).unwrap();
        assert_eq!(range.len(), None);
        assert_eq!(ByteRange::new(1, u64::MAX).unwrap().len(), Some(u64::MAX));
    }

    #[test]
    fn open_range_has_no_end() {
        let range = ByteRange::starting_at(100);
        assert_eq!(range.from(), 100);
        assert_eq!(range.to(), None);
        assert!(!range.has_end());
        assert_eq!(range.len(), None);
    }

    #[test]
    fn from_greater_than_to_is_rejected() {
        let err = ByteRange::new(200, 100).unwrap_err();
        assert_eq!(err, ByteRangeError::FromGreaterThanTo { from: 200, to: 100 });
    }

    #[test]
    fn header_value_format() {
        assert_eq!(ByteRange::new(100, 199).unwrap().to_header_value(), "bytes=100-199");
        assert_eq!(ByteRange::starting_at(100).to_header_value(), "bytes=100-");
    }
}
