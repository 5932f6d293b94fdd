//! Byte-range handling for video delivery.

use crate::error::{MediaError, MediaResult};

/// Resolved byte window of a partial-content response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Inclusive; always the last byte of the object
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// Resolve a `Range` header against an object of `size` bytes.
    ///
    /// The start offset is the first run of digits in the header; a header
    /// without digits starts at 0. The window always runs to the end of the
    /// object.
    pub fn resolve(header: &str, size: i64) -> MediaResult<Self> {
        let total = u64::try_from(size).unwrap_or(0);
        let start = first_number(header).unwrap_or(0);

        if start >= total {
            return Err(MediaError::RangeNotSatisfiable { size });
        }

        Ok(Self {
            start,
            end: total - 1,
            total,
        })
    }

    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

fn first_number(value: &str) -> Option<u64> {
    let digits: String = value
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        return None;
    }

    // Saturate absurdly long offsets so they land past the end of the object
    Some(digits.parse().unwrap_or(u64::MAX))
}
