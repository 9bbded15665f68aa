//! HTTP `Range` header handling for artifact streaming.
//!
//! Supports one range per request:
//! - `bytes=start-end`
//! - `bytes=start-` (to end of file)
//! - `bytes=-suffix_len` (last bytes, clamped to the file)

/// Inclusive byte range within a file of `size` bytes.
///
/// Always satisfies `start <= end < size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

impl ByteRange {
    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header of a 206 response.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.size)
    }
}

/// Why a `Range` header cannot be honored. All variants map to 416.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("unsupported range unit")]
    UnsupportedUnit,

    #[error("multiple ranges are not supported")]
    MultipleRanges,

    #[error("malformed range")]
    Malformed,

    #[error("range not satisfiable for {size} bytes")]
    Unsatisfiable { size: u64 },
}

/// Value for the `Content-Range` header of a 416 response.
pub fn unsatisfied_content_range(size: u64) -> String {
    format!("bytes */{size}")
}

/// Parses a `Range` header value against a file size.
pub fn parse_range(value: &str, size: u64) -> Result<ByteRange, RangeError> {
    let spec = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeError::UnsupportedUnit)?;
    if spec.contains(',') {
        return Err(RangeError::MultipleRanges);
    }

    let (start_str, end_str) = spec.split_once('-').ok_or(RangeError::Malformed)?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    let unsatisfiable = RangeError::Unsatisfiable { size };
    if size == 0 {
        return Err(unsatisfiable);
    }

    if start_str.is_empty() {
        let suffix_len = parse_number(end_str)?;
        if suffix_len == 0 {
            return Err(unsatisfiable);
        }
        return Ok(ByteRange {
            start: size.saturating_sub(suffix_len),
            end: size - 1,
            size,
        });
    }

    let start = parse_number(start_str)?;
    let end = if end_str.is_empty() {
        size - 1
    } else {
        parse_number(end_str)?
    };

    if start > end || end >= size {
        return Err(unsatisfiable);
    }
    Ok(ByteRange { start, end, size })
}

fn parse_number(s: &str) -> Result<u64, RangeError> {
    // u64::from_str accepts a leading '+', which is not valid in a range
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed);
    }
    s.parse().map_err(|_| RangeError::Malformed)
}
