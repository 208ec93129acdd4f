//! Segment planning
//!
//! Splits the key space into a fixed number of segments. Each segment is
//! identified by `(index, total)`, which is all a store needs to decide which
//! records belong to it.

use crate::config::validate_segment_count;
use crate::ConfigError;
use std::fmt;

/// One partition of a full-table parallel scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentDescriptor {
    /// Zero-based segment index, always `< total`
    pub index: u32,

    /// Number of segments in the scan
    pub total: u32,
}

impl fmt::Display for SegmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

/// Computes the segment descriptors for a requested segment count
///
/// # Arguments
///
/// * `segment_count` - Requested number of segments; must be at least 1
///
/// # Returns
///
/// * `Ok(Vec<SegmentDescriptor>)` - Exactly `segment_count` descriptors, indices in order
/// * `Err(ConfigError)` - The count was zero, negative, or too large
///
/// # Example
///
/// ```
/// use account_crawler::crawler::partition;
///
/// let segments = partition(3).unwrap();
/// assert_eq!(segments.len(), 3);
/// assert_eq!(segments[2].index, 2);
/// assert!(partition(0).is_err());
/// ```
pub fn partition(segment_count: i64) -> Result<Vec<SegmentDescriptor>, ConfigError> {
    let total = validate_segment_count(segment_count)?;
    Ok((0..total)
        .map(|index| SegmentDescriptor { index, total })
        .collect())
}
