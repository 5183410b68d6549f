//! Offset-based pagination utilities.

use serde::{Deserialize, Serialize};

/// Page size used when a caller asks for a page without naming a size.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Upper bound on a single page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A resolved, 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    /// Build a page request from optional query parameters.
    ///
    /// Returns `None` when neither parameter is supplied, meaning the caller
    /// wants the whole result set. A missing half is filled with its default;
    /// out-of-range values are clamped rather than rejected.
    pub fn from_params(page: Option<u32>, size: Option<u32>) -> Option<Self> {
        if page.is_none() && size.is_none() {
            return None;
        }

        Some(Self {
            page: page.unwrap_or(1).max(1),
            size: size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        })
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.size)
    }

    /// Number of rows to return.
    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }
}

/// Total number of pages needed to show `total` rows at `size` rows per page.
pub fn total_pages(total: i64, size: u32) -> u32 {
    if total <= 0 || size == 0 {
        return 0;
    }
    let size = i64::from(size);
    ((total + size - 1) / size) as u32
}
