//! Page bookkeeping for `paginate()`

use serde::Serialize;

/// Rows per page when the caller does not choose
pub const DEFAULT_PER_PAGE: u64 = 20;

/// Position of one page within a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pager {
    current_page: u64,
    per_page: u64,
    total: u64,
}

impl Pager {
    /// Pages are numbered from 1; `page = 0` is treated as the first page
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        Self {
            current_page: page.max(1),
            per_page: per_page.max(1),
            total,
        }
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(self.per_page).max(1)
    }

    /// Rows to skip to reach the current page, never past the end
    pub fn offset(&self) -> u64 {
        (self.current_page - 1).saturating_mul(self.per_page).min(self.total)
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.page_count()
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn next_page(&self) -> Option<u64> {
        self.has_next().then(|| self.current_page + 1)
    }

    pub fn previous_page(&self) -> Option<u64> {
        self.has_previous().then(|| self.current_page - 1)
    }
}
