//! Pagination helpers

use serde::{Deserialize, Serialize};

/// Page parameters for list queries.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageParams {
    /// 1-based page clamped to sane bounds.
    #[must_use]
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    #[must_use]
    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(20).clamp(1, 100)
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.page_size()
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: Some(1),
            page_size: Some(20),
        }
    }
}

/// One page of results plus the total row count.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamping() {
        let params = PageParams {
            page: Some(0),
            page_size: Some(1000),
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.page_size(), 100);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_offset() {
        let params = PageParams {
            page: Some(3),
            page_size: Some(20),
        };
        assert_eq!(params.offset(), 40);
    }
}
