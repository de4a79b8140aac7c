use serde::Serialize;

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 100;

/// Validated 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest { page: 1, limit: DEFAULT_LIMIT }
    }
}

impl PageRequest {
    pub fn new(page: Option<usize>, limit: Option<usize>) -> Result<PageRequest, String> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if page == 0 {
            return Err("page must be at least 1".into());
        }
        if limit == 0 || limit > MAX_LIMIT {
            return Err(format!("limit must be in [1, {MAX_LIMIT}], got {limit}"));
        }
        Ok(PageRequest { page, limit })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub pages: usize,
    pub page: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    /// Cuts the requested page out of an already ordered list.
    pub fn slice(all: Vec<T>, request: PageRequest) -> Page<T> {
        let total = all.len();
        let items = all
            .into_iter()
            .skip((request.page - 1).saturating_mul(request.limit))
            .take(request.limit)
            .collect();
        Page { items, total, pages: total.div_ceil(request.limit), page: request.page, limit: request.limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_and_counts_pages() {
        let page = Page::slice((1..=25).collect::<Vec<_>>(), PageRequest { page: 3, limit: 10 });
        assert_eq!(page.items, (21..=25).collect::<Vec<_>>());
        assert_eq!((page.total, page.pages), (25, 3));
    }

    #[test]
    fn limit_is_bounded() {
        assert!(PageRequest::new(None, Some(0)).is_err());
        assert!(PageRequest::new(None, Some(101)).is_err());
        assert!(PageRequest::new(Some(0), None).is_err());
        assert_eq!(PageRequest::new(None, None).unwrap(), PageRequest::default());
    }
}
