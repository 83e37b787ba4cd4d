/// LIMIT / OFFSET pair for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub offset: i64,
    pub limit: i64,
}

/// Normalise a caller page number: anything below 1 means the first page.
pub fn normalize_page(page: Option<i64>) -> i64 {
    match page {
        Some(p) if p > 0 => p,
        _ => 1,
    }
}

/// `page` is 1-based and must already be normalised. `None` when the offset
/// does not fit in an `i64`.
pub fn limits(page: i64, page_size: i64) -> Option<Limits> {
    let offset = page.saturating_sub(1).max(0).checked_mul(page_size)?;
    Some(Limits {
        offset,
        limit: page_size,
    })
}

/// Page count reported to callers. An exact multiple of `page_size` still
/// reports one trailing (empty) page; clients depend on this.
pub fn total_pages(row_count: i64, page_size: i64) -> i64 {
    if page_size <= 0 {
        return 1;
    }
    row_count / page_size + 1
}
