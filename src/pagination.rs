use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Posts shown per listing page.
pub const POSTS_PER_PAGE: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageInfo {
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageInfo {
    /// Locate the requested page among `count` items. A missing or
    /// malformed page number yields the first page; a number past the end
    /// yields the last one. An empty collection still has one (empty) page.
    pub fn locate(count: usize, requested: Option<&str>, per_page: usize) -> Self {
        let num_pages = count.div_ceil(per_page.max(1)).max(1);
        let number = requested
            .and_then(|p| p.trim().parse::<usize>().ok())
            .map(|n| n.clamp(1, num_pages))
            .unwrap_or(1);
        PageInfo {
            number,
            num_pages,
            count,
            has_next: number < num_pages,
            has_previous: number > 1,
        }
    }

    /// Items to skip before this page starts.
    pub fn offset(&self, per_page: usize) -> usize {
        (self.number - 1) * per_page.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_page() {
        let info = PageInfo::locate(25, Some("2"), 10);
        assert_eq!(info.offset(10), 10);
        assert_eq!(info.num_pages, 3);
        assert!(info.has_next && info.has_previous);
    }

    #[test]
    fn out_of_range_and_garbage() {
        let info = PageInfo::locate(25, Some("99"), 10);
        assert_eq!(info.number, 3);
        assert_eq!(info.offset(10), 20);
        assert!(!info.has_next);
        assert_eq!(PageInfo::locate(25, Some("abc"), 10).number, 1);
        assert_eq!(PageInfo::locate(25, Some("0"), 10).number, 1);
        assert_eq!(PageInfo::locate(25, Some(" 2 "), 10).number, 2);
    }

    #[test]
    fn empty_has_one_page() {
        let info = PageInfo::locate(0, None, 10);
        assert_eq!(info, PageInfo { number: 1, num_pages: 1, count: 0, has_next: false, has_previous: false });
        assert_eq!(info.offset(10), 0);
    }

    #[test]
    fn exact_multiple_has_no_extra_page() {
        let info = PageInfo::locate(20, Some("3"), 10);
        assert_eq!(info.num_pages, 2);
        assert_eq!(info.number, 2);
    }
}
