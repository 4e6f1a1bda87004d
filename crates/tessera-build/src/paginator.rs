//! Pagination of list documents.
//!
//! Pager 1 is rendered at the owning document's own target. Pagers 2.. live at
//! `<base>/<paginate_path>/<n>/`, and `<base>/<paginate_path>/1/` always redirects
//! back to `<base>`.

use std::ops::Range;

/// One page of a paginated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pager {
    /// 1-based page number
    pub number: usize,
    /// Slice of the owning document's page list
    pub range: Range<usize>,
}

impl Pager {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Items of this pager out of the full list.
    pub fn items<'a, T>(&self, all: &'a [T]) -> &'a [T] {
        &all[self.range.clone()]
    }
}

/// Ordered partition of a list into fixed-size pagers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginator {
    page_size: usize,
    total_items: usize,
    pagers: Vec<Pager>,
}

impl Paginator {
    /// Partition `total_items` into pagers of `page_size`.
    ///
    /// Returns `None` when pagination is disabled (`page_size == 0`). An empty list
    /// still gets one empty pager so the first page renders.
    pub fn new(total_items: usize, page_size: usize) -> Option<Self> {
        if page_size == 0 {
            return None;
        }

        let total_pages = total_items.div_ceil(page_size).max(1);
        let pagers = (0..total_pages)
            .map(|i| {
                let start = (i * page_size).min(total_items);
                let end = ((i + 1) * page_size).min(total_items);
                Pager {
                    number: i + 1,
                    range: start..end,
                }
            })
            .collect();

        Some(Self {
            page_size,
            total_items,
            pagers,
        })
    }

    pub fn pagers(&self) -> &[Pager] {
        &self.pagers
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn total_pages(&self) -> usize {
        self.pagers.len()
    }
}

/// Path addend for pager `number` (`/page/2`).
pub fn pager_addend(paginate_path: &str, number: usize) -> String {
    format!("/{}/{}", paginate_path.trim_matches('/'), number)
}

/// Permalink of pager `number`, given the permalink of the owning document.
pub fn pager_permalink(base_permalink: &str, paginate_path: &str, number: usize) -> String {
    if number <= 1 {
        return base_permalink.to_string();
    }
    format!(
        "{}{}/",
        base_permalink.trim_end_matches('/'),
        pager_addend(paginate_path, number)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partitions_into_fixed_size_pagers() {
        let paginator = Paginator::new(23, 10).unwrap();

        let ranges: Vec<_> = paginator.pagers().iter().map(|p| p.range.clone()).collect();
        assert_eq!(ranges, vec![0..10, 10..20, 20..23]);
        assert_eq!(paginator.total_pages(), 3);
        assert_eq!(paginator.pagers()[2].number, 3);
    }

    #[test]
    fn empty_list_has_one_pager() {
        let paginator = Paginator::new(0, 5).unwrap();

        assert_eq!(paginator.total_pages(), 1);
        assert!(paginator.pagers()[0].is_empty());
    }

    #[test]
    fn zero_page_size_disables() {
        assert!(Paginator::new(10, 0).is_none());
    }

    #[test]
    fn pager_items_slice() {
        let items = ["a", "b", "c", "d", "e"];
        let paginator = Paginator::new(items.len(), 2).unwrap();

        assert_eq!(paginator.pagers()[1].items(&items), &["c", "d"]);
        assert_eq!(paginator.pagers()[2].items(&items), &["e"]);
    }

    #[test]
    fn pager_links() {
        assert_eq!(pager_addend("page", 3), "/page/3");
        assert_eq!(pager_permalink("/posts/", "page", 1), "/posts/");
        assert_eq!(pager_permalink("/posts/", "/page/", 2), "/posts/page/2/");
        assert_eq!(pager_permalink("/", "page", 2), "/page/2/");
    }
}
