//! Page envelopes and query addressing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pagination metadata returned alongside every page of records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub limit: u32,
    pub has_next_page: bool,
    pub total_pages: Option<u32>,
    pub current_page: u32,
    pub is_offset_based: bool,
}

/// One page of records plus metadata, as returned by a page source.
///
/// Replaced wholesale on refetch; patched in place by realtime events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<R> {
    pub data: Vec<R>,
    pub next_cursor: Option<String>,
    pub count: Option<u64>,
    pub pagination: Pagination,
}

/// Number of pages needed for `count` records; an empty set still has one page.
pub fn total_pages(count: u64, limit: u32) -> u32 {
    if limit == 0 {
        return 1;
    }
    let pages = count.div_ceil(u64::from(limit));
    u32::try_from(pages.max(1)).unwrap_or(u32::MAX)
}

impl<R> PageResult<R> {
    /// Offset-addressed page `page` of `count` total records.
    pub fn offset(data: Vec<R>, page: u32, limit: u32, count: u64) -> Self {
        let pages = total_pages(count, limit);
        Self {
            data,
            next_cursor: None,
            count: Some(count),
            pagination: Pagination {
                limit,
                has_next_page: page < pages,
                total_pages: Some(pages),
                current_page: page,
                is_offset_based: true,
            },
        }
    }

    /// Cursor-addressed page; `next_cursor` continues the sequence.
    pub fn cursor(data: Vec<R>, limit: u32, next_cursor: Option<String>) -> Self {
        Self {
            data,
            pagination: Pagination {
                limit,
                has_next_page: next_cursor.is_some(),
                total_pages: None,
                current_page: 1,
                is_offset_based: false,
            },
            next_cursor,
            count: None,
        }
    }

    /// The whole record set as a single unpaginated page.
    pub fn unpaginated(data: Vec<R>) -> Self {
        let count = data.len() as u64;
        let limit = u32::try_from(data.len()).unwrap_or(u32::MAX);
        Self {
            data,
            next_cursor: None,
            count: Some(count),
            pagination: Pagination {
                limit,
                has_next_page: false,
                total_pages: Some(1),
                current_page: 1,
                is_offset_based: true,
            },
        }
    }

    /// Slice an in-memory record set into an offset-addressed page.
    pub fn paginate_local(all: Vec<R>, page: u32, limit: u32) -> Self {
        let count = all.len() as u64;
        let start = (page.max(1) as usize - 1).saturating_mul(limit as usize);
        let data = all.into_iter().skip(start).take(limit as usize).collect();
        Self::offset(data, page.max(1), limit, count)
    }

    pub fn map<U>(self, f: impl FnMut(R) -> U) -> PageResult<U> {
        PageResult {
            data: self.data.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
            count: self.count,
            pagination: self.pagination,
        }
    }
}

/// How a fetch addresses its slice of the record set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PageAddress {
    Offset { page: u32 },
    Cursor { cursor: String },
    /// Everything; used by views that never paginate.
    All,
}

/// Parameters passed to a page source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageParams {
    pub address: PageAddress,
    pub limit: Option<u32>,
    pub search: Option<String>,
    /// Filter key to selected values, only sent when filtering is server side.
    pub filters: BTreeMap<String, Vec<String>>,
}

impl PageParams {
    pub fn offset(page: u32, limit: u32) -> Self {
        Self {
            address: PageAddress::Offset { page },
            limit: Some(limit),
            search: None,
            filters: BTreeMap::new(),
        }
    }

    pub fn all() -> Self {
        Self {
            address: PageAddress::All,
            limit: None,
            search: None,
            filters: BTreeMap::new(),
        }
    }
}

/// Renderer kinds that can consume the controller's view model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    #[default]
    Table,
    Kanban,
    Calendar,
}

impl ViewKind {
    /// Only the table view pages through results.
    pub fn is_paginated(self) -> bool {
        matches!(self, ViewKind::Table)
    }
}

impl std::str::FromStr for ViewKind {
    type Err = crate::ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(ViewKind::Table),
            "kanban" => Ok(ViewKind::Kanban),
            "calendar" => Ok(ViewKind::Calendar),
            other => Err(crate::ApiError::InvalidValue {
                field: "view".to_string(),
                message: format!("unknown view '{}'", other),
            }),
        }
    }
}

/// Identity of a cached page: responses are only committed when their key
/// still equals the controller's current key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    pub scope: String,
    pub view: ViewKind,
    pub params: PageParams,
}

impl QueryKey {
    pub fn new(scope: impl Into<String>, view: ViewKind, params: PageParams) -> Self {
        Self {
            scope: scope.into(),
            view,
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_local_slices_and_counts() {
        let all: Vec<u32> = (1..=25).collect();
        let page = PageResult::paginate_local(all.clone(), 3, 10);
        assert_eq!(page.data, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.count, Some(25));
        assert_eq!(page.pagination.total_pages, Some(3));
        assert!(!page.pagination.has_next_page);

        let first = PageResult::paginate_local(all, 1, 10);
        assert!(first.pagination.has_next_page);
        assert!(first.pagination.is_offset_based);
    }

    #[test]
    fn test_empty_set_has_one_page() {
        let page: PageResult<u32> = PageResult::paginate_local(vec![], 1, 10);
        assert_eq!(page.pagination.total_pages, Some(1));
        assert!(page.data.is_empty());
    }

    #[test]
    fn test_cursor_page_has_next_when_cursor_present() {
        let page = PageResult::cursor(vec![1, 2], 2, Some("c2".to_string()));
        assert!(page.pagination.has_next_page);
        assert!(!page.pagination.is_offset_based);
        assert_eq!(page.pagination.total_pages, None);
    }

    #[test]
    fn test_query_keys_differ_by_page() {
        let k1 = QueryKey::new("orders", ViewKind::Table, PageParams::offset(1, 20));
        let k2 = QueryKey::new("orders", ViewKind::Table, PageParams::offset(2, 20));
        assert_ne!(k1, k2);
        assert_eq!(k1.clone(), k1);
    }

    #[test]
    fn test_view_kind_parse() {
        assert_eq!("kanban".parse::<ViewKind>().unwrap(), ViewKind::Kanban);
        assert!("gantt".parse::<ViewKind>().is_err());
        assert!(ViewKind::Table.is_paginated());
        assert!(!ViewKind::Calendar.is_paginated());
    }
}
