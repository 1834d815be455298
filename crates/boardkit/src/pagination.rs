//! Pagination state machine
//!
//! Tracks `{current_page, limit, cursor}` and decides how the next fetch is
//! addressed. Offset and cursor addressing never mix within one query; which
//! one is active is taken from the last observed [`PageResult`].

use boardkit_api::{PageAddress, PageResult};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    current_page: u32,
    limit: u32,
    cursor: Option<String>,
    total_pages: Option<u32>,
    count: Option<u64>,
    has_next_page: bool,
    is_offset_based: bool,
}

impl PaginationState {
    pub fn new(limit: u32) -> Self {
        Self {
            current_page: 1,
            limit: limit.max(1),
            cursor: None,
            total_pages: None,
            count: None,
            has_next_page: false,
            is_offset_based: true,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    pub fn is_offset_based(&self) -> bool {
        self.is_offset_based
    }

    /// Move to page `n`. Returns `false` (no-op) when `n` is out of range,
    /// already current, or the query is cursor based.
    pub fn go_to_page(&mut self, n: u32) -> bool {
        if !self.is_offset_based || n < 1 || n == self.current_page {
            return false;
        }
        if self.total_pages.is_some_and(|total| n > total) {
            return false;
        }
        self.current_page = n;
        true
    }

    /// Change the page size. Always lands on page 1; a zero limit is rejected.
    pub fn update_limit(&mut self, limit: u32) -> bool {
        if limit == 0 {
            return false;
        }
        self.limit = limit;
        self.current_page = 1;
        self.cursor = None;
        self.total_pages = None;
        true
    }

    /// Back to the first page, e.g. after the filter set changed server side.
    pub fn reset(&mut self) -> bool {
        let changed = self.current_page != 1 || self.cursor.is_some();
        self.current_page = 1;
        self.cursor = None;
        changed
    }

    /// Take addressing metadata from a freshly fetched page.
    pub fn observe<R>(&mut self, page: &PageResult<R>) {
        let meta = &page.pagination;
        self.is_offset_based = meta.is_offset_based;
        self.has_next_page = meta.has_next_page;
        self.total_pages = meta.total_pages;
        self.count = page.count;
        if meta.is_offset_based {
            self.cursor = None;
        } else {
            self.cursor = page.next_cursor.clone();
        }
    }

    /// `load_next_page` is only valid for cursor-based queries with more data.
    pub fn can_load_next(&self) -> bool {
        !self.is_offset_based && self.has_next_page && self.cursor.is_some()
    }

    /// Address of the base page for the current state.
    pub fn address(&self) -> PageAddress {
        PageAddress::Offset {
            page: self.current_page,
        }
    }

    /// Address continuing a cursor-based query.
    pub fn next_address(&self) -> Option<PageAddress> {
        if !self.can_load_next() {
            return None;
        }
        self.cursor.clone().map(|cursor| PageAddress::Cursor { cursor })
    }
}
