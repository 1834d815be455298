use std::sync::Arc;

use boardkit_api::ViewKind;

use super::ViewModel;
use super::calendar::CalendarWindow;

/// Identity of everything a projection depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoKey {
    pub cache_revision: u64,
    pub filter_revision: u64,
    pub view: ViewKind,
    pub window: Option<CalendarWindow>,
}

/// Single-slot memo: the projection is recomputed only when its key changes.
///
/// The filtered record positions are kept separately, keyed on the cache and
/// filter revisions only, so a view switch reuses them.
#[derive(Debug, Default)]
pub struct ViewMemo {
    last: Option<(MemoKey, Arc<ViewModel>)>,
    computed: u64,
    visible: Option<((u64, u64), Arc<[usize]>)>,
    filtered: u64,
}

impl ViewMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_project<F>(&mut self, key: MemoKey, project: F) -> Arc<ViewModel>
    where
        F: FnOnce() -> ViewModel,
    {
        if let Some((last_key, model)) = &self.last {
            if *last_key == key {
                return Arc::clone(model);
            }
        }
        let model = Arc::new(project());
        self.computed += 1;
        self.last = Some((key, Arc::clone(&model)));
        model
    }

    /// Positions of the visible records for the given revisions.
    pub fn visible_positions<F>(
        &mut self,
        cache_revision: u64,
        filter_revision: u64,
        filter: F,
    ) -> Arc<[usize]>
    where
        F: FnOnce() -> Vec<usize>,
    {
        let key = (cache_revision, filter_revision);
        if let Some((last_key, positions)) = &self.visible {
            if *last_key == key {
                return Arc::clone(positions);
            }
        }
        let positions: Arc<[usize]> = filter().into();
        self.filtered += 1;
        self.visible = Some((key, Arc::clone(&positions)));
        positions
    }

    /// Number of projections computed so far
    pub fn computed(&self) -> u64 {
        self.computed
    }

    /// Number of filter passes run so far
    pub fn filtered(&self) -> u64 {
        self.filtered
    }

    pub fn invalidate(&mut self) {
        self.last = None;
        self.visible = None;
    }
}
