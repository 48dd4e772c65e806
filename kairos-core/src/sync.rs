//! Visible execution list: full refetch, pagination and background merge
//!
//! Only a full refetch changes which rows exist or their order. Background
//! syncs overwrite live fields of rows they can match by identity and leave
//! everything else alone.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ExecutionInfo, ExecutionRef, PageToken};

/// Attempts above this are highlighted as a likely stuck activity
pub const ATTEMPT_THRESHOLD: u32 = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct ListRow {
    pub info: ExecutionInfo,
    /// Highest pending-activity attempt, 0 when nothing is retrying
    pub attempts: u32,
}

impl ListRow {
    pub fn new(info: ExecutionInfo) -> Self {
        Self { info, attempts: 0 }
    }

    pub fn id(&self) -> &ExecutionRef {
        &self.info.execution
    }

    pub fn attempts_label(&self) -> String {
        if self.attempts == 0 {
            "--".to_string()
        } else {
            self.attempts.to_string()
        }
    }

    pub fn over_threshold(&self) -> bool {
        self.attempts > ATTEMPT_THRESHOLD
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowSet {
    rows: Vec<ListRow>,
}

impl RowSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[ListRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ListRow> {
        self.rows.get(index)
    }

    /// Full refetch: replace membership and order wholesale
    pub fn replace(&mut self, executions: Vec<ExecutionInfo>) {
        self.rows = executions.into_iter().map(ListRow::new).collect();
    }

    /// Rows whose execution has not reached a final status
    pub fn running(&self) -> Vec<ExecutionRef> {
        self.rows
            .iter()
            .filter(|r| !r.info.status.is_terminal())
            .map(|r| r.id().clone())
            .collect()
    }

    /// Merge status and close time from a background sync. Rows the update
    /// does not mention are untouched; updates for unknown rows are ignored.
    /// Returns how many rows changed.
    pub fn merge_status(&mut self, updates: &[ExecutionInfo]) -> usize {
        let by_id: BTreeMap<&ExecutionRef, &ExecutionInfo> =
            updates.iter().map(|u| (&u.execution, u)).collect();
        let mut changed = 0;
        for row in &mut self.rows {
            let Some(update) = by_id.get(&row.info.execution) else {
                continue;
            };
            let attempts = if update.status.is_terminal() { 0 } else { row.attempts };
            if row.info.status != update.status
                || row.info.close_time != update.close_time
                || row.attempts != attempts
            {
                row.info.status = update.status;
                row.info.close_time = update.close_time;
                // nothing is pending once a run has closed
                row.attempts = attempts;
                changed += 1;
            }
        }
        changed
    }

    /// Merge resolved attempt counts. Only rows still running take a new
    /// count; rows not mentioned keep theirs.
    pub fn merge_attempts(&mut self, attempts: &[(ExecutionRef, u32)]) -> usize {
        let by_id: BTreeMap<&ExecutionRef, u32> = attempts.iter().map(|(id, n)| (id, *n)).collect();
        let mut changed = 0;
        for row in &mut self.rows {
            if row.info.status.is_terminal() {
                continue;
            }
            if let Some(&n) = by_id.get(&row.info.execution) {
                if row.attempts != n {
                    row.attempts = n;
                    changed += 1;
                }
            }
        }
        changed
    }

    pub fn identities(&self) -> BTreeSet<ExecutionRef> {
        self.rows.iter().map(|r| r.id().clone()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page {page} cannot be requested before the page preceding it has been fetched")]
    Unresolved { page: usize },
    #[error("page {page} is past the last page")]
    Exhausted { page: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PageSlot {
    Token(PageToken),
    End,
}

/// Next-page tokens keyed by the page they unlock
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageCache {
    slots: BTreeMap<usize, PageSlot>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// Token needed to fetch `page`; page 0 never needs one
    pub fn token_for(&self, page: usize) -> Result<Option<PageToken>, PageError> {
        if page == 0 {
            return Ok(None);
        }
        match self.slots.get(&page) {
            Some(PageSlot::Token(token)) => Ok(Some(token.clone())),
            Some(PageSlot::End) => Err(PageError::Exhausted { page }),
            None => Err(PageError::Unresolved { page }),
        }
    }

    /// Record what fetching `page` revealed about the page after it
    pub fn record(&mut self, page: usize, next: Option<PageToken>) {
        let slot = match next {
            Some(token) => PageSlot::Token(token),
            None => PageSlot::End,
        };
        self.slots.insert(page + 1, slot);
    }

    pub fn has_next(&self, page: usize) -> bool {
        matches!(self.slots.get(&(page + 1)), Some(PageSlot::Token(_)))
    }
}
