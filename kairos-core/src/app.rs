//! Application loop
//!
//! `AppState::update` applies exactly one `AppEvent` to the state and returns
//! the effects to run next. Nothing in here performs I/O: the runner executes
//! effects and feeds their results back as new events.
//!
//! Results are tagged with the epoch or sequence number current when their
//! request was dispatched. A result whose tag no longer matches is stale and
//! dropped at apply time.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ViewerLinks;
use crate::confirm::{ConfirmPhase, ConfirmationFlow};
use crate::focus::{FocusFrame, FocusStack};
use crate::history::HistoryEvent;
use crate::model::{ExecutionDescription, ExecutionInfo, ExecutionPage, ExecutionRef, ExecutionStatus, PageToken};
use crate::query::{self, Filter, SearchField, SearchFilters};
use crate::sync::{ListRow, PageCache, RowSet};

pub const PAGE_SIZE: usize = 40;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub page_size: usize,
    pub status_interval: Duration,
    pub attempt_interval: Duration,
    pub count_interval: Duration,
    pub confirm_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            status_interval: Duration::from_secs(5),
            attempt_interval: Duration::from_secs(15),
            count_interval: Duration::from_secs(5),
            confirm_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Normal,
    Search {
        field: SearchField,
        buffer: String,
    },
}

/// An operation gated behind the confirmation flow
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DestructiveAction {
    Terminate { targets: Vec<ExecutionRef> },
    /// Reset each target to its first workflow-task completion
    Restart { targets: Vec<ExecutionRef> },
}

impl DestructiveAction {
    pub fn targets(&self) -> &[ExecutionRef] {
        match self {
            DestructiveAction::Terminate { targets } | DestructiveAction::Restart { targets } => {
                targets
            }
        }
    }

    fn verb(&self) -> (&'static str, &'static str) {
        match self {
            DestructiveAction::Terminate { .. } => ("Terminate", "Terminated"),
            DestructiveAction::Restart { .. } => ("Restart", "Restarted"),
        }
    }

    fn subject(&self) -> String {
        match self.targets() {
            [one] => one.workflow_id.clone(),
            many => format!("{} executions", many.len()),
        }
    }

    fn prompt(&self) -> String {
        format!("{} {}? (y/n)", self.verb().0, self.subject())
    }

    fn success_text(&self) -> String {
        format!("{} {}", self.verb().1, self.subject())
    }
}

/// User intents, already decoded from keys
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Refresh,
    BeginSearch(SearchField),
    SearchInput(char),
    SearchBackspace,
    /// Replace the buffer with the first suggestion
    SearchComplete,
    SearchSubmit,
    SearchCancel,
    ClearFilters,
    NextPage,
    PrevPage,
    CursorUp,
    CursorDown,
    ToggleSelect,
    Enter,
    Back,
    DrillIntoChild,
    OpenInBrowser,
    Terminate,
    Restart,
    ToggleParentsOnly,
    ToggleHelp,
    Confirm(bool),
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Timer {
    StatusSync,
    AttemptSync,
    CountSync(ExecutionStatus),
    ConfirmDismiss,
}

/// Everything needed to build a focus frame
#[derive(Clone, Debug, PartialEq)]
pub struct FocusLoad {
    pub description: ExecutionDescription,
    pub events: Vec<HistoryEvent>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AppEvent {
    Input(Action),
    Tick(Timer),
    ListFetched {
        epoch: u64,
        page: usize,
        result: Result<ExecutionPage, String>,
    },
    StatusSynced {
        epoch: u64,
        result: Result<Vec<ExecutionInfo>, String>,
    },
    AttemptsSynced {
        epoch: u64,
        result: Result<Vec<(ExecutionRef, u32)>, String>,
    },
    CountFetched {
        epoch: u64,
        status: ExecutionStatus,
        /// Issued by the status's count timer, which rearms on arrival
        from_timer: bool,
        result: Result<u64, String>,
    },
    FocusLoaded {
        seq: u64,
        execution: ExecutionRef,
        replace: bool,
        result: Result<FocusLoad, String>,
    },
    ActionFinished {
        result: Result<(), String>,
    },
    SuggestionsFetched {
        field: SearchField,
        prefix: String,
        result: Result<Vec<String>, String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    ListExecutions {
        epoch: u64,
        page: usize,
        filter: Filter,
        page_size: usize,
        token: Option<PageToken>,
    },
    SyncStatus {
        epoch: u64,
        filter: Filter,
        page_size: usize,
    },
    SyncAttempts {
        epoch: u64,
        targets: Vec<ExecutionRef>,
    },
    CountExecutions {
        epoch: u64,
        status: ExecutionStatus,
        from_timer: bool,
        filter: Filter,
    },
    LoadFocus {
        seq: u64,
        execution: ExecutionRef,
        replace: bool,
    },
    Execute(DestructiveAction),
    FetchSuggestions {
        field: SearchField,
        prefix: String,
        filter: Filter,
    },
    OpenUrl(String),
    Schedule {
        timer: Timer,
        after: Duration,
    },
    Quit,
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub settings: Settings,
    pub links: ViewerLinks,
    pub mode: InputMode,
    pub filters: SearchFilters,
    pub parents_only: bool,
    pub rows: RowSet,
    pub cursor: usize,
    pub selected: BTreeSet<ExecutionRef>,
    pub page: usize,
    pub pages: PageCache,
    pub counts: BTreeMap<ExecutionStatus, u64>,
    pub focus: FocusStack,
    pub confirm: ConfirmationFlow<DestructiveAction>,
    pub suggestions: Vec<String>,
    pub notice: Option<String>,
    pub show_help: bool,
    pub loading: bool,
    list_epoch: u64,
    filter_epoch: u64,
    focus_seq: u64,
}

impl AppState {
    pub fn new(links: ViewerLinks, settings: Settings) -> Self {
        Self {
            settings,
            links,
            mode: InputMode::Normal,
            filters: SearchFilters::new(),
            parents_only: false,
            rows: RowSet::new(),
            cursor: 0,
            selected: BTreeSet::new(),
            page: 0,
            pages: PageCache::new(),
            counts: BTreeMap::new(),
            focus: FocusStack::new(),
            confirm: ConfirmationFlow::new(),
            suggestions: Vec::new(),
            notice: None,
            show_help: false,
            loading: false,
            list_epoch: 0,
            filter_epoch: 0,
            focus_seq: 0,
        }
    }

    /// Effects to run at startup: first page, header counts and sync timers
    pub fn init(&mut self) -> Vec<Effect> {
        let mut effects = self.refetch(0);
        effects.extend(self.count_all(true));
        effects.push(Effect::Schedule {
            timer: Timer::StatusSync,
            after: self.settings.status_interval,
        });
        effects.push(Effect::Schedule {
            timer: Timer::AttemptSync,
            after: self.settings.attempt_interval,
        });
        effects
    }

    pub fn current_filter(&self) -> Filter {
        self.filters.to_filter(self.parents_only)
    }

    pub fn cursor_row(&self) -> Option<&ListRow> {
        self.rows.get(self.cursor)
    }

    pub fn is_searching(&self) -> bool {
        matches!(self.mode, InputMode::Search { .. })
    }

    pub fn update(&mut self, event: AppEvent) -> Vec<Effect> {
        match event {
            AppEvent::Input(action) => self.handle_action(action),
            AppEvent::Tick(timer) => self.handle_tick(timer),
            AppEvent::ListFetched {
                epoch,
                page,
                result,
            } => self.apply_list(epoch, page, result),
            AppEvent::StatusSynced { epoch, result } => {
                if epoch != self.list_epoch {
                    debug!(epoch, current = self.list_epoch, "discarding stale status sync");
                } else {
                    match result {
                        Ok(updates) => {
                            let changed = self.rows.merge_status(&updates);
                            debug!(changed, "status sync merged");
                        }
                        Err(e) => self.transient_failure("status sync", e),
                    }
                }
                vec![self.rearm(Timer::StatusSync)]
            }
            AppEvent::AttemptsSynced { epoch, result } => {
                if epoch != self.list_epoch {
                    debug!(epoch, current = self.list_epoch, "discarding stale attempt sync");
                } else {
                    match result {
                        Ok(attempts) => {
                            self.rows.merge_attempts(&attempts);
                        }
                        Err(e) => self.transient_failure("attempt sync", e),
                    }
                }
                vec![self.rearm(Timer::AttemptSync)]
            }
            AppEvent::CountFetched {
                epoch,
                status,
                from_timer,
                result,
            } => {
                if epoch == self.filter_epoch {
                    match result {
                        Ok(n) => {
                            self.counts.insert(status, n);
                        }
                        Err(e) => self.transient_failure("count", e),
                    }
                } else {
                    debug!(epoch, current = self.filter_epoch, ?status, "discarding stale count");
                }
                if from_timer {
                    vec![self.rearm(Timer::CountSync(status))]
                } else {
                    vec![]
                }
            }
            AppEvent::FocusLoaded {
                seq,
                execution,
                replace,
                result,
            } => self.apply_focus(seq, execution, replace, result),
            AppEvent::ActionFinished { result } => self.apply_action_result(result),
            AppEvent::SuggestionsFetched {
                field,
                prefix,
                result,
            } => {
                let current = match &self.mode {
                    InputMode::Search { field: f, buffer } => *f == field && *buffer == prefix,
                    InputMode::Normal => false,
                };
                if current {
                    match result {
                        Ok(values) => self.suggestions = values,
                        Err(e) => warn!(error = %e, "suggestion lookup failed"),
                    }
                }
                vec![]
            }
        }
    }

    fn handle_action(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::Quit => vec![Effect::Quit],
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                vec![]
            }
            Action::Refresh => match self.focus.top() {
                Some(frame) => {
                    let execution = frame.execution.clone();
                    self.load_focus(execution, true)
                }
                None => self.refetch(self.page),
            },
            Action::BeginSearch(field) => {
                self.mode = InputMode::Search {
                    field,
                    buffer: String::new(),
                };
                self.suggestions.clear();
                self.suggest()
            }
            Action::SearchInput(c) => {
                if let InputMode::Search { buffer, .. } = &mut self.mode {
                    buffer.push(c);
                }
                self.suggest()
            }
            Action::SearchBackspace => {
                if let InputMode::Search { buffer, .. } = &mut self.mode {
                    buffer.pop();
                }
                self.suggest()
            }
            Action::SearchComplete => {
                if let (InputMode::Search { buffer, .. }, Some(first)) =
                    (&mut self.mode, self.suggestions.first())
                {
                    *buffer = first.clone();
                }
                vec![]
            }
            Action::SearchSubmit => {
                let mode = std::mem::take(&mut self.mode);
                self.suggestions.clear();
                match mode {
                    InputMode::Search { field, buffer } if self.filters.add(field, &buffer) => {
                        self.filter_changed()
                    }
                    _ => vec![],
                }
            }
            Action::SearchCancel => {
                self.mode = InputMode::Normal;
                self.suggestions.clear();
                vec![]
            }
            Action::ClearFilters => {
                self.filters.clear();
                self.filter_changed()
            }
            Action::ToggleParentsOnly => {
                self.parents_only = !self.parents_only;
                self.filter_changed()
            }
            Action::NextPage => {
                if !self.focus.is_empty() {
                    return vec![];
                }
                if self.pages.has_next(self.page) {
                    self.refetch(self.page + 1)
                } else {
                    self.notice = Some("already on the last page".into());
                    vec![]
                }
            }
            Action::PrevPage => {
                if self.focus.is_empty() && self.page > 0 {
                    self.refetch(self.page - 1)
                } else {
                    vec![]
                }
            }
            Action::CursorUp => {
                match self.focus.top_mut() {
                    Some(frame) => frame.cursor_up(),
                    None => self.cursor = self.cursor.saturating_sub(1),
                }
                vec![]
            }
            Action::CursorDown => {
                match self.focus.top_mut() {
                    Some(frame) => frame.cursor_down(),
                    None => {
                        if self.cursor + 1 < self.rows.len() {
                            self.cursor += 1;
                        }
                    }
                }
                vec![]
            }
            Action::ToggleSelect => {
                if self.focus.is_empty() {
                    if let Some(id) = self.cursor_row().map(|r| r.id().clone()) {
                        if !self.selected.remove(&id) {
                            self.selected.insert(id);
                        }
                    }
                }
                vec![]
            }
            Action::Enter => {
                if !self.focus.is_empty() {
                    return self.drill_into_child();
                }
                match self.cursor_row().map(|r| r.id().clone()) {
                    Some(execution) => self.load_focus(execution, false),
                    None => vec![],
                }
            }
            Action::DrillIntoChild => self.drill_into_child(),
            Action::Back => {
                // any in-flight focus load is for a view we are leaving
                self.focus_seq += 1;
                self.loading = false;
                if self.focus.pop().is_none() {
                    self.selected.clear();
                }
                vec![]
            }
            Action::OpenInBrowser => {
                let target = match self.focus.top() {
                    Some(frame) => Some(frame.execution.clone()),
                    None => self.cursor_row().map(|r| r.id().clone()),
                };
                match target {
                    Some(execution) => vec![Effect::OpenUrl(self.links.execution_url(&execution))],
                    None => vec![],
                }
            }
            Action::Terminate => {
                let targets = self.action_targets();
                self.request(DestructiveAction::Terminate { targets })
            }
            Action::Restart => {
                let targets = self.action_targets();
                self.request(DestructiveAction::Restart { targets })
            }
            Action::Confirm(yes) => match self.confirm.respond(yes) {
                Ok(Some(action)) => {
                    info!(?action, "executing destructive action");
                    vec![Effect::Execute(action)]
                }
                Ok(None) => vec![],
                Err(e) => {
                    debug!(error = %e, "confirmation answer ignored");
                    vec![]
                }
            },
        }
    }

    fn handle_tick(&mut self, timer: Timer) -> Vec<Effect> {
        match timer {
            Timer::StatusSync => {
                let running = self.rows.running();
                if running.is_empty() {
                    return vec![self.rearm(Timer::StatusSync)];
                }
                vec![Effect::SyncStatus {
                    epoch: self.list_epoch,
                    filter: query::running_filter(&running),
                    page_size: self.settings.page_size.max(running.len()),
                }]
            }
            Timer::AttemptSync => {
                let running = self.rows.running();
                if running.is_empty() {
                    return vec![self.rearm(Timer::AttemptSync)];
                }
                vec![Effect::SyncAttempts {
                    epoch: self.list_epoch,
                    targets: running,
                }]
            }
            Timer::CountSync(status) => vec![self.count_effect(status, true)],
            Timer::ConfirmDismiss => {
                if let Err(e) = self.confirm.dismiss() {
                    debug!(error = %e, "nothing to dismiss");
                }
                vec![]
            }
        }
    }

    fn rearm(&self, timer: Timer) -> Effect {
        let after = match timer {
            Timer::StatusSync => self.settings.status_interval,
            Timer::AttemptSync => self.settings.attempt_interval,
            Timer::CountSync(_) => self.settings.count_interval,
            Timer::ConfirmDismiss => self.settings.confirm_timeout,
        };
        Effect::Schedule { timer, after }
    }

    fn transient_failure(&mut self, what: &str, error: String) {
        warn!(error = %error, "{} failed", what);
        self.notice = Some(format!("{} failed: {}", what, error));
    }

    /// Dispatch a full refetch of `page`
    fn refetch(&mut self, page: usize) -> Vec<Effect> {
        let token = match self.pages.token_for(page) {
            Ok(token) => token,
            Err(e) => {
                self.notice = Some(e.to_string());
                return vec![];
            }
        };
        self.list_epoch += 1;
        self.loading = true;
        vec![Effect::ListExecutions {
            epoch: self.list_epoch,
            page,
            filter: self.current_filter(),
            page_size: self.settings.page_size,
            token,
        }]
    }

    fn apply_list(
        &mut self,
        epoch: u64,
        page: usize,
        result: Result<ExecutionPage, String>,
    ) -> Vec<Effect> {
        if epoch != self.list_epoch {
            debug!(epoch, current = self.list_epoch, "discarding stale list result");
            return vec![];
        }
        self.loading = false;
        match result {
            Ok(fetched) => {
                self.pages.record(page, fetched.next_page_token);
                self.rows.replace(fetched.executions);
                self.page = page;
                let present = self.rows.identities();
                self.selected.retain(|id| present.contains(id));
                self.cursor = self.cursor.min(self.rows.len().saturating_sub(1));
                self.notice = None;
            }
            Err(e) => self.transient_failure("list", e),
        }
        vec![]
    }

    fn filter_changed(&mut self) -> Vec<Effect> {
        self.pages.reset();
        self.page = 0;
        self.cursor = 0;
        self.filter_epoch += 1;
        self.counts.clear();
        let mut effects = self.refetch(0);
        effects.extend(self.count_all(false));
        effects
    }

    fn count_all(&self, from_timer: bool) -> Vec<Effect> {
        ExecutionStatus::HEADLINE
            .iter()
            .map(|status| self.count_effect(*status, from_timer))
            .collect()
    }

    fn count_effect(&self, status: ExecutionStatus, from_timer: bool) -> Effect {
        Effect::CountExecutions {
            epoch: self.filter_epoch,
            status,
            from_timer,
            filter: query::count_filter(&self.current_filter(), status),
        }
    }

    fn suggest(&mut self) -> Vec<Effect> {
        let InputMode::Search { field, buffer } = &self.mode else {
            return vec![];
        };
        if *field == SearchField::ExecutionStatus {
            self.suggestions = query::status_suggestions(buffer);
            return vec![];
        }
        if buffer.is_empty() {
            self.suggestions.clear();
            return vec![];
        }
        match query::suggestion_filter(*field, buffer) {
            Some(filter) => vec![Effect::FetchSuggestions {
                field: *field,
                prefix: buffer.clone(),
                filter,
            }],
            None => vec![],
        }
    }

    fn load_focus(&mut self, execution: ExecutionRef, replace: bool) -> Vec<Effect> {
        self.focus_seq += 1;
        self.loading = true;
        vec![Effect::LoadFocus {
            seq: self.focus_seq,
            execution,
            replace,
        }]
    }

    fn apply_focus(
        &mut self,
        seq: u64,
        execution: ExecutionRef,
        replace: bool,
        result: Result<FocusLoad, String>,
    ) -> Vec<Effect> {
        if seq != self.focus_seq {
            debug!(seq, current = self.focus_seq, %execution, "discarding stale focus load");
            return vec![];
        }
        self.loading = false;
        let loaded = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                self.transient_failure("history", e);
                return vec![];
            }
        };
        match FocusFrame::build(execution, &loaded.description, &loaded.events) {
            Ok(frame) => {
                if replace {
                    if let Some(top) = self.focus.top_mut() {
                        let cursor = top.cursor.min(frame.history.len().saturating_sub(1));
                        *top = FocusFrame { cursor, ..frame };
                        return vec![];
                    }
                }
                self.focus.push(frame);
            }
            Err(e) => {
                warn!(error = %e, "history could not be compacted");
                self.notice = Some(e.to_string());
            }
        }
        vec![]
    }

    fn drill_into_child(&mut self) -> Vec<Effect> {
        match self.focus.child_target() {
            Ok(child) => self.load_focus(child, false),
            Err(e) => {
                self.notice = Some(e.to_string());
                vec![]
            }
        }
    }

    /// Focused execution, else the toggled selection in row order, else the
    /// row under the cursor
    fn action_targets(&self) -> Vec<ExecutionRef> {
        if let Some(frame) = self.focus.top() {
            return vec![frame.execution.clone()];
        }
        if !self.selected.is_empty() {
            return self
                .rows
                .rows()
                .iter()
                .map(|r| r.id())
                .filter(|id| self.selected.contains(*id))
                .cloned()
                .collect();
        }
        self.cursor_row().map(|r| r.id().clone()).into_iter().collect()
    }

    fn request(&mut self, action: DestructiveAction) -> Vec<Effect> {
        if action.targets().is_empty() {
            self.notice = Some("no execution selected".into());
            return vec![];
        }
        let prompt = action.prompt();
        let success = action.success_text();
        if let Err(e) = self.confirm.request(action, prompt, success) {
            self.notice = Some(e.to_string());
        }
        vec![]
    }

    fn apply_action_result(&mut self, result: Result<(), String>) -> Vec<Effect> {
        let succeeded = result.is_ok();
        if let Err(e) = &result {
            warn!(error = %e, "destructive action failed");
        }
        if let Err(e) = self.confirm.finish(result) {
            debug!(error = %e, "action result without an executing action");
            return vec![];
        }
        let mut effects = vec![self.rearm(Timer::ConfirmDismiss)];
        if succeeded {
            self.selected.clear();
            effects.extend(self.refetch(self.page));
            if let Some(frame) = self.focus.top() {
                let execution = frame.execution.clone();
                effects.extend(self.load_focus(execution, true));
            }
        }
        effects
    }

    pub fn confirm_phase(&self) -> ConfirmPhase {
        self.confirm.phase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionProfile;
    use crate::history::EventType;

    fn info(id: &str, status: ExecutionStatus) -> ExecutionInfo {
        ExecutionInfo {
            execution: ExecutionRef::new(id, "r1"),
            workflow_type: "Sample".into(),
            status,
            start_time: None,
            close_time: None,
            parent: None,
        }
    }

    fn state() -> AppState {
        AppState::new(ConnectionProfile::local().viewer_links(), Settings::default())
    }

    fn list_epoch(effects: &[Effect]) -> (u64, usize) {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::ListExecutions { epoch, page, .. } => Some((*epoch, *page)),
                _ => None,
            })
            .unwrap()
    }

    /// State with the first page loaded
    fn loaded(rows: Vec<ExecutionInfo>, next: Option<PageToken>) -> AppState {
        let mut app = state();
        let effects = app.init();
        let (epoch, page) = list_epoch(&effects);
        app.update(AppEvent::ListFetched {
            epoch,
            page,
            result: Ok(ExecutionPage {
                executions: rows,
                next_page_token: next,
            }),
        });
        app
    }

    fn sample() -> AppState {
        loaded(
            vec![
                info("a", ExecutionStatus::Running),
                info("b", ExecutionStatus::Completed),
                info("c", ExecutionStatus::Running),
            ],
            Some(PageToken(vec![7])),
        )
    }

    fn input(app: &mut AppState, action: Action) -> Vec<Effect> {
        app.update(AppEvent::Input(action))
    }

    #[test]
    fn test_init_dispatches_list_counts_and_timers() {
        let mut app = state();
        let effects = app.init();
        assert!(matches!(effects[0], Effect::ListExecutions { page: 0, token: None, .. }));
        let counts = effects
            .iter()
            .filter(|e| matches!(e, Effect::CountExecutions { from_timer: true, .. }))
            .count();
        assert_eq!(counts, ExecutionStatus::HEADLINE.len());
        assert!(effects.contains(&Effect::Schedule {
            timer: Timer::StatusSync,
            after: Duration::from_secs(5),
        }));
        assert!(app.loading);
    }

    #[test]
    fn test_stale_list_result_discarded() {
        let mut app = sample();
        let first = input(&mut app, Action::Refresh);
        let second = input(&mut app, Action::Refresh);
        let (old, _) = list_epoch(&first);
        let (new, _) = list_epoch(&second);
        app.update(AppEvent::ListFetched {
            epoch: old,
            page: 0,
            result: Ok(ExecutionPage {
                executions: vec![],
                next_page_token: None,
            }),
        });
        assert_eq!(app.rows.len(), 3);
        app.update(AppEvent::ListFetched {
            epoch: new,
            page: 0,
            result: Ok(ExecutionPage {
                executions: vec![info("z", ExecutionStatus::Failed)],
                next_page_token: None,
            }),
        });
        assert_eq!(app.rows.len(), 1);
    }

    #[test]
    fn test_status_sync_after_refetch_is_stale() {
        let mut app = sample();
        let tick = app.update(AppEvent::Tick(Timer::StatusSync));
        let Effect::SyncStatus { epoch, filter, .. } = &tick[0] else {
            panic!("expected a status sync, got {:?}", tick);
        };
        assert_eq!(filter.to_query(), "WorkflowId IN ('a', 'c')");
        let epoch = *epoch;

        // a refetch lands first; the sync result must not touch the new rows
        input(&mut app, Action::Refresh);
        let effects = app.update(AppEvent::StatusSynced {
            epoch,
            result: Ok(vec![info("a", ExecutionStatus::Failed)]),
        });
        assert_eq!(app.rows.get(0).unwrap().info.status, ExecutionStatus::Running);
        // the timer rearms either way
        assert!(matches!(
            effects[0],
            Effect::Schedule { timer: Timer::StatusSync, .. }
        ));
    }

    #[test]
    fn test_status_sync_merges_in_place() {
        let mut app = sample();
        let tick = app.update(AppEvent::Tick(Timer::StatusSync));
        let Effect::SyncStatus { epoch, .. } = tick[0] else {
            panic!("expected a status sync");
        };
        app.update(AppEvent::StatusSynced {
            epoch,
            result: Ok(vec![info("c", ExecutionStatus::Completed)]),
        });
        assert_eq!(app.rows.get(2).unwrap().info.status, ExecutionStatus::Completed);
        assert_eq!(app.rows.len(), 3);
    }

    #[test]
    fn test_sync_tick_without_running_rows_rearms() {
        let mut app = loaded(vec![info("b", ExecutionStatus::Completed)], None);
        let effects = app.update(AppEvent::Tick(Timer::AttemptSync));
        assert_eq!(
            effects,
            vec![Effect::Schedule {
                timer: Timer::AttemptSync,
                after: Duration::from_secs(15),
            }]
        );
    }

    #[test]
    fn test_sync_failure_keeps_rows_and_sets_notice() {
        let mut app = sample();
        let tick = app.update(AppEvent::Tick(Timer::AttemptSync));
        let Effect::SyncAttempts { epoch, .. } = tick[0] else {
            panic!("expected an attempt sync");
        };
        app.update(AppEvent::AttemptsSynced {
            epoch,
            result: Err("unavailable".into()),
        });
        assert_eq!(app.rows.len(), 3);
        assert!(app.notice.as_deref().unwrap().contains("unavailable"));
    }

    #[test]
    fn test_pagination_requires_previous_page() {
        let mut app = sample();
        let effects = input(&mut app, Action::NextPage);
        let Effect::ListExecutions { page, token, epoch, .. } = &effects[0] else {
            panic!("expected a list fetch");
        };
        assert_eq!(*page, 1);
        assert_eq!(token, &Some(PageToken(vec![7])));
        app.update(AppEvent::ListFetched {
            epoch: *epoch,
            page: 1,
            result: Ok(ExecutionPage {
                executions: vec![info("d", ExecutionStatus::Running)],
                next_page_token: None,
            }),
        });
        assert_eq!(app.page, 1);

        assert!(input(&mut app, Action::NextPage).is_empty());
        let back = input(&mut app, Action::PrevPage);
        assert!(matches!(back[0], Effect::ListExecutions { page: 0, token: None, .. }));
    }

    #[test]
    fn test_search_submit_refetches_and_recounts() {
        let mut app = sample();
        input(&mut app, Action::BeginSearch(SearchField::ExecutionStatus));
        for c in "failed".chars() {
            input(&mut app, Action::SearchInput(c));
        }
        assert_eq!(app.suggestions, vec!["Failed".to_string()]);
        let effects = input(&mut app, Action::SearchSubmit);
        assert_eq!(app.mode, InputMode::Normal);
        let Effect::ListExecutions { filter, page, .. } = &effects[0] else {
            panic!("expected a list fetch");
        };
        assert_eq!(*page, 0);
        assert_eq!(filter.to_query(), "ExecutionStatus = 'Failed'");
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::CountExecutions { from_timer: false, .. }
        )));
    }

    #[test]
    fn test_search_cancel_keeps_filters() {
        let mut app = sample();
        input(&mut app, Action::BeginSearch(SearchField::WorkflowType));
        let effects = input(&mut app, Action::SearchInput('O'));
        assert!(matches!(effects[0], Effect::FetchSuggestions { .. }));
        assert!(input(&mut app, Action::SearchCancel).is_empty());
        assert!(app.filters.is_empty());
    }

    #[test]
    fn test_stale_count_dropped_after_filter_change() {
        let mut app = sample();
        let tick = app.update(AppEvent::Tick(Timer::CountSync(ExecutionStatus::Running)));
        let Effect::CountExecutions { epoch, .. } = tick[0] else {
            panic!("expected a count");
        };
        input(&mut app, Action::ToggleParentsOnly);
        let effects = app.update(AppEvent::CountFetched {
            epoch,
            status: ExecutionStatus::Running,
            from_timer: true,
            result: Ok(99),
        });
        assert!(app.counts.get(&ExecutionStatus::Running).is_none());
        assert!(matches!(
            effects[0],
            Effect::Schedule { timer: Timer::CountSync(ExecutionStatus::Running), .. }
        ));
    }

    #[test]
    fn test_terminate_confirm_flow() {
        let mut app = sample();
        input(&mut app, Action::Terminate);
        assert_eq!(app.confirm_phase(), ConfirmPhase::AwaitingConfirmation);
        assert_eq!(app.confirm.prompt(), "Terminate a? (y/n)");

        assert!(input(&mut app, Action::Confirm(false)).is_empty());
        assert_eq!(app.confirm_phase(), ConfirmPhase::Idle);

        input(&mut app, Action::Terminate);
        let effects = input(&mut app, Action::Confirm(true));
        assert_eq!(
            effects,
            vec![Effect::Execute(DestructiveAction::Terminate {
                targets: vec![ExecutionRef::new("a", "r1")],
            })]
        );
        assert_eq!(app.confirm_phase(), ConfirmPhase::Executing);

        let after = app.update(AppEvent::ActionFinished { result: Ok(()) });
        assert_eq!(app.confirm_phase(), ConfirmPhase::Completed);
        assert!(after.contains(&Effect::Schedule {
            timer: Timer::ConfirmDismiss,
            after: Duration::from_secs(3),
        }));
        assert!(after.iter().any(|e| matches!(e, Effect::ListExecutions { .. })));

        app.update(AppEvent::Tick(Timer::ConfirmDismiss));
        assert_eq!(app.confirm_phase(), ConfirmPhase::Idle);
    }

    #[test]
    fn test_failed_action_reports_without_refetch() {
        let mut app = sample();
        input(&mut app, Action::Terminate);
        input(&mut app, Action::Confirm(true));

        let after = app.update(AppEvent::ActionFinished {
            result: Err("a: request rejected (400): already closed".into()),
        });
        assert_eq!(app.confirm_phase(), ConfirmPhase::Completed);
        assert_eq!(
            app.confirm.outcome(),
            Some(&Err("a: request rejected (400): already closed".to_string()))
        );
        assert_eq!(
            after,
            vec![Effect::Schedule {
                timer: Timer::ConfirmDismiss,
                after: Duration::from_secs(3),
            }]
        );

        app.update(AppEvent::Tick(Timer::ConfirmDismiss));
        assert_eq!(app.confirm_phase(), ConfirmPhase::Idle);
    }

    #[test]
    fn test_request_while_busy_is_rejected() {
        let mut app = sample();
        input(&mut app, Action::Terminate);
        input(&mut app, Action::Confirm(true));
        input(&mut app, Action::Restart);
        assert_eq!(app.notice.as_deref(), Some("another action is in progress"));
        assert!(matches!(
            app.confirm.action(),
            Some(DestructiveAction::Terminate { .. })
        ));
    }

    #[test]
    fn test_selection_targets_and_pruning() {
        let mut app = sample();
        input(&mut app, Action::CursorDown);
        input(&mut app, Action::CursorDown);
        input(&mut app, Action::ToggleSelect);
        input(&mut app, Action::CursorUp);
        input(&mut app, Action::CursorUp);
        input(&mut app, Action::ToggleSelect);
        input(&mut app, Action::Restart);
        assert_eq!(app.confirm.prompt(), "Restart 2 executions? (y/n)");
        let targets: Vec<_> = app
            .confirm
            .action()
            .unwrap()
            .targets()
            .iter()
            .map(|t| t.workflow_id.clone())
            .collect();
        assert_eq!(targets, vec!["a", "c"]);

        let effects = input(&mut app, Action::Refresh);
        let (epoch, _) = list_epoch(&effects);
        app.update(AppEvent::ListFetched {
            epoch,
            page: 0,
            result: Ok(ExecutionPage {
                executions: vec![info("c", ExecutionStatus::Running)],
                next_page_token: None,
            }),
        });
        assert_eq!(app.selected.len(), 1);
        assert_eq!(app.cursor, 0);
    }

    fn focus_load(id: &ExecutionRef, child: Option<ExecutionRef>) -> FocusLoad {
        let mut events = vec![
            HistoryEvent::new(1, EventType::WorkflowExecutionStarted),
            HistoryEvent::new(2, EventType::WorkflowTaskScheduled),
            HistoryEvent::new(3, EventType::WorkflowTaskStarted),
            HistoryEvent::new(4, EventType::WorkflowTaskCompleted),
            HistoryEvent::new(5, EventType::StartChildWorkflowExecutionInitiated).with_name("Child"),
        ];
        if let Some(child) = child {
            events.push(
                HistoryEvent::new(6, EventType::ChildWorkflowExecutionStarted)
                    .with_back_reference(5)
                    .with_child_execution(child),
            );
        }
        FocusLoad {
            description: ExecutionDescription {
                info: ExecutionInfo {
                    execution: id.clone(),
                    ..info(&id.workflow_id, ExecutionStatus::Running)
                },
                pending_activities: vec![],
            },
            events,
        }
    }

    fn land_focus(app: &mut AppState, effects: Vec<Effect>, child: Option<ExecutionRef>) {
        let Some(Effect::LoadFocus {
            seq,
            execution,
            replace,
        }) = effects.into_iter().next()
        else {
            panic!("expected a focus load");
        };
        let result = Ok(focus_load(&execution, child));
        app.update(AppEvent::FocusLoaded {
            seq,
            execution,
            replace,
            result,
        });
    }

    #[test]
    fn test_focus_drill_and_back() {
        let mut app = sample();
        let child = ExecutionRef::new("child", "r9");

        let effects = input(&mut app, Action::Enter);
        land_focus(&mut app, effects, Some(child.clone()));
        assert_eq!(app.focus.depth(), 1);

        let effects = input(&mut app, Action::DrillIntoChild);
        land_focus(&mut app, effects, None);
        assert_eq!(app.focus.depth(), 2);
        assert_eq!(app.focus.top().unwrap().execution, child);

        let url = input(&mut app, Action::OpenInBrowser);
        assert_eq!(
            url,
            vec![Effect::OpenUrl(
                "http://localhost:8233/namespaces/default/workflows/child/r9/history".into()
            )]
        );

        input(&mut app, Action::Back);
        assert_eq!(app.focus.depth(), 1);
        input(&mut app, Action::Back);
        assert_eq!(app.focus.depth(), 0);
    }

    #[test]
    fn test_focus_load_after_back_is_discarded() {
        let mut app = sample();
        let effects = input(&mut app, Action::Enter);
        input(&mut app, Action::Back);
        land_focus(&mut app, effects, None);
        assert!(app.focus.is_empty());
    }

    #[test]
    fn test_drill_without_started_child_sets_notice() {
        let mut app = sample();
        let effects = input(&mut app, Action::Enter);
        land_focus(&mut app, effects, None);
        assert!(input(&mut app, Action::DrillIntoChild).is_empty());
        assert_eq!(app.focus.depth(), 1);
        assert!(app.notice.is_some());
    }

    #[test]
    fn test_compaction_error_keeps_list_view() {
        let mut app = sample();
        let effects = input(&mut app, Action::Enter);
        let Effect::LoadFocus { seq, execution, .. } = effects[0].clone() else {
            panic!("expected a focus load");
        };
        let mut load = focus_load(&execution, None);
        load.events
            .push(HistoryEvent::new(7, EventType::TimerFired).with_back_reference(42));
        app.update(AppEvent::FocusLoaded {
            seq,
            execution,
            replace: false,
            result: Ok(load),
        });
        assert!(app.focus.is_empty());
        assert!(app.notice.is_some());
    }
}
