use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent};
use tracing::{debug, warn};

use crate::action::Action;
use crate::command::Command;
use crate::event::Event;
use crate::filter;
use crate::store::{PrStatus, StatusStore};
use crate::types::PullRequestRecord;

/// Which of the two dashboard lists receives navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListKind {
    #[default]
    NeedsReview,
    Mine,
}

impl ListKind {
    pub fn other(self) -> Self {
        match self {
            ListKind::NeedsReview => ListKind::Mine,
            ListKind::Mine => ListKind::NeedsReview,
        }
    }
}

/// Dominant view. An error stays on screen until a refresh succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Loading,
    Ready,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub needs_review_query: String,
    pub mine_query: String,
    pub refresh_interval: Duration,
}

pub struct App {
    pub needs_review: Vec<PullRequestRecord>,
    pub mine: Vec<PullRequestRecord>,
    pub active: ListKind,
    /// Index into the visible projection of the active list.
    pub cursor: usize,
    pub show_hidden: bool,
    pub mode: Mode,
    pub viewport: (u16, u16),
    pub should_quit: bool,

    // Computed once per applied load; rendering only reads these.
    statuses: HashMap<u64, PrStatus>,
    hidden: HashSet<u64>,

    next_load_id: u64,
    applied_load_id: u64,
    store: StatusStore,
    settings: SessionSettings,
}

impl App {
    pub fn new(store: StatusStore, settings: SessionSettings) -> Self {
        Self {
            needs_review: Vec::new(),
            mine: Vec::new(),
            active: ListKind::default(),
            cursor: 0,
            show_hidden: false,
            mode: Mode::Loading,
            viewport: (0, 0),
            should_quit: false,
            statuses: HashMap::new(),
            hidden: HashSet::new(),
            next_load_id: 0,
            applied_load_id: 0,
            store,
            settings,
        }
    }

    /// Hands the store back so the caller can close it explicitly.
    pub fn into_store(self) -> StatusStore {
        self.store
    }

    pub fn handle_event(&self, event: Event) -> Action {
        if event.is_quit() {
            return Action::Quit;
        }
        match event {
            Event::Init => Action::RefreshTick,
            Event::Resize(w, h) => Action::Resized(w, h),
            Event::Key(key) => self.handle_key(key),
            _ => Action::None,
        }
    }

    fn handle_key(&self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            KeyCode::Tab | KeyCode::BackTab => Action::ToggleActiveList,
            KeyCode::Char('j') | KeyCode::Down => Action::CursorDown,
            KeyCode::Char('k') | KeyCode::Up => Action::CursorUp,
            KeyCode::Char('g') | KeyCode::Home => Action::GoToTop,
            KeyCode::Char('G') | KeyCode::End => Action::GoToBottom,
            KeyCode::Char('r') => Action::RefreshRequested,
            KeyCode::Char('a') => Action::AutomationRequested,
            KeyCode::Char('h') => Action::ToggleHidden,
            KeyCode::Char('H') => Action::ToggleShowHidden,
            KeyCode::Char('m') => Action::MergeRequested,
            KeyCode::Enter => Action::ActivateItem,
            _ => Action::None,
        }
    }

    pub fn list(&self, kind: ListKind) -> &[PullRequestRecord] {
        match kind {
            ListKind::NeedsReview => &self.needs_review,
            ListKind::Mine => &self.mine,
        }
    }

    pub fn visible(&self, kind: ListKind) -> Vec<&PullRequestRecord> {
        filter::visible(self.list(kind), |id| self.hidden.contains(&id), self.show_hidden)
    }

    pub fn selected(&self) -> Option<&PullRequestRecord> {
        self.visible(self.active).get(self.cursor).copied()
    }

    /// Classification from the last applied load. Records are always
    /// classified before they can be rendered.
    pub fn status(&self, id: u64) -> PrStatus {
        self.statuses.get(&id).copied().unwrap_or(PrStatus::New)
    }

    pub fn is_hidden(&self, id: u64) -> bool {
        self.hidden.contains(&id)
    }

    pub fn can_switch_lists(&self) -> bool {
        !self.needs_review.is_empty() && !self.mine.is_empty()
    }

    pub fn update(&mut self, action: Action) -> Vec<Command> {
        match action {
            Action::Quit => {
                self.should_quit = true;
            }
            Action::Resized(w, h) => {
                self.viewport = (w, h);
            }

            Action::RefreshTick => {
                let fetch = self.begin_fetch();
                return vec![fetch, Command::ScheduleTick(self.settings.refresh_interval)];
            }
            Action::RefreshRequested => {
                return vec![self.begin_fetch()];
            }
            Action::Merged(number) => {
                debug!(number, "merged, refreshing");
                return vec![self.begin_fetch()];
            }
            Action::DataLoaded {
                needs_review,
                mine,
                load_id,
            } => {
                if self.is_stale(load_id) {
                    debug!(load_id, applied = self.applied_load_id, "discarding stale load");
                } else {
                    self.apply_load(needs_review, mine, load_id);
                }
            }
            Action::FetchFailed { error, load_id } => {
                if self.is_stale(load_id) {
                    debug!(load_id, applied = self.applied_load_id, "discarding stale failure");
                } else {
                    self.applied_load_id = load_id;
                    self.mode = Mode::Error(error);
                }
            }

            Action::ToggleActiveList => {
                if self.can_switch_lists() {
                    self.active = self.active.other();
                    self.cursor = 0;
                }
            }
            Action::CursorUp => {
                self.cursor = self.cursor.saturating_sub(1);
            }
            Action::CursorDown => {
                let len = self.visible(self.active).len();
                if len > 0 {
                    self.cursor = (self.cursor + 1).min(len - 1);
                }
            }
            Action::GoToTop => {
                self.cursor = 0;
            }
            Action::GoToBottom => {
                self.cursor = self.visible(self.active).len().saturating_sub(1);
            }

            Action::ToggleHidden => self.toggle_hidden(),
            Action::ToggleShowHidden => {
                self.show_hidden = !self.show_hidden;
                self.clamp_cursor();
            }

            Action::ActivateItem => {
                if let Some(pr) = self.selected() {
                    return vec![Command::OpenUrl(pr.url.clone())];
                }
            }
            Action::MergeRequested => {
                if let Some(pr) = self.selected() {
                    return vec![Command::Merge(pr.pr_ref())];
                }
            }
            Action::AutomationRequested => {
                if let Some(pr) = self.selected() {
                    return vec![Command::TriggerWorkflow(pr.pr_ref())];
                }
            }
            Action::ActionFailed(msg) => {
                self.mode = Mode::Error(msg);
            }
            Action::None => {}
        }
        Vec::new()
    }

    fn begin_fetch(&mut self) -> Command {
        if !matches!(self.mode, Mode::Error(_)) {
            self.mode = Mode::Loading;
        }
        self.next_load_id += 1;
        Command::Fetch {
            needs_review: self.settings.needs_review_query.clone(),
            mine: self.settings.mine_query.clone(),
            load_id: self.next_load_id,
        }
    }

    fn is_stale(&self, load_id: u64) -> bool {
        load_id < self.applied_load_id
    }

    fn apply_load(
        &mut self,
        needs_review: Vec<PullRequestRecord>,
        mine: Vec<PullRequestRecord>,
        load_id: u64,
    ) {
        self.applied_load_id = load_id;
        self.needs_review = needs_review;
        self.mine = mine;
        self.mode = Mode::Ready;
        self.classify_all();

        if self.list(self.active).is_empty() && !self.list(self.active.other()).is_empty() {
            self.active = self.active.other();
            self.cursor = 0;
        }
        self.clamp_cursor();
    }

    /// Classifies every distinct PR once and reloads the hidden flags.
    /// A PR present in both lists must not be classified twice, or the
    /// second call would already report it as seen.
    fn classify_all(&mut self) {
        let mut statuses = HashMap::new();
        let mut hidden = HashSet::new();

        for pr in self.needs_review.iter().chain(self.mine.iter()) {
            if statuses.contains_key(&pr.id) {
                continue;
            }
            let status = self
                .store
                .classify(pr.id, &pr.update_stamp())
                .unwrap_or_else(|e| {
                    warn!(id = pr.id, error = %e, "classification failed, treating as new");
                    PrStatus::New
                });
            statuses.insert(pr.id, status);

            match self.store.is_hidden(pr.id) {
                Ok(true) => {
                    hidden.insert(pr.id);
                }
                Ok(false) => {}
                Err(e) => warn!(id = pr.id, error = %e, "hidden lookup failed"),
            }
        }

        self.statuses = statuses;
        self.hidden = hidden;
    }

    fn toggle_hidden(&mut self) {
        let Some(id) = self.selected().map(|pr| pr.id) else {
            return;
        };

        let currently = self.store.is_hidden(id).unwrap_or_else(|e| {
            warn!(id, error = %e, "hidden lookup failed, using cached flag");
            self.hidden.contains(&id)
        });
        let hide = !currently;
        if let Err(e) = self.store.set_hidden(id, hide) {
            warn!(id, error = %e, "could not persist hidden flag");
        }

        if hide {
            self.hidden.insert(id);
        } else {
            self.hidden.remove(&id);
        }
        self.clamp_cursor();
    }

    fn clamp_cursor(&mut self) {
        let len = self.visible(self.active).len();
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;
    use proptest::prelude::*;

    use super::*;
    use crate::types::fixtures::{pr, pr_at};

    fn app() -> App {
        App::new(
            StatusStore::open_in_memory().unwrap(),
            SessionSettings {
                needs_review_query: "review-requested:@me".into(),
                mine_query: "author:@me".into(),
                refresh_interval: Duration::from_secs(120),
            },
        )
    }

    fn records(ids: &[u64]) -> Vec<PullRequestRecord> {
        ids.iter().map(|&id| pr(id)).collect()
    }

    fn loaded(needs_review: &[u64], mine: &[u64]) -> Action {
        Action::DataLoaded {
            needs_review: records(needs_review),
            mine: records(mine),
            load_id: 1,
        }
    }

    fn visible_ids(app: &App) -> Vec<u64> {
        app.visible(app.active).iter().map(|p| p.id).collect()
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn starts_loading_and_empty() {
        let app = app();
        assert_eq!(app.mode, Mode::Loading);
        assert!(app.needs_review.is_empty() && app.mine.is_empty());
        assert_eq!(app.cursor, 0);
        assert_eq!(app.active, ListKind::NeedsReview);
        assert!(app.selected().is_none());
    }

    #[test]
    fn refresh_tick_fetches_and_reschedules() {
        let mut app = app();
        app.mode = Mode::Ready;
        let cmds = app.update(Action::RefreshTick);
        assert_eq!(
            cmds,
            vec![
                Command::Fetch {
                    needs_review: "review-requested:@me".into(),
                    mine: "author:@me".into(),
                    load_id: 1,
                },
                Command::ScheduleTick(Duration::from_secs(120)),
            ]
        );
        assert_eq!(app.mode, Mode::Loading);
    }

    #[test]
    fn manual_refresh_does_not_reschedule() {
        let mut app = app();
        let cmds = app.update(Action::RefreshRequested);
        assert_eq!(cmds.len(), 1);
        assert!(matches!(cmds[0], Command::Fetch { load_id: 1, .. }));

        let cmds = app.update(Action::RefreshRequested);
        assert!(matches!(cmds[0], Command::Fetch { load_id: 2, .. }));
    }

    #[test]
    fn data_loaded_replaces_lists_and_classifies() {
        let mut app = app();
        app.update(loaded(&[1, 2], &[3]));

        assert_eq!(app.mode, Mode::Ready);
        assert_eq!(visible_ids(&app), vec![1, 2]);
        assert_eq!(app.status(1), PrStatus::New);
        assert_eq!(app.status(3), PrStatus::New);

        app.update(Action::DataLoaded {
            needs_review: vec![pr(1), pr_at(2, 5)],
            mine: records(&[3]),
            load_id: 2,
        });
        assert_eq!(app.status(1), PrStatus::Seen);
        assert_eq!(app.status(2), PrStatus::Updated);
        assert_eq!(app.status(3), PrStatus::Seen);
    }

    #[test]
    fn pr_in_both_lists_is_classified_once() {
        let mut app = app();
        app.update(loaded(&[7], &[7]));
        assert_eq!(app.status(7), PrStatus::New);
    }

    #[test]
    fn render_reads_do_not_reclassify() {
        let mut app = app();
        app.update(loaded(&[1], &[]));
        for _ in 0..3 {
            assert_eq!(app.status(1), PrStatus::New);
        }
    }

    #[test]
    fn auto_focus_switches_to_non_empty_list() {
        let mut app = app();
        app.update(loaded(&[], &[9]));
        assert_eq!(app.active, ListKind::Mine);
        assert_eq!(app.cursor, 0);
        assert_eq!(app.selected().map(|p| p.id), Some(9));
    }

    #[test]
    fn auto_focus_leaves_non_empty_active_list() {
        let mut app = app();
        app.update(loaded(&[1], &[2]));
        assert_eq!(app.active, ListKind::NeedsReview);
    }

    #[test]
    fn toggle_requires_both_raw_lists() {
        let mut app = app();
        app.update(loaded(&[1, 2], &[]));
        app.update(Action::CursorDown);
        app.update(Action::ToggleActiveList);
        assert_eq!(app.active, ListKind::NeedsReview);
        assert_eq!(app.cursor, 1);

        app.update(loaded(&[1, 2], &[3]));
        app.update(Action::ToggleActiveList);
        assert_eq!(app.active, ListKind::Mine);
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn toggle_allowed_when_other_visible_projection_is_empty() {
        let mut app = app();
        app.update(loaded(&[1], &[2]));
        app.update(Action::ToggleActiveList);
        app.update(Action::ToggleHidden);
        assert!(app.visible(ListKind::Mine).is_empty());

        app.update(Action::ToggleActiveList);
        assert_eq!(app.active, ListKind::NeedsReview);
        app.update(Action::ToggleActiveList);
        assert_eq!(app.active, ListKind::Mine);
        assert_eq!(app.cursor, 0);
        assert!(app.selected().is_none());
    }

    #[test]
    fn cursor_is_bounded() {
        let mut app = app();
        app.update(Action::CursorDown);
        assert_eq!(app.cursor, 0);

        app.update(loaded(&[1, 2, 3], &[]));
        app.update(Action::CursorUp);
        assert_eq!(app.cursor, 0);
        for _ in 0..5 {
            app.update(Action::CursorDown);
        }
        assert_eq!(app.cursor, 2);
        app.update(Action::GoToTop);
        assert_eq!(app.cursor, 0);
        app.update(Action::GoToBottom);
        assert_eq!(app.cursor, 2);
    }

    #[test]
    fn hiding_last_item_clamps_cursor() {
        let mut app = app();
        app.update(loaded(&[1, 2, 3], &[]));
        app.update(Action::GoToBottom);
        assert_eq!(app.cursor, 2);

        app.update(Action::ToggleHidden);
        assert_eq!(visible_ids(&app), vec![1, 2]);
        assert_eq!(app.cursor, 1);
        assert!(app.is_hidden(3));
        assert!(app.store.is_hidden(3).unwrap());
    }

    #[test]
    fn hiding_only_item_leaves_cursor_at_zero() {
        let mut app = app();
        app.update(loaded(&[1], &[]));
        app.update(Action::ToggleHidden);
        assert!(app.visible(app.active).is_empty());
        assert_eq!(app.cursor, 0);

        // Nothing under the cursor: these are no-ops.
        app.update(Action::ToggleHidden);
        assert!(app.update(Action::ActivateItem).is_empty());
        assert!(app.is_hidden(1));
    }

    #[test]
    fn show_hidden_reveals_and_unhide_works() {
        let mut app = app();
        app.update(loaded(&[1, 2], &[]));
        app.update(Action::ToggleHidden);
        assert_eq!(visible_ids(&app), vec![2]);

        app.update(Action::ToggleShowHidden);
        assert_eq!(visible_ids(&app), vec![1, 2]);
        assert!(app.is_hidden(1));

        app.update(Action::GoToTop);
        app.update(Action::ToggleHidden);
        assert!(!app.is_hidden(1));
        assert!(!app.store.is_hidden(1).unwrap());
    }

    #[test]
    fn hiding_a_visible_item_with_show_hidden_keeps_cursor() {
        let mut app = app();
        app.update(loaded(&[1, 2, 3], &[]));
        app.update(Action::ToggleShowHidden);
        app.update(Action::GoToBottom);
        app.update(Action::ToggleHidden);
        assert_eq!(app.cursor, 2);

        app.update(Action::ToggleShowHidden);
        assert_eq!(app.cursor, 1);
    }

    #[test]
    fn hidden_flags_come_back_from_store_on_load() {
        let mut app = app();
        app.update(loaded(&[1, 2], &[]));
        app.update(Action::ToggleHidden);

        app.update(loaded(&[1, 2], &[]));
        assert!(app.is_hidden(1));
        assert_eq!(visible_ids(&app), vec![2]);
    }

    #[test]
    fn shorter_load_clamps_cursor() {
        let mut app = app();
        app.update(loaded(&[1, 2, 3, 4], &[]));
        app.update(Action::GoToBottom);
        app.update(loaded(&[1, 2], &[]));
        assert_eq!(app.cursor, 1);
    }

    #[test]
    fn fetch_failure_keeps_stale_lists() {
        let mut app = app();
        app.update(loaded(&[1], &[2]));
        app.update(Action::FetchFailed {
            error: "Fetch error: offline".into(),
            load_id: 2,
        });
        assert_eq!(app.mode, Mode::Error("Fetch error: offline".into()));
        assert_eq!(app.needs_review.len(), 1);
        assert_eq!(app.mine.len(), 1);

        // A new refresh doesn't hide the error; only success clears it.
        app.update(Action::RefreshRequested);
        assert!(matches!(app.mode, Mode::Error(_)));
        app.update(Action::DataLoaded {
            needs_review: records(&[1]),
            mine: vec![],
            load_id: 3,
        });
        assert_eq!(app.mode, Mode::Ready);
    }

    #[test]
    fn stale_load_is_discarded() {
        let mut app = app();
        app.update(Action::RefreshRequested);
        app.update(Action::RefreshRequested);

        app.update(Action::DataLoaded {
            needs_review: records(&[2]),
            mine: vec![],
            load_id: 2,
        });
        app.update(Action::DataLoaded {
            needs_review: records(&[1]),
            mine: vec![],
            load_id: 1,
        });
        assert_eq!(visible_ids(&app), vec![2]);

        app.update(Action::FetchFailed {
            error: "late".into(),
            load_id: 1,
        });
        assert_eq!(app.mode, Mode::Ready);
    }

    #[test]
    fn item_actions_emit_commands() {
        let mut app = app();
        assert!(app.update(Action::MergeRequested).is_empty());
        assert!(app.update(Action::AutomationRequested).is_empty());

        app.update(loaded(&[4, 5], &[]));
        app.update(Action::CursorDown);

        assert_eq!(
            app.update(Action::ActivateItem),
            vec![Command::OpenUrl(
                "https://github.com/acme/widgets/pull/5".into()
            )]
        );
        assert_eq!(
            app.update(Action::MergeRequested),
            vec![Command::Merge(pr(5).pr_ref())]
        );
        assert_eq!(
            app.update(Action::AutomationRequested),
            vec![Command::TriggerWorkflow(pr(5).pr_ref())]
        );
    }

    #[test]
    fn merged_forces_refetch_without_reschedule() {
        let mut app = app();
        app.update(loaded(&[1], &[]));
        let cmds = app.update(Action::Merged(1));
        assert_eq!(cmds.len(), 1);
        assert!(matches!(cmds[0], Command::Fetch { .. }));
        assert_eq!(app.mode, Mode::Loading);
    }

    #[test]
    fn action_failure_surfaces_as_error() {
        let mut app = app();
        app.update(loaded(&[1], &[]));
        app.update(Action::ActionFailed("Merge failed".into()));
        assert_eq!(app.mode, Mode::Error("Merge failed".into()));
        assert_eq!(app.needs_review.len(), 1);
    }

    #[test]
    fn resize_only_records_viewport() {
        let mut app = app();
        assert!(app.update(Action::Resized(120, 40)).is_empty());
        assert_eq!(app.viewport, (120, 40));
        assert_eq!(app.mode, Mode::Loading);
    }

    #[test]
    fn quit_marks_session_done() {
        let mut app = app();
        app.update(Action::Quit);
        assert!(app.should_quit);
        app.into_store().close().unwrap();
    }

    #[test]
    fn key_bindings() {
        let app = app();
        assert!(matches!(app.handle_event(key(KeyCode::Char('q'))), Action::Quit));
        assert!(matches!(app.handle_event(key(KeyCode::Tab)), Action::ToggleActiveList));
        assert!(matches!(app.handle_event(key(KeyCode::Char('j'))), Action::CursorDown));
        assert!(matches!(app.handle_event(key(KeyCode::Up)), Action::CursorUp));
        assert!(matches!(app.handle_event(key(KeyCode::Char('r'))), Action::RefreshRequested));
        assert!(matches!(app.handle_event(key(KeyCode::Char('a'))), Action::AutomationRequested));
        assert!(matches!(app.handle_event(key(KeyCode::Char('h'))), Action::ToggleHidden));
        assert!(matches!(app.handle_event(key(KeyCode::Char('H'))), Action::ToggleShowHidden));
        assert!(matches!(app.handle_event(key(KeyCode::Char('m'))), Action::MergeRequested));
        assert!(matches!(app.handle_event(key(KeyCode::Enter)), Action::ActivateItem));
        assert!(matches!(app.handle_event(key(KeyCode::Char('x'))), Action::None));
        assert!(matches!(app.handle_event(Event::Init), Action::RefreshTick));
        assert!(matches!(app.handle_event(Event::Resize(80, 24)), Action::Resized(80, 24)));

        let ctrl_c = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(matches!(app.handle_event(ctrl_c), Action::Quit));
    }

    #[test]
    fn storage_failures_degrade_instead_of_failing() {
        let mut app = app();
        app.store.drop_state_table();

        app.update(loaded(&[1, 2], &[]));
        assert_eq!(app.mode, Mode::Ready);
        assert_eq!(app.status(1), PrStatus::New);
        assert_eq!(app.status(2), PrStatus::New);
        assert!(!app.is_hidden(1) && !app.is_hidden(2));

        app.update(Action::CursorDown);
        app.update(Action::ToggleHidden);
        assert!(app.is_hidden(2));
        assert_eq!(visible_ids(&app), vec![1]);
        assert_eq!(app.cursor, 0);
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        let ids = || proptest::collection::vec(0u64..8, 0..6);
        prop_oneof![
            Just(Action::CursorUp),
            Just(Action::CursorDown),
            Just(Action::GoToTop),
            Just(Action::GoToBottom),
            Just(Action::ToggleActiveList),
            Just(Action::ToggleHidden),
            Just(Action::ToggleShowHidden),
            (ids(), ids()).prop_map(|(a, b)| Action::DataLoaded {
                needs_review: records(&a),
                mine: records(&b),
                load_id: 1,
            }),
        ]
    }

    proptest! {
        #[test]
        fn cursor_stays_in_visible_bounds(actions in proptest::collection::vec(arb_action(), 0..60)) {
            let mut app = app();
            for action in actions {
                app.update(action);
                let len = app.visible(app.active).len();
                prop_assert!(app.cursor < len.max(1), "cursor {} with {} visible", app.cursor, len);
                prop_assert_eq!(app.selected().is_some(), len > 0);
            }
        }
    }
}
