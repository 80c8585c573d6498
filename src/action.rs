use crate::error::WatchtowerError;
use crate::types::PullRequestRecord;

/// Everything the session state machine reacts to: user intents from the
/// keyboard and results coming back from spawned commands.
#[derive(Debug, Clone)]
pub enum Action {
    Quit,
    Resized(u16, u16),

    // Refresh cycle
    RefreshTick,
    RefreshRequested,
    DataLoaded {
        needs_review: Vec<PullRequestRecord>,
        mine: Vec<PullRequestRecord>,
        load_id: u64,
    },
    FetchFailed {
        error: String,
        load_id: u64,
    },

    // Navigation
    ToggleActiveList,
    CursorUp,
    CursorDown,
    GoToTop,
    GoToBottom,

    // Hiding
    ToggleHidden,
    ToggleShowHidden,

    // Item actions
    ActivateItem,
    MergeRequested,
    AutomationRequested,
    Merged(u64),
    ActionFailed(String),

    None,
}

impl From<WatchtowerError> for Action {
    fn from(err: WatchtowerError) -> Self {
        Action::ActionFailed(err.to_string())
    }
}
