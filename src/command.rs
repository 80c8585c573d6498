use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::forge::Forge;
use crate::types::{MergeMethod, PrRef};

/// Side effects requested by a state transition. Each one runs as its own
/// task and reports back through the action channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fetch {
        needs_review: String,
        mine: String,
        load_id: u64,
    },
    ScheduleTick(Duration),
    OpenUrl(String),
    Merge(PrRef),
    TriggerWorkflow(PrRef),
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub limit: u32,
    pub merge_method: MergeMethod,
    pub workflow: String,
    pub git_ref: Option<String>,
}

pub struct Executor {
    forge: Arc<dyn Forge>,
    action_tx: mpsc::UnboundedSender<Action>,
    settings: Arc<ExecutorSettings>,
    opener: fn(&str) -> std::io::Result<()>,
}

fn open_in_browser(url: &str) -> std::io::Result<()> {
    open::that(url)
}

impl Executor {
    pub fn new(
        forge: Arc<dyn Forge>,
        action_tx: mpsc::UnboundedSender<Action>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            forge,
            action_tx,
            settings: Arc::new(settings),
            opener: open_in_browser,
        }
    }

    #[cfg(test)]
    fn with_opener(mut self, opener: fn(&str) -> std::io::Result<()>) -> Self {
        self.opener = opener;
        self
    }

    pub fn execute(&self, command: Command) {
        debug!(?command, "executing command");
        match command {
            Command::Fetch {
                needs_review,
                mine,
                load_id,
            } => self.spawn_fetch(needs_review, mine, load_id),
            Command::ScheduleTick(delay) => self.spawn_tick(delay),
            Command::OpenUrl(url) => self.spawn_open(url),
            Command::Merge(pr) => self.spawn_merge(pr),
            Command::TriggerWorkflow(pr) => self.spawn_trigger(pr),
        }
    }

    fn spawn_fetch(&self, needs_review: String, mine: String, load_id: u64) {
        let tx = self.action_tx.clone();
        let forge = Arc::clone(&self.forge);
        let limit = self.settings.limit;
        tokio::spawn(async move {
            // Both lists land in one action so the view never mixes generations.
            let (review_result, mine_result) = tokio::join!(
                forge.search_prs(&needs_review, limit),
                forge.search_prs(&mine, limit)
            );

            let action = match (review_result, mine_result) {
                (Ok(needs_review), Ok(mine)) => {
                    debug!(load_id, needs_review = needs_review.len(), mine = mine.len(), "fetch complete");
                    Action::DataLoaded {
                        needs_review,
                        mine,
                        load_id,
                    }
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(load_id, error = %e, "fetch failed");
                    Action::FetchFailed {
                        error: e.to_string(),
                        load_id,
                    }
                }
            };
            tx.send(action).ok();
        });
    }

    fn spawn_tick(&self, delay: Duration) {
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tx.send(Action::RefreshTick).ok();
        });
    }

    fn spawn_open(&self, url: String) {
        let tx = self.action_tx.clone();
        let opener = self.opener;
        tokio::task::spawn_blocking(move || {
            if let Err(e) = opener(&url) {
                warn!(%url, error = %e, "could not open url");
                tx.send(Action::ActionFailed(format!("Could not open {}: {}", url, e)))
                    .ok();
            }
        });
    }

    fn spawn_merge(&self, pr: PrRef) {
        let tx = self.action_tx.clone();
        let forge = Arc::clone(&self.forge);
        let method = self.settings.merge_method;
        tokio::spawn(async move {
            match forge.merge_pr(&pr, method).await {
                Ok(()) => {
                    info!(%pr, %method, "merged");
                    tx.send(Action::Merged(pr.number)).ok();
                }
                Err(e) => {
                    tx.send(Action::from(e)).ok();
                }
            }
        });
    }

    fn spawn_trigger(&self, pr: PrRef) {
        let tx = self.action_tx.clone();
        let forge = Arc::clone(&self.forge);
        let settings = Arc::clone(&self.settings);
        tokio::spawn(async move {
            match forge
                .trigger_workflow(&pr, &settings.workflow, settings.git_ref.as_deref())
                .await
            {
                Ok(()) => {
                    info!(%pr, workflow = %settings.workflow, "workflow dispatched");
                }
                Err(e) => {
                    tx.send(Action::from(e)).ok();
                }
            }
        });
    }
}
