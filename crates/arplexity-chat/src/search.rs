//! Search progress folding.

use arplexity_wire::{SearchInfo, Stage, StreamEvent};

/// Fold one event into the search progress of a turn.
///
/// Returns the new progress, or `None` while no search has happened.
/// Stages are only ever appended, and only when not already present.
pub fn apply(prior: Option<&SearchInfo>, event: &StreamEvent) -> Option<SearchInfo> {
    match event {
        StreamEvent::SearchStart { query } => {
            let mut info = SearchInfo {
                stages: prior.map(|p| p.stages.clone()).unwrap_or_default(),
                query: query.clone(),
                sources: Vec::new(),
                error: prior.and_then(|p| p.error.clone()),
            };
            info.push_stage(Stage::Searching);
            Some(info)
        }
        StreamEvent::SearchResults { urls } => {
            let mut info = prior.cloned().unwrap_or_default();
            info.push_stage(Stage::Reading);
            info.sources = urls.clone();
            Some(info)
        }
        StreamEvent::SearchError { message } => {
            let mut info = prior.cloned().unwrap_or_default();
            info.push_stage(Stage::Error);
            info.error = message.clone();
            // results gathered before the failure are dropped
            info.sources.clear();
            Some(info)
        }
        StreamEvent::End => prior.map(|p| {
            let mut info = p.clone();
            info.push_stage(Stage::Writing);
            info
        }),
        _ => prior.cloned(),
    }
}

/// Tracks search progress for one session
#[derive(Debug, Clone, Default)]
pub struct SearchProgressTracker {
    info: Option<SearchInfo>,
}

impl SearchProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed an event; returns the updated progress if the event changed it
    pub fn observe(&mut self, event: &StreamEvent) -> Option<&SearchInfo> {
        let next = apply(self.info.as_ref(), event);
        if next == self.info {
            return None;
        }
        self.info = next;
        self.info.as_ref()
    }

    pub fn info(&self) -> Option<&SearchInfo> {
        self.info.as_ref()
    }

    /// Whether a search was started or reported for this turn
    pub fn is_active(&self) -> bool {
        self.info.is_some()
    }
}
