use crate::domain::Resource;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading {
        generation: u64,
    },
    Ready {
        generation: u64,
        count: usize,
    },
    Failed {
        generation: u64,
        message: String,
    },
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading { .. })
    }

    pub fn badge(&self) -> String {
        match self {
            LoadState::Idle => "-".to_string(),
            LoadState::Loading { .. } => "…".to_string(),
            LoadState::Ready { count, .. } => count.to_string(),
            LoadState::Failed { .. } => "!".to_string(),
        }
    }
}

/// Per-resource load state. Each refresh is issued a new generation; results
/// carrying an older generation than the latest issued are stale.
#[derive(Debug, Default)]
pub struct LoadTracker {
    next_generation: u64,
    latest: BTreeMap<Resource, u64>,
    states: BTreeMap<Resource, LoadState>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, resource: Resource) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.latest.insert(resource, generation);
        self.states
            .insert(resource, LoadState::Loading { generation });
        generation
    }

    pub fn is_current(&self, resource: Resource, generation: u64) -> bool {
        self.latest.get(&resource) == Some(&generation)
    }

    /// Returns false when the result is stale and must be discarded.
    pub fn finish_ok(&mut self, resource: Resource, generation: u64, count: usize) -> bool {
        if !self.is_current(resource, generation) {
            return false;
        }
        self.states
            .insert(resource, LoadState::Ready { generation, count });
        true
    }

    pub fn finish_err(&mut self, resource: Resource, generation: u64, message: String) -> bool {
        if !self.is_current(resource, generation) {
            return false;
        }
        self.states.insert(
            resource,
            LoadState::Failed {
                generation,
                message,
            },
        );
        true
    }

    pub fn state(&self, resource: Resource) -> LoadState {
        self.states.get(&resource).cloned().unwrap_or_default()
    }

    pub fn any_loading(&self) -> bool {
        self.states.values().any(LoadState::is_loading)
    }

    /// Forgets in-flight loads so late results are discarded.
    pub fn cancel_all(&mut self) {
        self.latest.clear();
        for state in self.states.values_mut() {
            if state.is_loading() {
                *state = LoadState::Idle;
            }
        }
    }
}
