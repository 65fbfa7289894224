use crate::client::Suggestion;
use crate::{IngredientList, Recipe};
use parking_lot::RwLock;
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const MAX_SESSION_COUNT: usize = 4096;
const SESSION_ID_LEN: usize = 32;

/// The two independent async operations a visitor can have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Featured,
    Search,
}

impl Slot {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "featured" => Some(Slot::Featured),
            "search" => Some(Slot::Search),
            _ => None,
        }
    }
}

/// Identifies one request for one slot. Only the newest token of a slot may
/// write its result back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

/// Everything the page needs to render one visitor's view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub ingredients: IngredientList,
    pub featured: Option<Recipe>,
    pub featured_loading: bool,
    pub featured_notice: Option<&'static str>,
    pub recipes: Vec<Recipe>,
    pub searching: bool,
    pub search_notice: Option<&'static str>,
}

#[derive(Default)]
struct SessionEntry {
    view: SessionView,
    last_seen: u64,
    next_token: u64,
    featured_token: Option<RequestToken>,
    search_token: Option<RequestToken>,
}

impl SessionEntry {
    fn issue(&mut self, slot: Slot) -> RequestToken {
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        match slot {
            Slot::Featured => {
                self.featured_token = Some(token);
                self.view.featured_loading = true;
            }
            Slot::Search => {
                self.search_token = Some(token);
                self.view.searching = true;
            }
        }
        token
    }

    fn is_current(&self, slot: Slot, token: RequestToken) -> bool {
        let current = match slot {
            Slot::Featured => self.featured_token,
            Slot::Search => self.search_token,
        };
        current == Some(token)
    }
}

#[derive(Default)]
struct SessionData {
    sessions: HashMap<String, SessionEntry>,
    clock: u64,
}

impl SessionData {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, id: &str) -> Option<&mut SessionEntry> {
        let now = self.tick();
        let entry = self.sessions.get_mut(id)?;
        entry.last_seen = now;
        Some(entry)
    }
}

struct SessionShared {
    inner: RwLock<SessionData>,
    capacity: usize,
}

/// In-memory per-visitor UI state, keyed by a random session id.
#[derive(Clone)]
pub struct SessionStore {
    shared: Arc<SessionShared>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_capacity(MAX_SESSION_COUNT)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                inner: RwLock::new(SessionData::default()),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.shared.inner.read().sessions.contains_key(id)
    }

    /// Returns `id` if it names a live session, otherwise a freshly created
    /// session id. The flag is `true` when a new session was created.
    pub fn resolve(&self, id: Option<&str>) -> (String, bool) {
        let mut guard = self.shared.inner.write();
        if let Some(id) = id {
            if guard.touch(id).is_some() {
                return (id.to_string(), false);
            }
        }
        if guard.sessions.len() >= self.shared.capacity {
            if let Some(oldest) = oldest_session_key(&guard.sessions) {
                debug!(session = %oldest, "evicting oldest session");
                guard.sessions.remove(&oldest);
            }
        }
        let id = generate_session_id();
        let now = guard.tick();
        guard.sessions.insert(
            id.clone(),
            SessionEntry {
                last_seen: now,
                ..SessionEntry::default()
            },
        );
        (id, true)
    }

    pub fn view(&self, id: &str) -> Option<SessionView> {
        let mut guard = self.shared.inner.write();
        guard.touch(id).map(|entry| entry.view.clone())
    }

    pub fn update_ingredients<R>(
        &self,
        id: &str,
        update: impl FnOnce(&mut IngredientList) -> R,
    ) -> Option<R> {
        let mut guard = self.shared.inner.write();
        guard.touch(id).map(|entry| update(&mut entry.view.ingredients))
    }

    /// Starts the featured fetch unless one was already started for this
    /// session. The featured dish is requested once per visitor.
    pub fn begin_featured(&self, id: &str) -> Option<RequestToken> {
        let mut guard = self.shared.inner.write();
        let entry = guard.touch(id)?;
        if entry.featured_token.is_some() {
            return None;
        }
        Some(entry.issue(Slot::Featured))
    }

    /// Starts a search and returns its token along with the ingredients to
    /// search for. Any earlier search still in flight becomes stale.
    pub fn begin_search(&self, id: &str) -> Option<(RequestToken, IngredientList)> {
        let mut guard = self.shared.inner.write();
        let entry = guard.touch(id)?;
        if entry.view.ingredients.is_empty() {
            return None;
        }
        let token = entry.issue(Slot::Search);
        entry.view.search_notice = None;
        Some((token, entry.view.ingredients.clone()))
    }

    /// Applies a featured result. Returns `false` when the token is stale.
    pub fn finish_featured(&self, id: &str, token: RequestToken, dish: Suggestion<Recipe>) -> bool {
        let mut guard = self.shared.inner.write();
        let Some(entry) = guard.sessions.get_mut(id) else {
            return false;
        };
        if !entry.is_current(Slot::Featured, token) {
            debug!(?token, "discarding stale featured result");
            return false;
        }
        entry.view.featured = Some(dish.value);
        entry.view.featured_notice = dish.notice;
        entry.view.featured_loading = false;
        true
    }

    /// Applies a search result. Returns `false` when the token is stale.
    pub fn finish_search(
        &self,
        id: &str,
        token: RequestToken,
        found: Suggestion<Vec<Recipe>>,
    ) -> bool {
        let mut guard = self.shared.inner.write();
        let Some(entry) = guard.sessions.get_mut(id) else {
            return false;
        };
        if !entry.is_current(Slot::Search, token) {
            debug!(?token, "discarding stale search result");
            return false;
        }
        entry.view.recipes = found.value;
        entry.view.search_notice = found.notice;
        entry.view.searching = false;
        true
    }

    pub fn dismiss_notice(&self, id: &str, slot: Slot) -> bool {
        let mut guard = self.shared.inner.write();
        let Some(entry) = guard.touch(id) else {
            return false;
        };
        let notice = match slot {
            Slot::Featured => &mut entry.view.featured_notice,
            Slot::Search => &mut entry.view.search_notice,
        };
        notice.take().is_some()
    }
}

fn oldest_session_key(sessions: &HashMap<String, SessionEntry>) -> Option<String> {
    sessions
        .iter()
        .min_by_key(|(_, entry)| entry.last_seen)
        .map(|(key, _)| key.clone())
}

pub fn generate_session_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}
