//! Screen location tracking.
//!
//! The request pipeline never touches a UI directly; it asks a `Navigator`
//! where the user is and tells it where to go after a rejected session.

use std::sync::Mutex;

use tracing::info;

pub trait Navigator: Send + Sync {
    /// Current location, e.g. `/dashboard` or `/login?next=/tips`
    fn current_path(&self) -> String;
    /// Forced navigation initiated by the client, not the user
    fn redirect(&self, path: &str);
}

/// Strip query string and fragment from a location.
pub fn route_of(location: &str) -> &str {
    location
        .split(['?', '#'])
        .next()
        .unwrap_or(location)
}

#[derive(Debug)]
struct NavState {
    current: String,
    redirects: Vec<String>,
}

/// Location held in memory, with a record of forced redirects.
#[derive(Debug)]
pub struct MemoryNavigator {
    state: Mutex<NavState>,
}

impl MemoryNavigator {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(NavState {
                current: initial.into(),
                redirects: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NavState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// User-driven navigation; not recorded as a redirect.
    pub fn navigate(&self, path: impl Into<String>) {
        self.lock().current = path.into();
    }

    /// Every forced redirect so far, oldest first.
    pub fn redirects(&self) -> Vec<String> {
        self.lock().redirects.clone()
    }

    /// Take and clear the redirect record.
    pub fn take_redirects(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().redirects)
    }
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.lock().current.clone()
    }

    fn redirect(&self, path: &str) {
        let mut state = self.lock();
        info!(from = %state.current, to = path, "Redirecting");
        state.current = path.to_string();
        state.redirects.push(path.to_string());
    }
}
