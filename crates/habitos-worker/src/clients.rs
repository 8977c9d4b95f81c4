//! Open application windows, as seen by the worker.
//!
//! The worker reacts to notification clicks by focusing an existing window
//! showing the target URL, or opening a new one. This registry tracks the
//! windows the host has connected.

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

use habitos_common::{HabitosError, OptionExt};

fn next_window_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("window-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// An open application window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowClient {
    /// Window ID.
    pub id: String,

    /// URL the window currently shows.
    pub url: Url,

    /// Whether this window holds focus.
    pub focused: bool,

    /// Whether this worker controls the window (claimed on activation).
    pub controlled: bool,
}

/// Registry of open application windows.
#[derive(Debug, Default)]
pub struct Clients {
    windows: HashMap<String, WindowClient>,
}

impl Clients {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a window the host already has open (not yet controlled).
    pub fn register(&mut self, url: Url) -> WindowClient {
        let client = WindowClient {
            id: next_window_id(),
            url,
            focused: false,
            controlled: false,
        };
        self.windows.insert(client.id.clone(), client.clone());
        client
    }

    /// Open a new window at the given URL, focused.
    pub fn open_window(&mut self, url: &str) -> Result<WindowClient, HabitosError> {
        let url = Url::parse(url)
            .map_err(|e| HabitosError::config_with_source(format!("invalid window URL {url}"), e))?;

        for window in self.windows.values_mut() {
            window.focused = false;
        }

        let client = WindowClient {
            id: next_window_id(),
            url,
            focused: true,
            controlled: true,
        };
        self.windows.insert(client.id.clone(), client.clone());
        Ok(client)
    }

    /// Get a window by ID.
    pub fn get(&self, id: &str) -> Option<&WindowClient> {
        self.windows.get(id)
    }

    /// Find a window showing exactly the given URL.
    pub fn find_by_url(&self, url: &Url) -> Option<&WindowClient> {
        self.windows.values().find(|w| w.url == *url)
    }

    /// Focus a window; all others lose focus.
    pub fn focus(&mut self, id: &str) -> Result<(), HabitosError> {
        self.windows
            .get(id)
            .ok_or_not_found(format!("window {id}"))?;

        for (window_id, window) in self.windows.iter_mut() {
            window.focused = window_id == id;
        }
        Ok(())
    }

    /// Remove a window (closed by the user).
    pub fn remove(&mut self, id: &str) -> Option<WindowClient> {
        self.windows.remove(id)
    }

    /// Take control of every open window, so future requests are
    /// intercepted without a reload.
    pub fn claim(&mut self) {
        for window in self.windows.values_mut() {
            window.controlled = true;
        }
    }

    /// All windows.
    pub fn windows(&self) -> Vec<&WindowClient> {
        self.windows.values().collect()
    }

    /// Number of open windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Check if no windows are open.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_register_and_find() {
        let mut clients = Clients::new();

        let client = clients.register(url("https://habitos.app/habits/42"));
        assert!(!client.focused);
        assert!(!client.controlled);

        assert_eq!(
            clients
                .find_by_url(&url("https://habitos.app/habits/42"))
                .map(|w| w.id.clone()),
            Some(client.id)
        );
        assert!(clients.find_by_url(&url("https://habitos.app/")).is_none());
    }

    #[test]
    fn test_open_window_takes_focus() {
        let mut clients = Clients::new();

        let first = clients.register(url("https://habitos.app/"));
        clients.focus(&first.id).unwrap();

        let second = clients.open_window("https://habitos.app/habits/7").unwrap();
        assert!(second.focused);
        assert!(second.controlled);
        assert!(!clients.get(&first.id).unwrap().focused);
    }

    #[test]
    fn test_open_window_invalid_url() {
        let mut clients = Clients::new();
        assert!(clients.open_window("not a url").is_err());
    }

    #[test]
    fn test_focus_unknown_window() {
        let mut clients = Clients::new();
        assert!(clients.focus("window-999999").is_err());
    }

    #[test]
    fn test_focus_is_exclusive() {
        let mut clients = Clients::new();

        let a = clients.register(url("https://habitos.app/a"));
        let b = clients.register(url("https://habitos.app/b"));

        clients.focus(&a.id).unwrap();
        clients.focus(&b.id).unwrap();

        assert!(!clients.get(&a.id).unwrap().focused);
        assert!(clients.get(&b.id).unwrap().focused);
    }

    #[test]
    fn test_claim_controls_all_windows() {
        let mut clients = Clients::new();

        clients.register(url("https://habitos.app/"));
        clients.register(url("https://habitos.app/stats"));

        clients.claim();
        assert!(clients.windows().iter().all(|w| w.controlled));
    }

    #[test]
    fn test_remove() {
        let mut clients = Clients::new();

        let client = clients.register(url("https://habitos.app/"));
        assert_eq!(clients.len(), 1);

        assert!(clients.remove(&client.id).is_some());
        assert!(clients.is_empty());
        assert!(clients.remove(&client.id).is_none());
    }
}
