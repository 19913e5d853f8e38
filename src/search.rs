use std::ffi::CString;

use crate::error::SpawnError;

/// Directory the search path holds when the interpreter starts.
pub const DEFAULT_SEARCH_PATH: &str = "/bin";

/// Ordered list of directories that bare program names are resolved against.
///
/// Only the `path` builtin changes it, and it always replaces the whole list.
/// The operating system's own `PATH` is never consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<String>,
}

impl SearchPath {
    pub fn new(dirs: Vec<String>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Replace every directory at once.
    pub fn replace(&mut self, dirs: Vec<String>) {
        self.dirs = dirs;
    }

    /// Candidate executables for `name`, one per directory, in search order.
    ///
    /// Nothing is checked on disk: a candidate is only known to be good once
    /// executing it succeeds. An empty search path yields no candidates.
    pub fn resolve(&self, name: &str) -> Vec<String> {
        self.dirs
            .iter()
            .map(|dir| format!("{}/{}", dir.trim_end_matches('/'), name))
            .collect()
    }

    /// Like [`SearchPath::resolve`], converted for `execv`.
    pub(crate) fn resolve_c(&self, name: &str) -> Result<Vec<CString>, SpawnError> {
        self.resolve(name)
            .into_iter()
            .map(|p| CString::new(p).map_err(SpawnError::from))
            .collect()
    }
}

impl Default for SearchPath {
    fn default() -> Self {
        Self::new(vec![DEFAULT_SEARCH_PATH.to_string()])
    }
}
