use std::env as stdenv;
use std::path::PathBuf;

use crate::search::SearchPath;

/// Interpreter-local state that outlives a single command line.
///
/// The environment contains:
/// - `search_path`: where external program names are looked up.
/// - `current_dir`: the working directory, kept in sync with the process by `cd`.
/// - `should_exit`: set by `exit`, checked by the read loop.
///
/// Builtins mutate it between pipeline executions only, so nothing here is
/// ever shared with a running child.
#[derive(Debug, Clone)]
pub struct Environment {
    pub search_path: SearchPath,
    pub current_dir: PathBuf,
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state with the default search path.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            search_path: SearchPath::default(),
            current_dir,
            should_exit: false,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;

    #[test]
    fn test_env_starts_with_default_search_path() {
        let env = Environment::new();
        assert_eq!(env.search_path.dirs(), &["/bin".to_string()]);
        assert!(!env.should_exit);
    }

    #[test]
    fn test_env_reads_process_cwd() {
        let env = Environment::new();
        assert!(env.current_dir.is_absolute());
    }
}
