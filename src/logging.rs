use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use std::fs::OpenOptions;

/// Log level filter, e.g. `debug`. Unset means no logger at all.
pub const LEVEL_VAR: &str = "HANNAH_LOG";
/// Append log records to this file instead of stderr.
pub const FILE_VAR: &str = "HANNAH_LOG_FILE";

/// Install the global logger from the environment.
///
/// Best-effort: a bad level or an unopenable log file just leaves logging off,
/// so by default the uniform diagnostic is the only thing written to stderr.
pub fn init() {
    let Some(level) = std::env::var(LEVEL_VAR).ok().and_then(|v| parse_level(&v)) else {
        return;
    };

    if let Some(path) = std::env::var_os(FILE_VAR) {
        let Ok(file) = OpenOptions::new().create(true).append(true).open(path) else {
            return;
        };
        let _ = WriteLogger::init(level, Config::default(), file);
    } else {
        let _ = TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        );
    }
}

fn parse_level(value: &str) -> Option<LevelFilter> {
    value.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_names_case_insensitively() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level(" WARN "), Some(LevelFilter::Warn));
        assert_eq!(parse_level("off"), Some(LevelFilter::Off));
    }

    #[test]
    fn rejects_unknown_levels() {
        assert_eq!(parse_level("loud"), None);
        assert_eq!(parse_level(""), None);
    }
}
