use nix::errno::Errno;
use std::ffi::NulError;
use std::fmt;

/// The one diagnostic line every failure is reported with.
pub const ERROR_MESSAGE: &str = "The error occurred";

/// Errors that can occur while turning a token sequence into pipeline stages.
///
/// Any of these rejects the whole input line before a process is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    /// Nothing left to run once the background marker was stripped (a bare `&`).
    EmptyCommand,
    /// A pipeline stage with no program name, e.g. `a | | b`, `| a` or `> out`.
    EmptyStage,
    /// `>` was the last token of the line.
    MissingRedirectTarget,
    /// `>` was followed by more than one token.
    TrailingRedirectTokens,
    /// `>` appeared in a stage whose output already feeds the next pipe.
    RedirectNotTerminal,
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsingError::EmptyCommand => write!(f, "empty command"),
            ParsingError::EmptyStage => write!(f, "empty pipeline stage"),
            ParsingError::MissingRedirectTarget => write!(f, "missing redirection target"),
            ParsingError::TrailingRedirectTokens => {
                write!(f, "redirection must be followed by exactly one file name")
            }
            ParsingError::RedirectNotTerminal => {
                write!(f, "redirection is only allowed in the last pipeline stage")
            }
        }
    }
}

impl std::error::Error for ParsingError {}

/// Pipeline-level failure while setting up processes.
#[derive(Debug)]
pub enum SpawnError {
    /// An argument, redirection target or candidate path holds a NUL byte.
    InvalidArgument(NulError),
    Pipe(Errno),
    Fork(Errno),
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::InvalidArgument(e) => write!(f, "invalid argument: {}", e),
            SpawnError::Pipe(e) => write!(f, "pipe failed: {}", e),
            SpawnError::Fork(e) => write!(f, "fork failed: {}", e),
        }
    }
}

impl std::error::Error for SpawnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpawnError::InvalidArgument(e) => Some(e),
            SpawnError::Pipe(e) | SpawnError::Fork(e) => Some(e),
        }
    }
}

impl From<NulError> for SpawnError {
    fn from(e: NulError) -> Self {
        SpawnError::InvalidArgument(e)
    }
}

/// Failure of a single stage, detected inside the forked child.
///
/// The child reports it and exits non-zero; siblings never see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageError {
    /// No search path directory yielded a runnable program.
    CommandNotFound,
    /// A candidate exists but could not be executed.
    ExecFailed(Errno),
    /// The redirection target could not be opened.
    Redirect(Errno),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::CommandNotFound => write!(f, "command not found"),
            StageError::ExecFailed(e) => write!(f, "exec failed: {}", e),
            StageError::Redirect(e) => write!(f, "cannot open redirection target: {}", e),
        }
    }
}

impl StageError {
    /// Status the failing child exits with.
    pub fn exit_code(self) -> i32 {
        match self {
            StageError::CommandNotFound => 127,
            StageError::ExecFailed(_) => 126,
            StageError::Redirect(_) => 1,
        }
    }
}

impl std::error::Error for StageError {}

/// Everything that can go wrong while the interpreter handles one line.
///
/// None of these are fatal: the line is abandoned, the uniform diagnostic is
/// printed and the read loop carries on.
#[derive(Debug)]
pub enum ShellError {
    /// Malformed builtin invocation.
    Usage(String),
    Parse(ParsingError),
    Spawn(SpawnError),
    /// A builtin was invoked correctly but failed while running.
    Builtin(anyhow::Error),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::Usage(msg) => write!(f, "usage error: {}", msg),
            ShellError::Parse(e) => write!(f, "parse error: {}", e),
            ShellError::Spawn(e) => write!(f, "spawn error: {}", e),
            ShellError::Builtin(e) => write!(f, "{:#}", e),
        }
    }
}

impl std::error::Error for ShellError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShellError::Usage(_) => None,
            ShellError::Parse(e) => Some(e),
            ShellError::Spawn(e) => Some(e),
            ShellError::Builtin(e) => Some(e.as_ref()),
        }
    }
}

impl From<ParsingError> for ShellError {
    fn from(e: ParsingError) -> Self {
        ShellError::Parse(e)
    }
}

impl From<SpawnError> for ShellError {
    fn from(e: SpawnError) -> Self {
        ShellError::Spawn(e)
    }
}

/// Log the detailed error and print the uniform diagnostic line to stderr.
pub fn report(err: &dyn fmt::Display) {
    log::warn!("{}", err);
    eprintln!("{}", ERROR_MESSAGE);
}
