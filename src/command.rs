//! Value types produced by the classifier and pipeline builder.
//!
//! Everything here borrows from the input line, so a command never outlives
//! the line it was parsed from.

/// A single whitespace-delimited word. No quoting or escaping exists, so a
/// token is exactly the slice of the line it was cut from.
pub type Token<'a> = &'a str;

/// One program invocation within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage<'a> {
    /// Program name followed by its arguments. Never empty.
    pub argv: Vec<Token<'a>>,
    /// File that receives this stage's standard output. Only ever set on the
    /// terminal stage.
    pub redirect_out: Option<Token<'a>>,
}

impl<'a> Stage<'a> {
    /// Name of the program as typed, i.e. `argv[0]`.
    pub fn program(&self) -> Token<'a> {
        self.argv[0]
    }
}

/// A pipeline ready to hand to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// Stages in data-flow order. Never empty.
    pub stages: Vec<Stage<'a>>,
    /// The line ended with a standalone `&`.
    pub background: bool,
}

/// What the classifier decided a line is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Blank line, nothing to do.
    Empty,
    /// A builtin verb, run inside the interpreter's own process.
    Builtin {
        name: Token<'a>,
        args: Vec<Token<'a>>,
    },
    /// External programs, possibly piped together.
    Pipeline(ParsedCommand<'a>),
}
