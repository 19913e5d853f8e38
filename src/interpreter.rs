use crate::builtin;
use crate::command::{Command, ParsedCommand};
use crate::env::Environment;
use crate::error::{self, ShellError};
use crate::io_adapters::{LineSource, Prompted, ScriptLines};
use crate::job::Reaper;
use crate::lexer;
use crate::parser;
use crate::pipeline::{self, SpawnFailure};
use std::path::Path;

/// A line-oriented command interpreter.
///
/// Each line is either a builtin, run in this process, or a pipeline of
/// external programs started through the search path held in the
/// [`Environment`].
///
/// Example
/// ```no_run
/// use hannah::Interpreter;
/// let mut sh = Interpreter::default();
/// sh.execute_line("ls -l | wc -l > count.txt").unwrap();
/// sh.execute_line("path /usr/bin /bin").unwrap();
/// ```
pub struct Interpreter {
    env: Environment,
    reaper: Reaper,
}

impl Interpreter {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            reaper: Reaper::new(),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Run a single command line to completion, or until its pipeline is
    /// detached when the line ends with `&`.
    ///
    /// A program that cannot be found or started is reported by its own child
    /// process and is not an error here.
    pub fn execute_line(&mut self, line: &str) -> Result<(), ShellError> {
        let tokens = lexer::split_into_tokens(line);
        match parser::classify(&tokens, builtin::is_builtin)? {
            Command::Empty => Ok(()),
            Command::Builtin { name, args } => builtin::run(&mut self.env, name, &args),
            Command::Pipeline(cmd) => self.execute_pipeline(cmd),
        }
    }

    fn execute_pipeline(&mut self, cmd: ParsedCommand<'_>) -> Result<(), ShellError> {
        match pipeline::spawn(&cmd.stages, &self.env.search_path) {
            Ok(handle) => {
                self.reaper.settle(handle, cmd.background);
                Ok(())
            }
            Err(failure) => Err(self.abandon(failure)),
        }
    }

    /// Detach whatever stages did start. They are left running, not killed.
    fn abandon(&mut self, SpawnFailure { spawned, error }: SpawnFailure) -> ShellError {
        // Their downstream stages never started, so waiting on them could
        // block forever.
        self.reaper.settle(spawned, true);
        error.into()
    }

    /// Read and execute lines until input runs out or `exit` is run.
    ///
    /// Errors from individual lines are reported and skipped; only a failure
    /// to read input ends the loop with an error.
    pub fn run(&mut self, input: &mut dyn LineSource) -> anyhow::Result<()> {
        while !self.env.should_exit {
            self.reaper.sweep();
            let Some(line) = input.next_line()? else {
                break;
            };
            if let Err(e) = self.execute_line(&line) {
                error::report(&e);
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Interactive read-eval loop on the terminal.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut input = Prompted::new()?;
        self.run(&mut input)
    }

    /// Execute every line of the file at `path`.
    pub fn run_script(&mut self, path: &Path) -> anyhow::Result<()> {
        let mut input = ScriptLines::open(path)?;
        self.run(&mut input)
    }

    fn shutdown(&mut self) {
        self.reaper.sweep();
        let left = self.reaper.detached().len();
        if left > 0 {
            log::info!("leaving {} background process(es) running", left);
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Environment::new())
    }
}
