use crate::env::Environment;
use crate::error::ShellError;
use anyhow::Context;
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Verbs handled inside the interpreter's own process.
pub const BUILTINS: &[&str] = &[Exit::NAME, Cd::NAME, Path::NAME];

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
/// directly in-process, because they change state later commands depend on.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd".
    const NAME: &'static str;

    fn execute(self, env: &mut Environment) -> anyhow::Result<()>;
}

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|&b| b == name)
}

/// Run the builtin called `name`.
///
/// Callers check [`is_builtin`] first; an unknown name is a usage error.
pub fn run(env: &mut Environment, name: &str, args: &[&str]) -> Result<(), ShellError> {
    if name == Exit::NAME {
        parse_and_execute::<Exit>(env, args)
    } else if name == Cd::NAME {
        parse_and_execute::<Cd>(env, args)
    } else if name == Path::NAME {
        parse_and_execute::<Path>(env, args)
    } else {
        Err(ShellError::Usage(format!("{}: not a builtin", name)))
    }
}

fn parse_and_execute<T: BuiltinCommand>(
    env: &mut Environment,
    args: &[&str],
) -> Result<(), ShellError> {
    // Any early exit, `--help` included, is an argument the verb does not take.
    let cmd = T::from_args(&[T::NAME], args)
        .map_err(|EarlyExit { output, .. }| ShellError::Usage(output.trim_end().to_string()))?;
    log::debug!("builtin {} {:?}", T::NAME, args);
    cmd.execute(env).map_err(ShellError::Builtin)
}

#[derive(FromArgs)]
/// Leave the interpreter. Takes no arguments.
pub struct Exit {}

impl BuiltinCommand for Exit {
    const NAME: &'static str = "exit";

    fn execute(self, env: &mut Environment) -> anyhow::Result<()> {
        env.should_exit = true;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: String,
}

impl BuiltinCommand for Cd {
    const NAME: &'static str = "cd";

    fn execute(self, env: &mut Environment) -> anyhow::Result<()> {
        let target = PathBuf::from(&self.target);
        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Replace the program search path. With no directories the path becomes empty.
pub struct Path {
    #[argh(positional, greedy)]
    /// directories to search, in order.
    pub dirs: Vec<String>,
}

impl BuiltinCommand for Path {
    const NAME: &'static str = "path";

    fn execute(self, env: &mut Environment) -> anyhow::Result<()> {
        env.search_path.replace(self.dirs);
        Ok(())
    }
}
