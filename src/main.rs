use argh::{EarlyExit, FromArgs};
use hannah::{Interpreter, error, logging};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(FromArgs)]
/// A small line-oriented command interpreter.
struct Args {
    #[argh(positional, greedy)]
    /// file to read commands from; commands are read from the terminal when omitted.
    script: Vec<PathBuf>,
}

fn main() -> ExitCode {
    logging::init();
    let argv: Vec<String> = std::env::args().collect();
    match run(&argv) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error::report(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(argv: &[String]) -> anyhow::Result<()> {
    let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
    let (name, rest) = argv.split_first().map_or(("hannah", &[][..]), |(n, r)| (*n, r));

    let args = match Args::from_args(&[name], rest) {
        Ok(args) => args,
        Err(EarlyExit { output, status: Ok(()) }) => {
            println!("{}", output);
            return Ok(());
        }
        Err(EarlyExit { output, status: Err(()) }) => anyhow::bail!("{}", output.trim_end()),
    };

    let mut interpreter = Interpreter::default();
    match args.script.as_slice() {
        [] => {
            log::info!("starting interactive session");
            interpreter.repl()
        }
        [script] => {
            log::info!("running script {}", script.display());
            interpreter.run_script(script)
        }
        more => anyhow::bail!("expected at most one script, got {}", more.len()),
    }
}
