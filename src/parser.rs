use crate::command::{Command, ParsedCommand, Stage, Token};
use crate::error::ParsingError;

/// Separates pipeline stages.
pub const PIPE: &str = "|";
/// Sends the terminal stage's standard output to a file.
pub const REDIRECT_OUT: &str = ">";
/// Runs the pipeline without waiting for it, when it is the last token.
pub const BACKGROUND: &str = "&";

/// Decide what a tokenized line is.
///
/// The trailing background marker is stripped first. If what remains starts
/// with a builtin verb (as judged by `is_builtin`), every other token is
/// handed to the builtin untouched. Otherwise the tokens are split into
/// pipeline stages.
pub fn classify<'a>(
    tokens: &[Token<'a>],
    is_builtin: impl Fn(&str) -> bool,
) -> Result<Command<'a>, ParsingError> {
    if tokens.is_empty() {
        return Ok(Command::Empty);
    }

    let (tokens, background) = match tokens.split_last() {
        Some((&last, rest)) if last == BACKGROUND => (rest, true),
        _ => (tokens, false),
    };

    let Some((&name, args)) = tokens.split_first() else {
        return Err(ParsingError::EmptyCommand);
    };

    if is_builtin(name) {
        return Ok(Command::Builtin {
            name,
            args: args.to_vec(),
        });
    }

    Ok(Command::Pipeline(ParsedCommand {
        stages: build_stages(tokens)?,
        background,
    }))
}

/// Split a token sequence on `|` into stages and pull the output redirection
/// off the terminal stage.
pub fn build_stages<'a>(tokens: &[Token<'a>]) -> Result<Vec<Stage<'a>>, ParsingError> {
    let segments: Vec<&[Token<'a>]> = tokens.split(|&t| t == PIPE).collect();
    let last = segments.len() - 1;

    segments
        .into_iter()
        .enumerate()
        .map(|(i, segment)| {
            if i == last {
                parse_terminal_stage(segment)
            } else if segment.contains(&REDIRECT_OUT) {
                Err(ParsingError::RedirectNotTerminal)
            } else {
                stage(segment, None)
            }
        })
        .collect()
}

/// The terminal stage may end with `> file`.
fn parse_terminal_stage<'a>(segment: &[Token<'a>]) -> Result<Stage<'a>, ParsingError> {
    match segment.iter().position(|&t| t == REDIRECT_OUT) {
        None => stage(segment, None),
        Some(pos) => match &segment[pos + 1..] {
            [] => Err(ParsingError::MissingRedirectTarget),
            [target] => stage(&segment[..pos], Some(*target)),
            _ => Err(ParsingError::TrailingRedirectTokens),
        },
    }
}

fn stage<'a>(
    argv: &[Token<'a>],
    redirect_out: Option<Token<'a>>,
) -> Result<Stage<'a>, ParsingError> {
    if argv.is_empty() {
        return Err(ParsingError::EmptyStage);
    }
    Ok(Stage {
        argv: argv.to_vec(),
        redirect_out,
    })
}
