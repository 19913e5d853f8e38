use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Shown before every interactive line.
pub const PROMPT: &str = "hannah> ";

/// Where the interpreter gets its command lines from.
pub trait LineSource {
    /// The next line, or `None` once input is exhausted.
    fn next_line(&mut self) -> Result<Option<String>>;
}

/// Interactive input with line editing and history.
pub struct Prompted {
    editor: DefaultEditor,
}

impl Prompted {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().context("failed to set up line editor")?;
        Ok(Self { editor })
    }
}

impl LineSource for Prompted {
    fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        self.editor.add_history_entry(line.as_str())?;
                    }
                    return Ok(Some(line));
                }
                // Ctrl-C drops the line being edited.
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Batch input: one command per line, no prompt.
pub struct ScriptLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> ScriptLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl ScriptLines<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("can't open script {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> LineSource for ScriptLines<R> {
    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}
