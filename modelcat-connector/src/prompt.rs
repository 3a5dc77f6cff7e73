//! Terminal implementation of [`Prompter`].

use modelcat_connector_core::contract::Prompter;
use std::io::{self, BufRead, IsTerminal, Write};

/// Reads answers from stdin, one line each.
///
/// Secrets typed at a terminal are read with echo disabled. Piped input is
/// read as plain lines so the wizard stays scriptable.
#[derive(Debug, Default)]
pub struct StdinPrompter;

/// Print `prompt` to `out`, then read one line from `input` without its line ending.
fn read_answer<R: BufRead, W: Write>(input: &mut R, out: &mut W, prompt: &str) -> io::Result<String> {
    write!(out, "{prompt}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed before an answer was given",
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

impl Prompter for StdinPrompter {
    fn ask(&self, prompt: &str) -> io::Result<String> {
        read_answer(&mut io::stdin().lock(), &mut io::stdout(), prompt)
    }

    fn ask_secret(&self, prompt: &str) -> io::Result<String> {
        if !io::stdin().is_terminal() {
            return read_answer(&mut io::stdin().lock(), &mut io::stdout(), prompt);
        }
        rpassword::prompt_password(prompt).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before an answer was given",
            ),
            _ => e,
        })
    }
}
