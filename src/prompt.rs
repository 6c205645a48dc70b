//! Interactive verdict prompt for `modbisect run`.

use std::io::{self, BufRead, Write};

use modbisect_core::{ModSet, Response, VerdictOracle};

/// `g`/`good`, `b`/`bad`, `a`/`abort`/`q`/`quit`; case-insensitive.
pub fn parse_response(line: &str) -> Option<Response> {
    match line.trim().to_ascii_lowercase().as_str() {
        "g" | "good" | "pass" => Some(Response::Good),
        "b" | "bad" | "fail" => Some(Response::Bad),
        "a" | "abort" | "q" | "quit" => Some(Response::Abort),
        _ => None,
    }
}

/// Asks on `output`, reads answers from `input`. End of input counts as abort.
pub struct TerminalOracle<R, W> {
    input: R,
    output: W,
}

impl TerminalOracle<io::StdinLock<'static>, io::Stdout> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalOracle<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> VerdictOracle for TerminalOracle<R, W> {
    fn ask_verdict(&mut self, enabled: &ModSet) -> Response {
        loop {
            let _ = write!(
                self.output,
                "{} mods enabled. Launch the game: does the bug reproduce? [g]ood / [b]ad / [a]bort: ",
                enabled.len()
            );
            let _ = self.output.flush();
            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) | Err(_) => return Response::Abort,
                Ok(_) => {}
            }
            if let Some(response) = parse_response(&line) {
                return response;
            }
            let _ = writeln!(self.output, "Please answer g, b or a.");
        }
    }
}
