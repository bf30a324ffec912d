// UI layer: the interactive read loop. Reads a passage, hands it to the
// analyzer and prints the result, one turn at a time until the user types
// `quit` or input ends. Input and output are generic so tests can drive a
// whole session from a byte buffer.

use crate::analysis::{Analyzer, ScriptureRequest};
use crate::api::{CompletionService, OpenAiClient};
use crate::config::AnalyzerConfig;
use crate::render::{print_banner, print_colored, render_analysis};
use anyhow::{Context, Result};
use crossterm::style::Color;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing::{info, warn};

/// Typed alone on the first line, ends the session.
pub const EXIT_KEYWORD: &str = "quit";

/// What the collector produced for one turn.
#[derive(Debug, PartialEq, Eq)]
pub enum Submission {
    Scripture(ScriptureRequest),
    Exit,
}

/// Whether the loop should keep going after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Continue,
    Exit,
}

enum Block {
    Text(String),
    Exit,
}

/// Reads multi-line passages terminated by a blank line.
pub struct InputCollector<R> {
    input: R,
    eof: bool,
}

impl<R: BufRead> InputCollector<R> {
    pub fn new(input: R) -> Self {
        InputCollector { input, eof: false }
    }

    /// Prompt until the user submits non-empty text or asks to exit.
    /// Empty submissions are rejected here and never reach the analyzer.
    pub fn collect<W: Write>(&mut self, out: &mut W) -> io::Result<Submission> {
        loop {
            out.write_all(b"\n")?;
            print_colored(
                out,
                Color::Green,
                "Paste your scripture text (press Enter twice when done):",
            )?;
            match self.read_block()? {
                Block::Exit => return Ok(Submission::Exit),
                Block::Text(text) => match ScriptureRequest::new(&text) {
                    Some(request) => return Ok(Submission::Scripture(request)),
                    None => {
                        print_colored(out, Color::Red, "No text entered. Please try again.")?;
                    }
                },
            }
        }
    }

    fn read_block(&mut self) -> io::Result<Block> {
        if self.eof {
            return Ok(Block::Exit);
        }

        let mut lines: Vec<String> = Vec::new();
        loop {
            // pasted text may not be UTF-8; decode lossily instead of failing
            let mut bytes = Vec::new();
            if self.input.read_until(b'\n', &mut bytes)? == 0 {
                self.eof = true;
                break;
            }
            let buf = String::from_utf8_lossy(&bytes);
            let line = buf.trim_end_matches(|c: char| c == '\n' || c == '\r');
            if lines.is_empty() && line.trim().eq_ignore_ascii_case(EXIT_KEYWORD) {
                return Ok(Block::Exit);
            }
            if line.trim().is_empty() {
                break;
            }
            lines.push(line.to_string());
        }

        if self.eof && lines.is_empty() {
            return Ok(Block::Exit);
        }
        Ok(Block::Text(lines.join("\n")))
    }
}

/// One interactive session: collector, analyzer and terminal output.
pub struct Session<R, W, S> {
    collector: InputCollector<R>,
    out: W,
    analyzer: Analyzer<S>,
    wrap_width: usize,
    show_progress: bool,
}

impl<R, W, S> Session<R, W, S>
where
    R: BufRead,
    W: Write,
    S: CompletionService,
{
    pub fn new(input: R, out: W, analyzer: Analyzer<S>, wrap_width: usize) -> Self {
        Session {
            collector: InputCollector::new(input),
            out,
            analyzer,
            wrap_width,
            show_progress: false,
        }
    }

    /// Show a spinner on stderr while waiting for the service.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Print the banner and run turns until the user exits.
    pub fn run(&mut self) -> Result<()> {
        print_banner(&mut self.out).context("writing banner")?;
        let mut turns = 0usize;
        while self.turn()? == TurnOutcome::Continue {
            turns += 1;
        }
        info!(turns, "session ended");
        Ok(())
    }

    /// A single turn. Service failures are reported and the turn still
    /// returns `Continue`; only terminal I/O errors propagate.
    pub fn turn(&mut self) -> Result<TurnOutcome> {
        let request = match self
            .collector
            .collect(&mut self.out)
            .context("reading scripture input")?
        {
            Submission::Exit => return Ok(TurnOutcome::Exit),
            Submission::Scripture(request) => request,
        };

        let spinner = self.spinner();
        let result = self.analyzer.analyze(&request);
        spinner.finish_and_clear();

        match result {
            Ok(response) => {
                self.out.write_all(b"\n")?;
                render_analysis(&mut self.out, &response, self.wrap_width)
                    .context("writing analysis")?;
            }
            Err(e) => {
                warn!(error = %e, "analysis failed");
                print_colored(
                    &mut self.out,
                    Color::Red,
                    &format!("Error analyzing scripture: {}", e),
                )?;
            }
        }
        Ok(TurnOutcome::Continue)
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    fn spinner(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.yellow} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message("Analyzing scripture...");
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }
}

/// Run the interactive analyzer on stdin/stdout. Blocks until the user
/// exits.
pub fn main_loop(config: &AnalyzerConfig) -> Result<()> {
    let client = OpenAiClient::new(config)?;
    let analyzer = Analyzer::new(client, config);

    let stdin = io::stdin();
    let mut session = Session::new(stdin.lock(), io::stdout(), analyzer, config.wrap_width)
        .with_progress(true);
    session.run()
}
