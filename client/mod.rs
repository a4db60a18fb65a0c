// client: terminal front end for osc-session (prompt, stdin loop, logging)
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use osc_session::{Output, Result, Session};
use parking_lot::Mutex;

pub const PROMPT: &str = "# ";

/// Writes console text, keeping the prompt on screen when inbound messages
/// arrive while the user is typing.
pub struct ConsoleOutput {
    writer: Mutex<Box<dyn Write + Send>>,
    prompt: Option<&'static str>,
}

impl ConsoleOutput {
    pub fn new<W: Write + Send + 'static>(writer: W, prompt: Option<&'static str>) -> Self {
        ConsoleOutput {
            writer: Mutex::new(Box::new(writer)),
            prompt,
        }
    }

    pub fn stdout(prompt: Option<&'static str>) -> Self {
        Self::new(io::stdout(), prompt)
    }

    pub fn prompt(&self) {
        if let Some(prompt) = self.prompt {
            let mut writer = self.writer.lock();
            let _ = write!(writer, "{}", prompt);
            let _ = writer.flush();
        }
    }

    fn write_line(&self, line: &str) {
        let mut writer = self.writer.lock();
        // \r wipes a half-drawn prompt
        let _ = write!(writer, "\r{}\n", line);
        let _ = writer.flush();
    }
}

impl Output for ConsoleOutput {
    fn println(&self, line: &str) {
        self.write_line(line);
    }

    fn notify(&self, line: &str) {
        self.write_line(line);
        self.prompt();
    }
}

/// Reads lines until `@quit` or end of input.
pub struct Console {
    session: Session,
    output: Arc<ConsoleOutput>,
}

impl Console {
    pub fn new(session: Session, output: Arc<ConsoleOutput>) -> Self {
        Console { session, output }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn run<R: BufRead>(&self, input: R) -> Result<()> {
        self.output.prompt();
        for line in input.lines() {
            if !self.session.process_line(&line?) {
                return Ok(());
            }
            self.output.prompt();
        }
        // End of input quits like @quit
        self.session.terminate()
    }
}

/// Diagnostics go to stderr, filtered by `RUST_LOG` (default `level`).
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact();

    let _ = subscriber.try_init();
}
