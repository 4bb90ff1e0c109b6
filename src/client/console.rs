//! Local terminal I/O for the client runtime

use std::io::{self, BufRead, Write};

use crossterm::execute;
use crossterm::terminal::SetTitle;

/// Where the client writes printed text and reads typed lines.
///
/// Owned by the client's console worker thread, which performs prints and
/// prompts in the order the host sent them.
pub trait Console: Send + Sync + 'static {
    /// Write text exactly as given
    fn write_text(&self, text: &str) -> io::Result<()>;

    /// Show `prompt` and read one line without its line ending.
    /// Returns `None` once input is exhausted.
    fn read_line(&self, prompt: &str) -> io::Result<Option<String>>;
}

/// The process's own stdin/stdout
#[derive(Debug, Default)]
pub struct StdConsole;

impl StdConsole {
    pub fn new() -> Self {
        Self
    }

    /// Set the terminal window title
    pub fn set_title(&self, title: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, SetTitle(title))
    }
}

impl Console for StdConsole {
    fn write_text(&self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()
    }

    fn read_line(&self, prompt: &str) -> io::Result<Option<String>> {
        self.write_text(prompt)?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(strip_line_ending(line)))
    }
}

/// Remove one trailing `\n` or `\r\n`
pub fn strip_line_ending(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_line_ending() {
        assert_eq!(strip_line_ending("Alice\n".to_string()), "Alice");
        assert_eq!(strip_line_ending("Alice\r\n".to_string()), "Alice");
        assert_eq!(strip_line_ending("Alice".to_string()), "Alice");
        assert_eq!(strip_line_ending("\n".to_string()), "");
        assert_eq!(strip_line_ending("two\n\n".to_string()), "two\n");
    }
}
