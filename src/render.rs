//! Output rendering for the line-mode shell.
//!
//! The shell never writes to the terminal directly; it goes through a [`Renderer`] so colors can
//! be turned off for pipes and the output can be captured in tests.

use std::io::{self, Stdout, Write};

/// ANSI escape code for dim text (used for notices).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for informational output).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for the echoed prompt).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering shell output.
pub trait Renderer: Send {
    /// Echo a prompt the user did not type interactively.
    fn print_prompt(&mut self, prompt: &str) {
        self.print_info(&format!("> {prompt}"));
    }

    /// Print a chunk of response text.
    ///
    /// This is called incrementally as fragments are streamed from the service.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a response is complete.
    fn finish_response(&mut self);

    /// Called when the user interrupts a response.
    fn print_interrupted(&mut self) {
        self.print_info("[interrupted]");
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    line_start: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::to_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer that writes to `out`.
    pub fn to_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            line_start: true,
        }
    }

    /// The writer being rendered to.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Consume the renderer and return its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Writes `text`, tracking whether the cursor sits at the start of a line.
    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.line_start = text.ends_with('\n');
    }

    /// Writes a whole line in `color`, breaking first if a response is mid-line.
    fn write_line(&mut self, color: &str, text: &str) {
        if !self.line_start {
            self.write("\n");
        }
        if self.use_color {
            self.write(&format!("{color}{text}{ANSI_RESET}\n"));
        } else {
            self.write(&format!("{text}\n"));
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn print_prompt(&mut self, prompt: &str) {
        self.write_line(ANSI_GREEN, &format!("> {prompt}"));
    }

    fn print_text(&mut self, text: &str) {
        self.write(text);
    }

    fn print_error(&mut self, error: &str) {
        self.write_line(ANSI_RED, &format!("Error: {error}"));
    }

    fn print_info(&mut self, info: &str) {
        self.write_line(ANSI_CYAN, info);
    }

    fn finish_response(&mut self) {
        self.write("\n");
    }

    fn print_interrupted(&mut self) {
        self.write_line(ANSI_DIM, "[interrupted]");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(f: impl FnOnce(&mut PlainTextRenderer<Vec<u8>>)) -> String {
        let mut renderer = PlainTextRenderer::to_writer(Vec::new(), false);
        f(&mut renderer);
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn streamed_text_then_finish() {
        let out = rendered(|r| {
            r.print_text("Hel");
            r.print_text("lo");
            r.finish_response();
        });
        assert_eq!(out, "Hello\n");
    }

    #[test]
    fn notices_start_on_a_fresh_line() {
        let out = rendered(|r| {
            r.print_text("partial");
            r.print_interrupted();
            r.print_error("boom");
            r.print_prompt("hi");
        });
        assert_eq!(out, "partial\n[interrupted]\nError: boom\n> hi\n");
    }

    #[test]
    fn color_wraps_lines() {
        let mut renderer = PlainTextRenderer::to_writer(Vec::new(), true);
        renderer.print_info("note");
        let out = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(out, format!("{ANSI_CYAN}note{ANSI_RESET}\n"));
    }
}
