//! Styling for the one-line status messages and index names the CLI prints.

use console::Style;
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use std::sync::LazyLock;

/// Shared theme; every CLI message goes through it.
pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

/// Outcome a status line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Done,
    Skipped,
    Failed,
}

impl Status {
    fn icon(self) -> &'static str {
        match self {
            Status::Done => "✓",
            Status::Skipped => "⚠",
            Status::Failed => "✗",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Theme {
    done: Style,
    skipped: Style,
    failed: Style,
    index_name: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            done: Style::new().green().bright(),
            skipped: Style::new().yellow().bright(),
            failed: Style::new().red().bright(),
            index_name: Style::new().magenta().bold(),
        }
    }
}

impl Theme {
    /// `<icon> <text>`, colored unless colors are off.
    pub fn status(&self, status: Status, text: &str) -> String {
        if !Self::colors_enabled() {
            return format!("{} {text}", status.icon());
        }
        let icon = status.icon();
        match status {
            Status::Done => format!("{} {}", icon.green(), self.done.apply_to(text)),
            Status::Skipped => format!("{} {}", icon.yellow(), self.skipped.apply_to(text)),
            Status::Failed => format!("{} {}", icon.red(), self.failed.apply_to(text)),
        }
    }

    pub fn success_with_icon(&self, text: &str) -> String {
        self.status(Status::Done, text)
    }

    pub fn warning_with_icon(&self, text: &str) -> String {
        self.status(Status::Skipped, text)
    }

    pub fn error_with_icon(&self, text: &str) -> String {
        self.status(Status::Failed, text)
    }

    /// An index name as printed by `quarry list`.
    pub fn index_name(&self, name: &str) -> String {
        if Self::colors_enabled() {
            self.index_name.apply_to(name).to_string()
        } else {
            name.to_string()
        }
    }

    /// Colors are off under `NO_COLOR` or when stdout is not a terminal.
    pub fn colors_enabled() -> bool {
        std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
    }
}
