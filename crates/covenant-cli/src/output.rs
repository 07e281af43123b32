use console::{Style, StyledObject, Term};
use serde::Serialize;

use crate::error::CliResult;

/// Styles for status lines.
#[derive(Debug, Clone)]
pub struct Theme {
    pub success: Style,
    pub error: Style,
    pub accent: Style,
    pub muted: Style,
}

impl Theme {
    pub fn colored() -> Self {
        Self {
            success: Style::new().green().bold(),
            error: Style::new().red().bold(),
            accent: Style::new().cyan(),
            muted: Style::new().dim(),
        }
    }

    pub fn plain() -> Self {
        Self {
            success: Style::new(),
            error: Style::new(),
            accent: Style::new(),
            muted: Style::new(),
        }
    }

    pub fn success_icon(&self) -> StyledObject<&'static str> {
        self.success.apply_to("✓")
    }

    pub fn error_icon(&self) -> StyledObject<&'static str> {
        self.error.apply_to("✗")
    }
}

/// Main output handler for the CLI
#[derive(Debug)]
pub struct OutputManager {
    theme: Theme,
    json: bool,
}

impl OutputManager {
    pub fn new(json: bool) -> Self {
        let theme = if Term::stdout().features().colors_supported() {
            Theme::colored()
        } else {
            Theme::plain()
        };
        Self { theme, json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn success(&self, message: &str) -> CliResult<()> {
        println!("{} {}", self.theme.success_icon(), message);
        Ok(())
    }

    pub fn error(&self, message: &str) -> CliResult<()> {
        eprintln!("{} {}", self.theme.error_icon(), message);
        Ok(())
    }

    /// Prints raw text, as-is.
    pub fn text(&self, text: &str) -> CliResult<()> {
        println!("{}", text);
        Ok(())
    }

    pub fn json<T: Serialize>(&self, data: &T) -> CliResult<()> {
        println!("{}", serde_json::to_string_pretty(data)?);
        Ok(())
    }
}
