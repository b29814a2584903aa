//! Interactive prompting used when credentials need to be re-entered.

use std::fmt;

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};

use crate::download::DownloadError;

/// Asks the user questions on behalf of the access controller and credentials.
///
/// Calls block until the user answers; hosts that need a deadline wrap their
/// own implementation.
pub trait Prompter: Send + Sync {
    /// Asks a yes/no question.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Prompt`] if the question cannot be asked.
    fn yes_no(&self, title: &str, text: &str) -> Result<bool, DownloadError>;

    /// Asks for a visible value.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Prompt`] if the value cannot be read.
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String, DownloadError>;

    /// Asks for a hidden value.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Prompt`] if the value cannot be read.
    fn password(&self, prompt: &str) -> Result<String, DownloadError>;
}

impl fmt::Debug for dyn Prompter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Prompter")
    }
}

/// Terminal prompts on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn yes_no(&self, title: &str, text: &str) -> Result<bool, DownloadError> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{title}\n{text}"))
            .default(false)
            .interact()
            .map_err(prompt_error)
    }

    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String, DownloadError> {
        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme).with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input.interact_text().map_err(prompt_error)
    }

    fn password(&self, prompt: &str) -> Result<String, DownloadError> {
        Password::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .interact()
            .map_err(prompt_error)
    }
}

/// Prompter for unattended runs: declines every question and reads no values.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn yes_no(&self, _title: &str, _text: &str) -> Result<bool, DownloadError> {
        Ok(false)
    }

    fn input(&self, prompt: &str, _default: Option<&str>) -> Result<String, DownloadError> {
        Err(DownloadError::Prompt {
            reason: format!("cannot ask for '{prompt}' in non-interactive mode"),
        })
    }

    fn password(&self, prompt: &str) -> Result<String, DownloadError> {
        Err(DownloadError::Prompt {
            reason: format!("cannot ask for '{prompt}' in non-interactive mode"),
        })
    }
}

fn prompt_error(error: dialoguer::Error) -> DownloadError {
    DownloadError::Prompt {
        reason: error.to_string(),
    }
}
