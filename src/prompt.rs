//! Interactive credential capture.
//!
//! The orchestrator never reads the terminal directly; it goes through
//! [`TokenSource`] so tests can substitute canned values.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("no {0} provided")]
    Empty(&'static str),
    #[error("prompt failed")]
    Io(#[from] dialoguer::Error),
}

/// Where credentials come from at provisioning time.
pub trait TokenSource: Send + Sync {
    /// A GitHub personal access token with `repo` and `admin:public_key`
    /// scopes. Implementations must not return blank strings.
    fn github_token(&self) -> Result<String, PromptError>;
}

/// Reads `DEVUP_GITHUB_TOKEN` first, then falls back to a hidden terminal
/// prompt.
pub struct InteractiveTokens;

impl TokenSource for InteractiveTokens {
    fn github_token(&self) -> Result<String, PromptError> {
        if let Ok(value) = std::env::var("DEVUP_GITHUB_TOKEN") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
        let entered = dialoguer::Password::new()
            .with_prompt("GitHub personal access token (repo + admin:public_key scopes)")
            .allow_empty_password(true)
            .interact()?;
        let trimmed = entered.trim();
        if trimmed.is_empty() {
            return Err(PromptError::Empty("github token"));
        }
        Ok(trimmed.to_string())
    }
}
