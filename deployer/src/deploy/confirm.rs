//! Interactive confirmation

use dialoguer::Confirm;

use crate::errors::DeployError;

/// Asks the operator a yes/no question
pub trait Confirmer: Send + Sync {
    fn confirm(&self, prompt: &str) -> Result<bool, DeployError>;
}

/// Terminal prompt, defaults to "no"
#[derive(Debug, Default)]
pub struct PromptConfirmer;

impl Confirmer for PromptConfirmer {
    fn confirm(&self, prompt: &str) -> Result<bool, DeployError> {
        let answer = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        Ok(answer)
    }
}

/// Used when no terminal is attached; every question is answered "no"
#[derive(Debug, Default)]
pub struct NonInteractive;

impl Confirmer for NonInteractive {
    fn confirm(&self, _prompt: &str) -> Result<bool, DeployError> {
        Ok(false)
    }
}
