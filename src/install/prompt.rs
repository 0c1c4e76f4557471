use anyhow::Result;
use dialoguer::Confirm;

/// Source of user decisions at confirmation gates.
pub trait Decider {
    /// Ask a yes/no question. Empty input must count as "no".
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Blocking terminal prompt without timeout.
pub struct TerminalDecider;

impl Decider for TerminalDecider {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .show_default(true)
            .interact()?)
    }
}
