//! Confirmation gate for destructive commands

use std::io;

use anyhow::Context;
use dialoguer::Input;
use dialoguer::console::Term;
use is_terminal::IsTerminal;
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::error::{ContextError, ContextResult};

pub const CONFIRMATION_PROMPT: &str = "Are you sure you want to continue? (y/N): ";

/// One line of user input in answer to a question
pub trait Prompt {
    fn ask(&mut self, question: &str) -> io::Result<String>;
}

/// Asks on stderr so stdout stays clean for command output
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&mut self, question: &str) -> io::Result<String> {
        Input::<String>::new()
            .with_prompt(question.trim_end().trim_end_matches(':'))
            .allow_empty(true)
            .interact_text_on(&Term::stderr())
            .map_err(io::Error::other)
    }
}

/// The answer is read from stdin and the question is written to stderr, so both must be terminals
pub fn can_prompt(stdin_is_terminal: bool, stderr_is_terminal: bool) -> bool {
    stdin_is_terminal && stderr_is_terminal
}

/// Succeed when confirmed up front or when the user answers yes on a terminal
pub async fn require_confirmation(
    confirmed: bool,
    interactive_allowed: bool,
    cancel: &CancellationToken,
) -> ContextResult<()> {
    let terminal_attached = can_prompt(io::stdin().is_terminal(), io::stderr().is_terminal());
    require_confirmation_with(
        confirmed,
        interactive_allowed,
        terminal_attached,
        TerminalPrompt,
        cancel,
    )
    .await
}

pub async fn require_confirmation_with<P>(
    confirmed: bool,
    interactive_allowed: bool,
    terminal_attached: bool,
    mut prompt: P,
    cancel: &CancellationToken,
) -> ContextResult<()>
where
    P: Prompt + Send + 'static,
{
    if confirmed {
        return Ok(());
    }

    if !interactive_allowed || !terminal_attached {
        debug!(
            "Refusing to prompt (interactive allowed: {}, terminal attached: {})",
            interactive_allowed, terminal_attached
        );
        return Err(ContextError::ConfirmationRequired);
    }

    if cancel.is_cancelled() {
        return Err(ContextError::Cancelled);
    }

    // A blocked read cannot be interrupted; on cancellation the thread is abandoned
    let ask = tokio::task::spawn_blocking(move || prompt.ask(CONFIRMATION_PROMPT));
    let joined = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ContextError::Cancelled),
        joined = ask => joined,
    };

    let answer = joined.context("Confirmation prompt failed")??;
    if is_affirmative(&answer) {
        Ok(())
    } else {
        Err(ContextError::OperationCancelled)
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_answers() {
        for answer in ["y", "Y", " yes ", "YES\n"] {
            assert!(is_affirmative(answer), "{answer:?}");
        }
        for answer in ["", "n", "nope", "yess", "ye s"] {
            assert!(!is_affirmative(answer), "{answer:?}");
        }
    }

    #[test]
    fn test_prompting_needs_both_streams() {
        assert!(can_prompt(true, true));
        assert!(!can_prompt(true, false));
        assert!(!can_prompt(false, true));
        assert!(!can_prompt(false, false));
    }
}
