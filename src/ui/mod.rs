pub mod prompts;

pub use prompts::{Prompt, TerminalPrompt, can_prompt, require_confirmation, require_confirmation_with};
