//! Command Interpreter
//!
//! In-band commands are user inputs starting with the `@` sigil:
//!
//! - `@` lists the catalog and the current model
//! - `@<identifier>` selects a model by case-insensitive exact match
//!
//! Commands never fail. Every input produces a result text, and the state
//! only changes when exactly one catalog entry matches.

use crate::catalog::ModelCatalog;
use crate::state::ConversationState;

/// Leading character marking input as a command
pub const COMMAND_SIGIL: char = '@';

/// A parsed `@` command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Bare sigil: show the catalog
    ListModels,
    /// Sigil followed by text: select a model
    SelectModel {
        /// Requested identifier, lower-cased
        name: String,
    },
}

impl Command {
    /// Parse trimmed user input; `None` if it is not a command
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let rest = input.strip_prefix(COMMAND_SIGIL)?;
        // Whitespace between the sigil and the identifier is dropped, so
        // `@  gpt` selects like `@gpt` rather than matching nothing.
        let name = rest.trim();

        if name.is_empty() {
            Some(Self::ListModels)
        } else {
            Some(Self::SelectModel {
                name: name.to_lowercase(),
            })
        }
    }
}

/// Outcome of a model selection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// Model switched to this catalog identifier
    Selected(String),
    /// Nothing in the catalog matched
    NotFound,
    /// Several case variants matched; nothing changed
    Ambiguous(Vec<String>),
}

/// Run `command` against `state`, returning the text shown to the user
pub fn execute(command: &Command, state: &mut ConversationState, catalog: &ModelCatalog) -> String {
    match command {
        Command::ListModels => format!(
            "Available models:\n{}\n\nCurrent model: {}",
            catalog.models().join("\n"),
            state.model()
        ),

        Command::SelectModel { name } => match select_model(name, state, catalog) {
            Selection::Selected(model) => format!("Model updated to: {model}"),
            Selection::NotFound => format!(
                "No model found with prefix '{name}'. Current model remains: {}",
                state.model()
            ),
            Selection::Ambiguous(matches) => format!(
                "Multiple models match prefix '{name}':\n{}",
                matches.join("\n")
            ),
        },
    }
}

/// Apply the selection policy and update `state` on a unique match
pub fn select_model(
    name: &str,
    state: &mut ConversationState,
    catalog: &ModelCatalog,
) -> Selection {
    let matches = catalog.matches_ignore_case(name);

    match matches.as_slice() {
        [] => {
            tracing::debug!(requested = %name, "No catalog match");
            Selection::NotFound
        }
        [model] => {
            let model = (*model).to_string();
            tracing::info!(from = %state.model(), to = %model, "Model selected");
            state.set_model(model.clone());
            Selection::Selected(model)
        }
        _ => {
            tracing::warn!(requested = %name, count = matches.len(), "Ambiguous model selection");
            Selection::Ambiguous(matches.iter().map(|m| (*m).to_string()).collect())
        }
    }
}
