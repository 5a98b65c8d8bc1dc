use crate::cli::actions::{login, logout, status, watch, Action};
use anyhow::Result;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Login(args) => login::execute(args).await,
        Action::Logout(globals) => logout::execute(globals).await,
        Action::Status(globals) => status::execute(globals).await,
        Action::Watch(args) => watch::execute(args).await,
    }
}
