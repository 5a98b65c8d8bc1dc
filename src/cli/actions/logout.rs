use crate::cli::globals::GlobalArgs;
use anyhow::Result;
use tracing::warn;

/// Forget the persisted session and revoke it server-side.
/// # Errors
/// Returns an error if the provider cannot be built.
pub async fn execute(globals: GlobalArgs) -> Result<()> {
    let provider = globals.provider()?;

    provider.initialize().await;

    let was_signed_in = provider.context().is_authenticated();

    if let Some(revocation) = provider.logout() {
        if let Err(err) = revocation.await {
            warn!("token revocation task failed: {}", err);
        }
    }

    if was_signed_in {
        println!("signed out");
    } else {
        println!("no active session");
    }

    Ok(())
}
