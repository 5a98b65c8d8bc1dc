use crate::{
    cli::globals::GlobalArgs,
    guard::{GuardPolicy, GuardState, Navigator, Redirects, RouteGuard},
};
use anyhow::Result;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub policy: GuardPolicy,
}

/// Navigator for a terminal: there is nowhere to go, so report the target.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, path: &str) {
        println!("redirect -> {path}");
    }
}

/// Keep the session alive and report guard decisions until the guard
/// redirects or the process is interrupted.
/// # Errors
/// Returns an error if the provider cannot be built.
pub async fn execute(args: Args) -> Result<()> {
    let provider = args.globals.provider()?;
    let mut context = provider.context();
    let mut guard = RouteGuard::new(args.policy, Redirects::default(), ConsoleNavigator);

    let init = provider.clone();
    let restore = tokio::spawn(async move { init.initialize().await });

    let outcome = tokio::select! {
        state = guard.run(&mut context, |render| info!(?render, "render")) => Some(state),
        _ = tokio::signal::ctrl_c() => None,
    };

    provider.shutdown();
    restore.abort();

    match outcome {
        Some(GuardState::Redirecting(path)) => info!(path = %path, "guard redirected"),
        Some(state) => warn!(?state, "session provider went away"),
        None => info!("interrupted"),
    }

    Ok(())
}
