use crate::{
    cli::globals::GlobalArgs,
    session::{Credentials, Error},
};
use anyhow::{bail, Result};
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub email: String,
    pub password: SecretString,
}

/// Sign in and persist the session token.
/// # Errors
/// Returns an error if the credentials are rejected or the backend is
/// unreachable.
pub async fn execute(args: Args) -> Result<()> {
    let provider = args.globals.provider()?;

    debug!(token_file = %args.globals.token_file.display(), "signing in");

    let result = provider
        .login(Credentials::new(&args.email, args.password))
        .await;

    provider.shutdown();

    match result {
        Ok(user) => {
            println!("signed in as {} ({:?})", user.email, user.role);
            Ok(())
        }
        Err(Error::InvalidCredentials) => bail!("invalid email or password"),
        Err(err) => Err(err.into()),
    }
}
