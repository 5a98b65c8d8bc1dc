use crate::cli::{
    actions::{login, watch, Action},
    commands::{ARG_API_URL, ARG_EMAIL, ARG_GUARD, ARG_PASSWORD, ARG_TIMEOUT, ARG_TOKEN_FILE},
    globals::GlobalArgs,
};
use crate::guard::GuardPolicy;
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let (name, sub_m) = matches
        .subcommand()
        .context("missing subcommand, see --help")?;

    let globals = globals(sub_m)?;

    match name {
        "login" => {
            let email = sub_m
                .get_one::<String>(ARG_EMAIL)
                .cloned()
                .context("missing required argument: --email")?;
            let password = sub_m
                .get_one::<String>(ARG_PASSWORD)
                .cloned()
                .map(SecretString::from)
                .context("missing required argument: --password")?;

            Ok(Action::Login(login::Args {
                globals,
                email,
                password,
            }))
        }
        "logout" => Ok(Action::Logout(globals)),
        "status" => Ok(Action::Status(globals)),
        "watch" => {
            let policy = match sub_m.get_one::<String>(ARG_GUARD).map(String::as_str) {
                Some("public-only") => GuardPolicy::PublicOnly,
                Some("require-auth") | None => GuardPolicy::RequireAuth,
                Some(other) => return Err(anyhow!("unknown guard policy: {other}")),
            };

            Ok(Action::Watch(watch::Args { globals, policy }))
        }
        other => Err(anyhow!("unknown subcommand: {other}")),
    }
}

fn globals(matches: &clap::ArgMatches) -> Result<GlobalArgs> {
    let api_url = matches
        .get_one::<String>(ARG_API_URL)
        .cloned()
        .context("missing required argument: --api-url (or PRGATE_API_URL)")?;
    let token_file = matches
        .get_one::<String>(ARG_TOKEN_FILE)
        .map(PathBuf::from)
        .context("missing required argument: --token-file")?;
    let timeout = matches.get_one::<u64>(ARG_TIMEOUT).copied().unwrap_or(10);

    Ok(GlobalArgs::new(api_url, token_file, Duration::from_secs(timeout)))
}
