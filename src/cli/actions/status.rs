use crate::{cli::globals::GlobalArgs, session::Session};
use anyhow::Result;

/// Restore the persisted session and report it.
/// # Errors
/// Returns an error if the provider cannot be built.
pub async fn execute(globals: GlobalArgs) -> Result<()> {
    let provider = globals.provider()?;

    provider.initialize().await;

    let session = provider.context().snapshot();
    provider.shutdown();

    println!("{}", describe(&session));

    Ok(())
}

fn describe(session: &Session) -> String {
    match (&session.user, &session.token) {
        (Some(user), Some(token)) => format!(
            "signed in as {} ({:?}), token expires at {}",
            user.email,
            user.role,
            token.expires_at()
        ),
        _ if session.is_unknown() => "session state unknown".to_string(),
        _ => "signed out".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Role, Token, UserIdentity};

    #[test]
    fn test_describe() {
        assert_eq!(describe(&Session::default()), "session state unknown");

        let signed_out = Session {
            initialized: true,
            ..Session::default()
        };
        assert_eq!(describe(&signed_out), "signed out");

        let signed_in = Session {
            token: Some(Token::new("access".to_string(), None, 1_700_000_000)),
            user: Some(UserIdentity {
                id: 7,
                email: "pr@prwire.tld".to_string(),
                role: Role::Viewer,
            }),
            initialized: true,
            loading: false,
        };
        assert_eq!(
            describe(&signed_in),
            "signed in as pr@prwire.tld (Viewer), token expires at 1700000000"
        );
    }
}
