use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub const ARG_API_URL: &str = "api-url";
pub const ARG_TOKEN_FILE: &str = "token-file";
pub const ARG_TIMEOUT: &str = "timeout";
pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_GUARD: &str = "guard";

pub const DEFAULT_TOKEN_FILE: &str = ".prgate/session.json";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    Command::new("prgate")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_API_URL)
                .long("api-url")
                .help("Dashboard backend base URL, example: https://api.prwire.tld/v1")
                .env("PRGATE_API_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_FILE)
                .long("token-file")
                .help("Where the session token is persisted")
                .default_value(DEFAULT_TOKEN_FILE)
                .env("PRGATE_TOKEN_FILE")
                .global(true),
        )
        .arg(
            Arg::new(ARG_TIMEOUT)
                .long("timeout")
                .help("Per-request timeout in seconds")
                .default_value("10")
                .env("PRGATE_TIMEOUT")
                .global(true)
                .value_parser(clap::value_parser!(u64).range(1..=300)),
        )
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("PRGATE_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .subcommand(
            Command::new("login")
                .about("Sign in and persist the session token")
                .arg(
                    Arg::new(ARG_EMAIL)
                        .short('e')
                        .long("email")
                        .help("Account email")
                        .env("PRGATE_EMAIL")
                        .required(true),
                )
                .arg(
                    Arg::new(ARG_PASSWORD)
                        .long("password")
                        .help("Account password")
                        .env("PRGATE_PASSWORD")
                        .hide_env_values(true)
                        .required(true),
                ),
        )
        .subcommand(Command::new("logout").about("Revoke and forget the persisted session"))
        .subcommand(Command::new("status").about("Restore the persisted session and report it"))
        .subcommand(
            Command::new("watch")
                .about("Keep the session alive and report guard decisions until redirected")
                .arg(
                    Arg::new(ARG_GUARD)
                        .long("guard")
                        .help("Page policy to evaluate")
                        .default_value("require-auth")
                        .value_parser(["require-auth", "public-only"]),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "prgate");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            env!("CARGO_PKG_DESCRIPTION")
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_login_args() {
        temp_env::with_vars(
            [
                ("PRGATE_PASSWORD", None::<&str>),
                ("PRGATE_EMAIL", None),
                ("PRGATE_API_URL", None),
            ],
            || {
                let matches = new().get_matches_from(vec![
                    "prgate",
                    "--api-url",
                    "https://api.prwire.tld",
                    "login",
                    "--email",
                    "pr@prwire.tld",
                    "--password",
                    "secret",
                ]);

                assert_eq!(
                    matches.get_one::<String>(ARG_API_URL).map(String::as_str),
                    Some("https://api.prwire.tld")
                );
                let (name, sub) = matches.subcommand().unwrap();
                assert_eq!(name, "login");
                assert_eq!(
                    sub.get_one::<String>(ARG_EMAIL).map(String::as_str),
                    Some("pr@prwire.tld")
                );
                assert_eq!(sub.get_one::<u64>(ARG_TIMEOUT).copied(), Some(10));
                assert_eq!(
                    sub.get_one::<String>(ARG_TOKEN_FILE).map(String::as_str),
                    Some(DEFAULT_TOKEN_FILE)
                );
            },
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("PRGATE_API_URL", Some("https://api.prwire.tld")),
                ("PRGATE_TOKEN_FILE", Some("/tmp/prgate.json")),
                ("PRGATE_TIMEOUT", Some("3")),
                ("PRGATE_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["prgate", "status"]);
                let (name, sub) = matches.subcommand().unwrap();
                assert_eq!(name, "status");
                assert_eq!(
                    sub.get_one::<String>(ARG_API_URL).map(String::as_str),
                    Some("https://api.prwire.tld")
                );
                assert_eq!(
                    sub.get_one::<String>(ARG_TOKEN_FILE).map(String::as_str),
                    Some("/tmp/prgate.json")
                );
                assert_eq!(sub.get_one::<u64>(ARG_TIMEOUT).copied(), Some(3));
                assert_eq!(matches.get_one::<u8>(ARG_VERBOSITY).copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("PRGATE_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["prgate".to_string(), "status".to_string()];

                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>(ARG_VERBOSITY).copied(),
                    Some(u8::try_from(index).unwrap())
                );
            });
        }
    }

    #[test]
    fn test_watch_guard_values() {
        let matches = new().get_matches_from(vec!["prgate", "watch", "--guard", "public-only"]);
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(
            sub.get_one::<String>(ARG_GUARD).map(String::as_str),
            Some("public-only")
        );

        let result = new().try_get_matches_from(vec!["prgate", "watch", "--guard", "admin-only"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_login_requires_password() {
        temp_env::with_vars([("PRGATE_PASSWORD", None::<&str>)], || {
            let result =
                new().try_get_matches_from(vec!["prgate", "login", "--email", "pr@prwire.tld"]);
            assert!(result.is_err());
        });
    }
}
