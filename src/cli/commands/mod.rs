pub mod logging;
pub mod server;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_MAX_CONNECTIONS: &str = "max-connections";

pub const CMD_GRANT_ROLE: &str = "grant-role";
pub const ARG_USERNAME: &str = "username";
pub const ARG_ROLE: &str = "role";

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

    let command = Command::new("clubhouse")
        .about("Club management service")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("CLUBHOUSE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("SQLite connection string")
                .env("CLUBHOUSE_DSN")
                .default_value("sqlite://clubhouse.db")
                .global(true),
        )
        .arg(
            Arg::new(ARG_MAX_CONNECTIONS)
                .long(ARG_MAX_CONNECTIONS)
                .help("Maximum pooled database connections")
                .env("CLUBHOUSE_MAX_CONNECTIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .subcommand(
            Command::new(CMD_GRANT_ROLE)
                .about("Set the global role of an existing account")
                .arg(
                    Arg::new(ARG_USERNAME)
                        .help("Account username")
                        .required(true),
                )
                .arg(
                    Arg::new(ARG_ROLE)
                        .help("Role to grant")
                        .required(true)
                        .value_parser(["member", "manager", "admin"]),
                ),
        );

    let command = server::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "clubhouse");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Club management service".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port_and_dsn() {
        let matches = new().get_matches_from(vec![
            "clubhouse",
            "--port",
            "9090",
            "--dsn",
            "sqlite:///var/lib/clubhouse/clubs.db",
        ]);

        assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9090));
        assert_eq!(
            matches.get_one::<String>(ARG_DSN).cloned(),
            Some("sqlite:///var/lib/clubhouse/clubs.db".to_string())
        );
        assert_eq!(matches.get_one::<u32>(ARG_MAX_CONNECTIONS).copied(), Some(5));
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("CLUBHOUSE_PORT", Some("443")),
                ("CLUBHOUSE_DSN", Some("sqlite::memory:")),
                ("CLUBHOUSE_LOG_LEVEL", Some("info")),
                ("CLUBHOUSE_FRONTEND_URL", Some("https://clubs.example.com")),
                ("CLUBHOUSE_SESSION_TTL", Some("3600")),
            ],
            || {
                let matches = new().get_matches_from(vec!["clubhouse"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>(ARG_DSN).cloned(),
                    Some("sqlite::memory:".to_string())
                );
                assert_eq!(
                    matches.get_one::<String>(server::ARG_FRONTEND_URL).cloned(),
                    Some("https://clubs.example.com".to_string())
                );
                assert_eq!(
                    matches.get_one::<i64>(server::ARG_SESSION_TTL).copied(),
                    Some(3600)
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, level) in (0u8..).zip(levels) {
            temp_env::with_vars([("CLUBHOUSE_LOG_LEVEL", Some(level))], || {
                let matches = new().get_matches_from(vec!["clubhouse"]);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(index)
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        for count in 0u8..5 {
            temp_env::with_vars([("CLUBHOUSE_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["clubhouse".to_string()];
                if count > 0 {
                    args.push(format!("-{}", "v".repeat(usize::from(count))));
                }

                let matches = new().get_matches_from(args);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(count)
                );
            });
        }
    }

    #[test]
    fn grant_role_subcommand() {
        let matches = new().get_matches_from(vec![
            "clubhouse",
            "grant-role",
            "alice",
            "admin",
            "--dsn",
            "sqlite://clubs.db",
        ]);
        assert_eq!(
            matches.get_one::<String>(ARG_DSN).cloned(),
            Some("sqlite://clubs.db".to_string())
        );
        let Some((name, sub)) = matches.subcommand() else {
            panic!("subcommand missing");
        };
        assert_eq!(name, CMD_GRANT_ROLE);
        assert_eq!(
            sub.get_one::<String>(ARG_USERNAME).cloned(),
            Some("alice".to_string())
        );
        assert_eq!(
            sub.get_one::<String>(ARG_ROLE).cloned(),
            Some("admin".to_string())
        );
    }

    #[test]
    fn grant_role_rejects_guest() {
        let result = new().try_get_matches_from(vec!["clubhouse", "grant-role", "alice", "guest"]);
        assert!(result.is_err());
    }
}
