use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_URL: &str = "frontend-url";
pub const ARG_SESSION_TTL: &str = "session-ttl";
pub const ARG_OUTBOX_POLL_SECONDS: &str = "email-outbox-poll-seconds";
pub const ARG_OUTBOX_BATCH_SIZE: &str = "email-outbox-batch-size";
pub const ARG_OUTBOX_MAX_ATTEMPTS: &str = "email-outbox-max-attempts";
pub const ARG_OUTBOX_BACKOFF_BASE_SECONDS: &str = "email-outbox-backoff-base-seconds";
pub const ARG_OUTBOX_BACKOFF_MAX_SECONDS: &str = "email-outbox-backoff-max-seconds";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

/// Session and notification settings for the server action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub outbox: OutboxOptions,
}

impl Options {
    /// Parse server arguments from matches.
    ///
    /// # Errors
    /// Returns an error if an argument is missing or out of range.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_URL)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_FRONTEND_URL}"))?;

        let session_ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL)
            .copied()
            .unwrap_or(604_800);
        if session_ttl_seconds <= 0 {
            anyhow::bail!("--{ARG_SESSION_TTL} must be positive");
        }

        Ok(Self {
            frontend_base_url,
            session_ttl_seconds,
            outbox: OutboxOptions {
                poll_seconds: read(matches, ARG_OUTBOX_POLL_SECONDS, 5),
                batch_size: read(matches, ARG_OUTBOX_BATCH_SIZE, 10),
                max_attempts: read(matches, ARG_OUTBOX_MAX_ATTEMPTS, 5),
                backoff_base_seconds: read(matches, ARG_OUTBOX_BACKOFF_BASE_SECONDS, 5),
                backoff_max_seconds: read(matches, ARG_OUTBOX_BACKOFF_MAX_SECONDS, 300),
            },
        })
    }
}

fn read<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str, default: T) -> T {
    matches.get_one::<T>(id).cloned().unwrap_or(default)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    with_outbox_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_URL)
                .long(ARG_FRONTEND_URL)
                .help("Frontend base URL, used as the only allowed CORS origin")
                .env("CLUBHOUSE_FRONTEND_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Session TTL in seconds")
                .env("CLUBHOUSE_SESSION_TTL")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OUTBOX_POLL_SECONDS)
                .long(ARG_OUTBOX_POLL_SECONDS)
                .help("Email outbox poll interval in seconds")
                .env("CLUBHOUSE_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BATCH_SIZE)
                .long(ARG_OUTBOX_BATCH_SIZE)
                .help("Email outbox batch size per poll")
                .env("CLUBHOUSE_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_MAX_ATTEMPTS)
                .long(ARG_OUTBOX_MAX_ATTEMPTS)
                .help("Max attempts before marking an email as failed")
                .env("CLUBHOUSE_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BACKOFF_BASE_SECONDS)
                .long(ARG_OUTBOX_BACKOFF_BASE_SECONDS)
                .help("Base delay for email outbox retry backoff")
                .env("CLUBHOUSE_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BACKOFF_MAX_SECONDS)
                .long(ARG_OUTBOX_BACKOFF_MAX_SECONDS)
                .help("Max delay for email outbox retry backoff")
                .env("CLUBHOUSE_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}
