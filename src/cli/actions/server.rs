use crate::api::{self, email::EmailWorkerConfig, handlers::auth::AuthConfig};
use anyhow::Result;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub max_connections: u32,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database cannot be opened or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds);
    let email_config = EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds)
        .normalize();

    api::new(
        args.port,
        args.dsn,
        args.max_connections,
        auth_config,
        email_config,
    )
    .await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", args.dsn.clone()),
        ("max_connections", args.max_connections.to_string()),
        ("frontend_url", args.frontend_base_url.clone()),
        ("session_ttl_seconds", args.session_ttl_seconds.to_string()),
        (
            "email_outbox",
            format!(
                "poll={}s batch={} attempts={} backoff={}..{}s",
                args.email_outbox_poll_seconds,
                args.email_outbox_batch_size,
                args.email_outbox_max_attempts,
                args.email_outbox_backoff_base_seconds,
                args.email_outbox_backoff_max_seconds
            ),
        ),
    ];
    info!("{}", startup_message(&entries));
}

fn startup_message(entries: &[(&str, String)]) -> String {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "clubhouse {} ({})\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    message
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_message_aligns_keys() {
        let message = startup_message(&[
            ("listen", "tcp:8080".to_string()),
            ("frontend_url", "http://localhost:8080".to_string()),
        ]);
        assert!(message.contains("\n  listen:       tcp:8080"));
        assert!(message.contains("\n  frontend_url: http://localhost:8080"));
    }

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
    }
}
