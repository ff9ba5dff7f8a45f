//! Maps validated CLI matches to an [`Action`].
//!
//! Without a subcommand the binary serves the API; `grant-role` edits one
//! account and exits.

use crate::{
    access::Role,
    cli::{
        actions::{grant_role, server, Action},
        commands::{self, server::Options},
    },
};
use anyhow::{anyhow, Context, Result};

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty())
        .context("missing required argument: --dsn")?;

    if let Some(sub) = matches.subcommand_matches(commands::CMD_GRANT_ROLE) {
        let username = sub
            .get_one::<String>(commands::ARG_USERNAME)
            .cloned()
            .context("missing required argument: <username>")?;
        let role = sub
            .get_one::<String>(commands::ARG_ROLE)
            .context("missing required argument: <role>")?
            .parse::<Role>()
            .map_err(|err| anyhow!(err))?;

        return Ok(Action::GrantRole(grant_role::Args {
            dsn,
            username,
            role,
        }));
    }

    let options = Options::parse(matches)?;

    Ok(Action::Server(server::Args {
        port: matches
            .get_one::<u16>(commands::ARG_PORT)
            .copied()
            .unwrap_or(8080),
        dsn,
        max_connections: matches
            .get_one::<u32>(commands::ARG_MAX_CONNECTIONS)
            .copied()
            .unwrap_or(5),
        frontend_base_url: options.frontend_base_url,
        session_ttl_seconds: options.session_ttl_seconds,
        email_outbox_poll_seconds: options.outbox.poll_seconds,
        email_outbox_batch_size: options.outbox.batch_size,
        email_outbox_max_attempts: options.outbox.max_attempts,
        email_outbox_backoff_base_seconds: options.outbox.backoff_base_seconds,
        email_outbox_backoff_max_seconds: options.outbox.backoff_max_seconds,
    }))
}
