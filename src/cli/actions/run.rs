use crate::cli::{
    actions::{grant_role, server, Action},
    telemetry,
};
use anyhow::Result;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    let result = match action {
        Action::Server(args) => server::execute(args).await,
        Action::GrantRole(args) => grant_role::execute(args).await,
    };

    telemetry::shutdown_tracer();
    result
}
