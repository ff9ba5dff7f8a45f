use crate::{
    access::Role,
    mutation::{execute as execute_plan, plans, AccountColumn, Patch},
    storage::{self, accounts::find_account_id},
};
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub username: String,
    pub role: Role,
}

/// Execute the grant-role action.
/// # Errors
/// Returns an error if the database cannot be opened or the account does not exist.
pub async fn execute(args: Args) -> Result<()> {
    let pool = storage::connect(&args.dsn, 1)
        .await
        .context("Failed to connect to database")?;
    storage::apply_schema(&pool)
        .await
        .context("Failed to apply database schema")?;

    let account_id = grant(&pool, &args.username, args.role).await?;
    info!(account_id, role = %args.role, "Role granted to {}", args.username);
    println!("{} is now {}", args.username, args.role);
    Ok(())
}

async fn grant(pool: &SqlitePool, username: &str, role: Role) -> Result<i64> {
    let account_id = find_account_id(pool, username)
        .await?
        .with_context(|| format!("No account named {username}"))?;

    let assignments = Patch::new()
        .set(AccountColumn::Role, role.level())
        .build()?;
    execute_plan(
        pool,
        &plans::update_account_role(account_id, assignments, Some(role)),
    )
    .await?;
    Ok(account_id)
}
