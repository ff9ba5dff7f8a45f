//! Transactional plan executor.
//!
//! A plan moves `Pending -> Executing(i) -> Committed | RolledBack`. Every
//! step runs on the same transaction; the first failure rolls back the whole
//! plan and is reported with the step index that caused it.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, error, info, instrument, warn};

use super::{
    patch::{Assignments, Value},
    plan::{Arg, Clause, Filter, Key, Step, Table, WritePlan},
};
use crate::{
    access::{has_relation, Relation},
    error::{Error, Result},
    storage::{announcements::NewAnnouncement, is_unique_violation, now_unix},
};

/// Rows per bulk insert statement; two bound parameters per row.
const BULK_INSERT_ROWS: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Executing(usize),
    Committed,
    RolledBack,
}

/// Result of a committed plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    state: MutationState,
    rows_affected: Vec<u64>,
    inserted_id: Option<i64>,
}

impl PlanOutcome {
    #[must_use]
    pub const fn state(&self) -> MutationState {
        self.state
    }

    /// Rows touched by each step, in plan order.
    #[must_use]
    pub fn rows_affected(&self) -> &[u64] {
        &self.rows_affected
    }

    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.rows_affected.iter().sum()
    }

    /// Id of the last row inserted by the plan, if any step inserted one.
    #[must_use]
    pub const fn inserted_id(&self) -> Option<i64> {
        self.inserted_id
    }
}

#[derive(Debug)]
enum StepFailure {
    Database(sqlx::Error),
    Conflict(&'static str),
    Missing(&'static str),
    Invalid(String),
}

impl StepFailure {
    fn into_error(self, plan: &'static str, step: usize, label: String) -> Error {
        match self {
            Self::Database(cause) => Error::MutationFailed {
                plan,
                step,
                label,
                cause,
            },
            Self::Conflict(message) => Error::ConflictFailed(message),
            Self::Missing(message) => Error::NotFound(message),
            Self::Invalid(message) => Error::ValidationFailed(message),
        }
    }

    fn from_insert(err: sqlx::Error, conflict: &'static str) -> Self {
        if is_unique_violation(&err) {
            Self::Conflict(conflict)
        } else {
            Self::Database(err)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StepEffect {
    rows: u64,
    inserted: Option<i64>,
}

/// Execute `plan` in one transaction.
///
/// # Errors
/// - `ValidationFailed` if the plan does not fit the schema (nothing is opened).
/// - `NotFound` if a required step matched no rows.
/// - `ConflictFailed` if an insert or update hit a unique constraint.
/// - `MutationFailed` for any other datastore failure.
///
/// In every error case the datastore is left as it was before the call.
#[instrument(skip(pool, plan), fields(plan = plan.name(), steps = plan.len()))]
pub async fn execute(pool: &SqlitePool, plan: &WritePlan) -> Result<PlanOutcome> {
    plan.validate()?;

    let mut state = MutationState::Pending;
    debug!(?state, "Starting plan");

    let mut tx = pool.begin().await.map_err(|cause| Error::MutationFailed {
        plan: plan.name(),
        step: 0,
        label: "begin transaction".to_string(),
        cause,
    })?;

    let mut rows_affected = Vec::with_capacity(plan.len());
    let mut inserted_id = None;

    for (index, step) in plan.steps().iter().enumerate() {
        state = MutationState::Executing(index);
        debug!(?state, %step, "Executing plan step");

        match run_step(&mut tx, step, inserted_id).await {
            Ok(effect) => {
                rows_affected.push(effect.rows);
                if effect.inserted.is_some() {
                    inserted_id = effect.inserted;
                }
            }
            Err(failure) => {
                if let Err(err) = tx.rollback().await {
                    error!("Failed to roll back plan {}: {err}", plan.name());
                }
                state = MutationState::RolledBack;
                warn!(?state, step = index, ?failure, "Plan rolled back");
                return Err(failure.into_error(plan.name(), index, step.to_string()));
            }
        }
    }

    if let Err(cause) = tx.commit().await {
        state = MutationState::RolledBack;
        warn!(?state, "Plan commit failed");
        return Err(Error::MutationFailed {
            plan: plan.name(),
            step: plan.len(),
            label: "commit".to_string(),
            cause,
        });
    }

    state = MutationState::Committed;
    info!(?state, rows = rows_affected.iter().sum::<u64>(), "Plan committed");

    Ok(PlanOutcome {
        state,
        rows_affected,
        inserted_id,
    })
}

async fn run_step(
    conn: &mut SqliteConnection,
    step: &Step,
    inserted: Option<i64>,
) -> Result<StepEffect, StepFailure> {
    match step {
        Step::Delete {
            table,
            filter,
            required,
        } => delete(conn, *table, *filter, *required).await,
        Step::Update {
            table,
            filter,
            assignments,
            required,
        } => update(conn, *table, *filter, assignments, *required).await,
        Step::InsertRelation {
            relation,
            account_id,
            organization_id,
        } => insert_relation(conn, *relation, *account_id, *organization_id).await,
        Step::InsertAnnouncement(announcement) => insert_announcement(conn, announcement).await,
        Step::FanOutResponses {
            announcement,
            organization_id,
        } => {
            let announcement_id = match announcement {
                Key::Id(id) => *id,
                Key::Inserted => inserted.ok_or_else(|| {
                    StepFailure::Invalid("no announcement was inserted before fan-out".to_string())
                })?,
            };
            fan_out_responses(conn, announcement_id, *organization_id).await
        }
        Step::BackfillResponses {
            account_id,
            organization_id,
        } => backfill_responses(conn, *account_id, *organization_id).await,
    }
}

fn render(table: Table, filter: Filter) -> Result<Clause, StepFailure> {
    filter
        .clause(table)
        .ok_or_else(|| StepFailure::Invalid(format!("{filter:?} does not apply to {table}")))
}

/// Append a rendered clause, binding each argument at its placeholder.
fn push_clause(builder: &mut QueryBuilder<'_, Sqlite>, clause: &Clause) {
    let mut args = clause.args.iter();
    for (index, fragment) in clause.sql.split('?').enumerate() {
        if index > 0 {
            match args.next() {
                Some(Arg::Int(value)) => {
                    builder.push_bind(*value);
                }
                Some(Arg::Text(value)) => {
                    builder.push_bind(*value);
                }
                None => {}
            }
        }
        builder.push(fragment);
    }
}

fn check_required(rows: u64, required: Option<&'static str>) -> Result<(), StepFailure> {
    match required {
        Some(message) if rows == 0 => Err(StepFailure::Missing(message)),
        _ => Ok(()),
    }
}

async fn delete(
    conn: &mut SqliteConnection,
    table: Table,
    filter: Filter,
    required: Option<&'static str>,
) -> Result<StepEffect, StepFailure> {
    let clause = render(table, filter)?;
    let mut builder = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {table} WHERE "));
    push_clause(&mut builder, &clause);

    let rows = builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(StepFailure::Database)?
        .rows_affected();
    check_required(rows, required)?;

    Ok(StepEffect {
        rows,
        inserted: None,
    })
}

async fn update(
    conn: &mut SqliteConnection,
    table: Table,
    filter: Filter,
    assignments: &Assignments,
    required: Option<&'static str>,
) -> Result<StepEffect, StepFailure> {
    let clause = render(table, filter)?;
    let mut builder = QueryBuilder::<Sqlite>::new(format!("UPDATE {table} SET "));

    let mut set = builder.separated(", ");
    for (column, value) in assignments.columns() {
        set.push(format!("{column} = "));
        match value {
            Value::Text(text) => set.push_bind_unseparated(text.as_str()),
            Value::Blob(bytes) => set.push_bind_unseparated(bytes.as_slice()),
            Value::Bool(flag) => set.push_bind_unseparated(*flag),
            Value::Integer(number) => set.push_bind_unseparated(*number),
            Value::Null => set.push_bind_unseparated(None::<String>),
        };
    }

    builder.push(" WHERE ");
    push_clause(&mut builder, &clause);

    let rows = builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|err| StepFailure::from_insert(err, table.conflict_message()))?
        .rows_affected();
    check_required(rows, required)?;

    Ok(StepEffect {
        rows,
        inserted: None,
    })
}

async fn insert_relation(
    conn: &mut SqliteConnection,
    relation: Relation,
    account_id: i64,
    organization_id: i64,
) -> Result<StepEffect, StepFailure> {
    if has_relation(&mut *conn, account_id, organization_id, relation)
        .await
        .map_err(StepFailure::Database)?
    {
        return Err(StepFailure::Conflict(relation.conflict_message()));
    }

    let sql = format!(
        "INSERT INTO {} (account_id, organization_id, {}) VALUES (?, ?, ?)",
        relation.table(),
        relation.timestamp_column()
    );
    let result = sqlx::query(&sql)
        .bind(account_id)
        .bind(organization_id)
        .bind(now_unix())
        .execute(&mut *conn)
        .await
        .map_err(|err| StepFailure::from_insert(err, relation.conflict_message()))?;

    Ok(StepEffect {
        rows: result.rows_affected(),
        inserted: Some(result.last_insert_rowid()),
    })
}

async fn insert_announcement(
    conn: &mut SqliteConnection,
    announcement: &NewAnnouncement,
) -> Result<StepEffect, StepFailure> {
    let result = sqlx::query(
        r"
        INSERT INTO announcements
            (organization_id, kind, title, description, date, location, members_only, posted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(announcement.organization_id)
    .bind(announcement.kind.as_str())
    .bind(&announcement.title)
    .bind(&announcement.description)
    .bind(&announcement.date)
    .bind(&announcement.location)
    .bind(announcement.members_only)
    .bind(now_unix())
    .execute(&mut *conn)
    .await
    .map_err(StepFailure::Database)?;

    Ok(StepEffect {
        rows: result.rows_affected(),
        inserted: Some(result.last_insert_rowid()),
    })
}

async fn fan_out_responses(
    conn: &mut SqliteConnection,
    announcement_id: i64,
    organization_id: i64,
) -> Result<StepEffect, StepFailure> {
    let result = sqlx::query(
        r"
        INSERT INTO announcement_responses (announcement_id, account_id)
        SELECT ?, account_id FROM memberships WHERE organization_id = ?
        ",
    )
    .bind(announcement_id)
    .bind(organization_id)
    .execute(&mut *conn)
    .await
    .map_err(|err| StepFailure::from_insert(err, Table::Responses.conflict_message()))?;

    Ok(StepEffect {
        rows: result.rows_affected(),
        inserted: None,
    })
}

async fn backfill_responses(
    conn: &mut SqliteConnection,
    account_id: i64,
    organization_id: i64,
) -> Result<StepEffect, StepFailure> {
    let announcement_ids: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM announcements WHERE organization_id = ? ORDER BY id")
            .bind(organization_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(StepFailure::Database)?;

    let mut rows = 0;
    for chunk in announcement_ids.chunks(BULK_INSERT_ROWS) {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "INSERT INTO announcement_responses (announcement_id, account_id) ",
        );
        builder.push_values(chunk, |mut row, announcement_id| {
            row.push_bind(*announcement_id).push_bind(account_id);
        });
        rows += builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|err| StepFailure::from_insert(err, Table::Responses.conflict_message()))?
            .rows_affected();
    }

    Ok(StepEffect {
        rows,
        inserted: None,
    })
}
