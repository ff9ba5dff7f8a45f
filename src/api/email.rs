//! Announcement notification outbox.
//!
//! Creating an announcement commits first; afterwards one `email_outbox` row is
//! enqueued per member who opted into notifications. Enqueue failures are
//! logged and never undo the announcement.
//!
//! A background task polls pending rows whose `next_attempt_at` has passed and
//! hands each to an [`EmailSender`]. Failures are retried with exponential
//! backoff and jitter until `max_attempts`, then the row is marked `failed`.
//! The default sender, [`LogEmailSender`], only logs.

use anyhow::{Context, Result};
use rand::Rng;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{error, info, info_span, instrument, warn, Instrument};

use crate::storage::{
    announcements::{AnnouncementKind, AnnouncementResponse},
    now_unix,
    organizations::{fetch_organization, notification_recipients},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery abstraction used by the outbox worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    ///
    /// # Errors
    /// Any error marks the attempt as failed.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Sender that logs instead of delivering.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// 5s poll, 10 messages per batch, 5 attempts, 5s to 5m backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    /// Clamp zero values so the worker never spins or stalls.
    #[must_use]
    pub fn normalize(self) -> Self {
        let backoff_base = self.backoff_base.max(Duration::from_secs(1));
        Self {
            poll_interval: self.poll_interval.max(Duration::from_secs(1)),
            batch_size: self.batch_size.max(1),
            max_attempts: self.max_attempts.max(1),
            backoff_base,
            backoff_max: self.backoff_max.max(backoff_base),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue one message for delivery.
///
/// # Errors
/// Returns an error if the row cannot be inserted.
pub async fn enqueue(pool: &SqlitePool, message: &EmailMessage) -> Result<()> {
    let now = now_unix();
    sqlx::query(
        r"
        INSERT INTO email_outbox (to_email, subject, body, status, next_attempt_at, created_at)
        VALUES (?, ?, ?, 'pending', ?, ?)
        ",
    )
    .bind(&message.to_email)
    .bind(&message.subject)
    .bind(&message.body)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("failed to enqueue email")?;
    Ok(())
}

/// Queue a notification about `announcement` for every opted-in member.
/// Returns how many messages were queued.
///
/// # Errors
/// Returns an error if recipients cannot be loaded or a row cannot be inserted.
#[instrument(skip(pool, announcement), fields(announcement_id = announcement.id))]
pub async fn enqueue_announcement(
    pool: &SqlitePool,
    announcement: &AnnouncementResponse,
) -> Result<usize> {
    let organization = fetch_organization(pool, announcement.organization_id)
        .await
        .context("failed to load organization")?
        .context("organization disappeared before notification")?;
    let recipients = notification_recipients(pool, announcement.organization_id)
        .await
        .context("failed to load notification recipients")?;

    for to_email in &recipients {
        let message = announcement_message(&organization.name, announcement, to_email);
        enqueue(pool, &message).await?;
    }

    Ok(recipients.len())
}

fn announcement_message(
    organization_name: &str,
    announcement: &AnnouncementResponse,
    to_email: &str,
) -> EmailMessage {
    let subject = match announcement.kind {
        AnnouncementKind::Event => format!("[{organization_name}] New event: {}", announcement.title),
        AnnouncementKind::Update => format!("[{organization_name}] {}", announcement.title),
    };

    let mut body = announcement.description.clone();
    if let Some(date) = &announcement.date {
        body.push_str(&format!("\n\nWhen: {date}"));
    }
    if let Some(location) = &announcement.location {
        body.push_str(&format!("\nWhere: {location}"));
    }

    EmailMessage {
        to_email: to_email.to_string(),
        subject,
        body,
    }
}

/// Spawn a background task that polls and processes the email outbox.
pub fn spawn_outbox_worker(
    pool: SqlitePool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();

        loop {
            if let Err(err) = process_outbox_batch(&pool, sender.as_ref(), &config).await {
                error!("email outbox batch failed: {err}");
            }

            sleep(config.poll_interval()).await;
        }
    })
}

/// Deliver one batch of due messages; returns how many were attempted.
///
/// # Errors
/// Returns an error if the batch cannot be loaded or a status update fails.
pub async fn process_outbox_batch(
    pool: &SqlitePool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    let query = r"
        SELECT id, to_email, subject, body, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= ?
        ORDER BY next_attempt_at ASC, id ASC
        LIMIT ?
    ";
    let span = info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(now_unix())
        .bind(i64::try_from(config.batch_size()).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    let row_count = rows.len();
    for row in rows {
        let id: i64 = row.try_get("id")?;
        let attempts: i64 = row.try_get("attempts")?;
        let message = EmailMessage {
            to_email: row.try_get("to_email")?,
            subject: row.try_get("subject")?,
            body: row.try_get("body")?,
        };

        let send_result = sender.send(&message);
        let attempts = u32::try_from(attempts).unwrap_or(0);
        update_outbox_status(&mut tx, id, attempts, send_result, config).await?;
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

async fn update_outbox_status(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
    attempts: u32,
    send_result: Result<()>,
    config: &EmailWorkerConfig,
) -> Result<()> {
    let next_attempt = attempts.saturating_add(1);
    let now = now_unix();

    match send_result {
        Ok(()) => {
            sqlx::query(
                r"
                UPDATE email_outbox
                SET status = 'sent', attempts = ?, last_error = NULL, sent_at = ?
                WHERE id = ?
                ",
            )
            .bind(i64::from(next_attempt))
            .bind(now)
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("failed to update outbox status to sent")?;
        }
        Err(err) if next_attempt >= config.max_attempts() => {
            warn!(id, attempts = next_attempt, "giving up on email: {err}");
            sqlx::query(
                r"
                UPDATE email_outbox
                SET status = 'failed', attempts = ?, last_error = ?
                WHERE id = ?
                ",
            )
            .bind(i64::from(next_attempt))
            .bind(err.to_string())
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("failed to update outbox status to failed")?;
        }
        Err(err) => {
            let delay = backoff_delay(next_attempt, config.backoff_base, config.backoff_max);
            let delay_seconds = i64::try_from(delay.as_secs().max(1)).unwrap_or(i64::MAX);
            sqlx::query(
                r"
                UPDATE email_outbox
                SET attempts = ?, last_error = ?, next_attempt_at = ?
                WHERE id = ?
                ",
            )
            .bind(i64::from(next_attempt))
            .bind(err.to_string())
            .bind(now.saturating_add(delay_seconds))
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("failed to update outbox retry schedule")?;
        }
    }

    Ok(())
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let delay = base.checked_mul(1u32 << shift).unwrap_or(max);
    jitter_delay(delay.min(max))
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}
