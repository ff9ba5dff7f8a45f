//! Integration-style handler tests for the organization API.
//!
//! Each test builds a fresh in-memory SQLite database, applies the schema and
//! drives the full Axum router.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceExt;

use super::super::auth::{generate_session_token, hash_session_token, AuthConfig};
use crate::{
    access::Role,
    api::router,
    storage::{
        accounts::{insert_account, NewAccount},
        apply_schema, connect,
        organizations::{insert_organization, NewOrganization},
        sessions::insert_session,
    },
};

struct TestApp {
    pool: SqlitePool,
    router: Router,
}

impl TestApp {
    async fn new() -> Result<Self> {
        let pool = connect("sqlite::memory:", 1).await?;
        apply_schema(&pool).await?;
        let router = router(pool.clone(), Arc::new(AuthConfig::default()));
        Ok(Self { pool, router })
    }

    /// Inserts an account with `role` and returns its id and a live session token.
    async fn account(&self, username: &str, role: Role) -> Result<(i64, String)> {
        self.insert_account(username, role, false).await
    }

    /// Same as [`TestApp::account`] for an account owned by an identity provider.
    async fn federated_account(&self, username: &str, role: Role) -> Result<(i64, String)> {
        self.insert_account(username, role, true).await
    }

    async fn insert_account(
        &self,
        username: &str,
        role: Role,
        federated: bool,
    ) -> Result<(i64, String)> {
        let email = format!("{username}@example.com");
        let account = insert_account(
            &self.pool,
            &NewAccount {
                username,
                display_name: username,
                email: &email,
                phone_number: None,
                password_hash: None,
                federated,
                role,
            },
        )
        .await?;
        let token = generate_session_token()?;
        insert_session(&self.pool, account.id, &hash_session_token(&token), 3600).await?;
        Ok((account.id, token))
    }

    async fn organization(&self, name: &str) -> Result<i64> {
        let organization = insert_organization(
            &self.pool,
            &NewOrganization {
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                ..NewOrganization::default()
            },
        )
        .await?;
        Ok(organization.id)
    }

    async fn assign(&self, account_id: i64, organization_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO manager_assignments (account_id, organization_id, assigned_at) VALUES (?, ?, 0)",
        )
        .bind(account_id)
        .bind(organization_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("response is not JSON")?
        };
        Ok((status, json))
    }

    async fn count(&self, sql: &str, id: i64) -> Result<i64> {
        Ok(sqlx::query_scalar(sql).bind(id).fetch_one(&self.pool).await?)
    }
}

fn event(title: &str, members_only: bool) -> Value {
    json!({
        "kind": "event",
        "title": title,
        "description": "Bring water",
        "date": "2025-05-01",
        "location": "Boathouse",
        "members_only": members_only,
    })
}

#[tokio::test]
async fn manager_of_other_org_gets_not_found() -> Result<()> {
    let app = TestApp::new().await?;
    let org_a = app.organization("Rowing").await?;
    let org_b = app.organization("Chess").await?;
    let (manager_b, token_b) = app.account("bea", Role::Manager).await?;
    app.assign(manager_b, org_b).await?;

    let patch = json!({ "summary": "Taken over" });
    let (status, body) = app
        .send("PATCH", &format!("/v1/orgs/{org_a}"), Some(&token_b), Some(patch.clone()))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["category"], "not_found");

    let (status, body) = app
        .send("PATCH", &format!("/v1/orgs/{org_b}"), Some(&token_b), Some(patch.clone()))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], "Taken over");

    let (_, admin_token) = app.account("ada", Role::Admin).await?;
    let (status, _) = app
        .send("PATCH", &format!("/v1/orgs/{org_a}"), Some(&admin_token), Some(patch))
        .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn role_gate_statuses() -> Result<()> {
    let app = TestApp::new().await?;
    let org = app.organization("Rowing").await?;
    let (_, member_token) = app.account("max", Role::Member).await?;

    let (status, body) = app
        .send("POST", &format!("/v1/orgs/{org}/join"), None, None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["category"], "unauthenticated");

    let (status, body) = app
        .send("GET", "/v1/admin/accounts", Some(&member_token), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["category"], "insufficient_role");

    let (status, _) = app
        .send("GET", &format!("/v1/orgs/{org}/members"), Some(&member_token), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send("GET", "/v1/me", Some("not-a-real-token"), None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn joining_twice_conflicts_and_backfills_once() -> Result<()> {
    let app = TestApp::new().await?;
    let org = app.organization("Rowing").await?;
    let (manager, manager_token) = app.account("mia", Role::Manager).await?;
    app.assign(manager, org).await?;
    for title in ["Regatta", "Picnic", "Cleanup"] {
        let (status, _) = app
            .send(
                "POST",
                &format!("/v1/orgs/{org}/announcements"),
                Some(&manager_token),
                Some(event(title, false)),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (member, token) = app.account("max", Role::Member).await?;
    let join = format!("/v1/orgs/{org}/join");
    let (status, _) = app.send("POST", &join, Some(&token), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        app.count(
            "SELECT COUNT(*) FROM announcement_responses WHERE account_id = ?",
            member
        )
        .await?,
        3
    );

    let (status, body) = app.send("POST", &join, Some(&token), None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["category"], "conflict");
    assert_eq!(
        app.count("SELECT COUNT(*) FROM memberships WHERE account_id = ?", member)
            .await?,
        1
    );
    assert_eq!(
        app.count(
            "SELECT COUNT(*) FROM announcement_responses WHERE account_id = ?",
            member
        )
        .await?,
        3
    );

    let (status, _) = app
        .send("POST", "/v1/orgs/999/join", Some(&token), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn members_only_announcements_are_hidden_from_outsiders() -> Result<()> {
    let app = TestApp::new().await?;
    let org = app.organization("Rowing").await?;
    let (manager, manager_token) = app.account("mia", Role::Manager).await?;
    app.assign(manager, org).await?;
    let uri = format!("/v1/orgs/{org}/announcements");
    app.send("POST", &uri, Some(&manager_token), Some(event("Open day", false)))
        .await?;
    app.send("POST", &uri, Some(&manager_token), Some(event("Team dinner", true)))
        .await?;

    let (status, body) = app.send("GET", &uri, None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["title"], "Open day");

    let (_, member_token) = app.account("max", Role::Member).await?;
    app.send("POST", &format!("/v1/orgs/{org}/join"), Some(&member_token), None)
        .await?;
    let (_, body) = app.send("GET", &uri, Some(&member_token), None).await?;
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (_, body) = app.send("GET", &uri, Some(&manager_token), None).await?;
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (_, body) = app
        .send("GET", &format!("{uri}?kind=update"), Some(&member_token), None)
        .await?;
    assert_eq!(body.as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn new_announcement_fans_out_and_queues_email() -> Result<()> {
    let app = TestApp::new().await?;
    let org = app.organization("Rowing").await?;
    let (manager, manager_token) = app.account("mia", Role::Manager).await?;
    app.assign(manager, org).await?;

    let (_, max_token) = app.account("max", Role::Member).await?;
    let (_, kim_token) = app.account("kim", Role::Member).await?;
    for token in [&max_token, &kim_token] {
        app.send("POST", &format!("/v1/orgs/{org}/join"), Some(token.as_str()), None)
            .await?;
    }
    let (status, _) = app
        .send(
            "PUT",
            &format!("/v1/orgs/{org}/notifications"),
            Some(&kim_token),
            Some(json!({ "receive_emails": false })),
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .send(
            "POST",
            &format!("/v1/orgs/{org}/announcements"),
            Some(&manager_token),
            Some(event("Regatta", false)),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let announcement = body["id"].as_i64().context("announcement id")?;

    assert_eq!(
        app.count(
            "SELECT COUNT(*) FROM announcement_responses WHERE announcement_id = ?",
            announcement
        )
        .await?,
        2
    );
    let queued: Vec<String> = sqlx::query_scalar("SELECT to_email FROM email_outbox")
        .fetch_all(&app.pool)
        .await?;
    assert_eq!(queued, vec!["max@example.com".to_string()]);
    Ok(())
}

#[tokio::test]
async fn attendance_is_member_scoped_and_event_only() -> Result<()> {
    let app = TestApp::new().await?;
    let org = app.organization("Rowing").await?;
    let (manager, manager_token) = app.account("mia", Role::Manager).await?;
    app.assign(manager, org).await?;
    let (member, member_token) = app.account("max", Role::Member).await?;
    let (_, outsider_token) = app.account("oli", Role::Member).await?;
    app.send("POST", &format!("/v1/orgs/{org}/join"), Some(&member_token), None)
        .await?;

    let (_, body) = app
        .send(
            "POST",
            &format!("/v1/orgs/{org}/announcements"),
            Some(&manager_token),
            Some(event("Regatta", false)),
        )
        .await?;
    let event_id = body["id"].as_i64().context("event id")?;
    let (_, body) = app
        .send(
            "POST",
            &format!("/v1/orgs/{org}/announcements"),
            Some(&manager_token),
            Some(json!({ "kind": "update", "title": "New boat", "description": "Arrived" })),
        )
        .await?;
    let update_id = body["id"].as_i64().context("update id")?;

    let attend = json!({ "attending": true });
    let (status, _) = app
        .send(
            "PUT",
            &format!("/v1/announcements/{event_id}/attendance"),
            Some(&outsider_token),
            Some(attend.clone()),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            "PUT",
            &format!("/v1/announcements/{update_id}/attendance"),
            Some(&member_token),
            Some(attend.clone()),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "PUT",
            &format!("/v1/announcements/{event_id}/attendance"),
            Some(&member_token),
            Some(attend),
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .send(
            "GET",
            &format!("/v1/orgs/{org}/announcements/{event_id}/attendance"),
            Some(&manager_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["account_id"], member);
    assert_eq!(body[0]["attending"], true);

    let (_, feed) = app.send("GET", "/v1/me/feed", Some(&member_token), None).await?;
    let attending: Vec<bool> = feed
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| item["id"] == event_id)
                .filter_map(|item| item["attending"].as_bool())
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(attending, vec![true]);
    Ok(())
}

#[tokio::test]
async fn announcement_edits_stay_inside_the_organization() -> Result<()> {
    let app = TestApp::new().await?;
    let org_a = app.organization("Rowing").await?;
    let org_b = app.organization("Chess").await?;
    let (manager, token) = app.account("mia", Role::Manager).await?;
    app.assign(manager, org_a).await?;
    app.assign(manager, org_b).await?;

    let (_, body) = app
        .send(
            "POST",
            &format!("/v1/orgs/{org_a}/announcements"),
            Some(&token),
            Some(event("Regatta", false)),
        )
        .await?;
    let event_id = body["id"].as_i64().context("event id")?;

    // Managed organization, but the announcement belongs to the other one.
    let (status, _) = app
        .send(
            "DELETE",
            &format!("/v1/orgs/{org_b}/announcements/{event_id}"),
            Some(&token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/v1/orgs/{org_a}/announcements/{event_id}"),
            Some(&token),
            Some(json!({ "title": "Spring regatta", "members_only": true })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Spring regatta");
    assert_eq!(body["members_only"], true);

    let (status, _) = app
        .send(
            "DELETE",
            &format!("/v1/orgs/{org_a}/announcements/{event_id}"),
            Some(&token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        app.count("SELECT COUNT(*) FROM announcements WHERE id = ?", event_id)
            .await?,
        0
    );
    Ok(())
}

#[tokio::test]
async fn admin_deletes_organization_with_everything_under_it() -> Result<()> {
    let app = TestApp::new().await?;
    let org = app.organization("Rowing").await?;
    let (manager, manager_token) = app.account("mia", Role::Manager).await?;
    app.assign(manager, org).await?;
    let (_, member_token) = app.account("max", Role::Member).await?;
    app.send("POST", &format!("/v1/orgs/{org}/join"), Some(&member_token), None)
        .await?;
    app.send(
        "POST",
        &format!("/v1/orgs/{org}/announcements"),
        Some(&manager_token),
        Some(event("Regatta", false)),
    )
    .await?;

    let (_, admin_token) = app.account("ada", Role::Admin).await?;
    let (status, _) = app
        .send("DELETE", &format!("/v1/admin/orgs/{org}"), Some(&admin_token), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    for sql in [
        "SELECT COUNT(*) FROM announcements WHERE organization_id = ?",
        "SELECT COUNT(*) FROM memberships WHERE organization_id = ?",
        "SELECT COUNT(*) FROM manager_assignments WHERE organization_id = ?",
        "SELECT COUNT(*) FROM organizations WHERE id = ?",
    ] {
        assert_eq!(app.count(sql, org).await?, 0, "{sql}");
    }
    let responses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM announcement_responses")
        .fetch_one(&app.pool)
        .await?;
    assert_eq!(responses, 0);

    let (status, _) = app
        .send("DELETE", &format!("/v1/admin/orgs/{org}"), Some(&admin_token), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn manager_assignment_requires_manager_role() -> Result<()> {
    let app = TestApp::new().await?;
    let org = app.organization("Rowing").await?;
    let (_, admin_token) = app.account("ada", Role::Admin).await?;
    let (member, _) = app.account("max", Role::Member).await?;
    let (manager, manager_token) = app.account("mia", Role::Manager).await?;

    let (status, _) = app
        .send(
            "POST",
            &format!("/v1/admin/orgs/{org}/managers/{member}"),
            Some(&admin_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let assign = format!("/v1/admin/orgs/{org}/managers/{manager}");
    let (status, _) = app.send("POST", &assign, Some(&admin_token), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send("POST", &assign, Some(&admin_token), None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, managed) = app
        .send("GET", "/v1/me/managed-orgs", Some(&manager_token), None)
        .await?;
    assert_eq!(managed[0]["id"], org);

    let (status, managers) = app
        .send("GET", &format!("/v1/orgs/{org}/managers"), None, None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(managers[0]["display_name"], "mia");

    let (status, _) = app.send("DELETE", &assign, Some(&admin_token), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send("DELETE", &assign, Some(&admin_token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn manager_removes_member_and_their_responses() -> Result<()> {
    let app = TestApp::new().await?;
    let org = app.organization("Rowing").await?;
    let (manager, manager_token) = app.account("mia", Role::Manager).await?;
    app.assign(manager, org).await?;
    let (member, member_token) = app.account("max", Role::Member).await?;
    app.send("POST", &format!("/v1/orgs/{org}/join"), Some(&member_token), None)
        .await?;
    app.send(
        "POST",
        &format!("/v1/orgs/{org}/announcements"),
        Some(&manager_token),
        Some(event("Regatta", false)),
    )
    .await?;

    let (status, roster) = app
        .send("GET", &format!("/v1/orgs/{org}/members"), Some(&manager_token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(roster[0]["account_id"], member);
    assert_eq!(roster[0]["receive_emails"], true);

    let (status, _) = app
        .send(
            "DELETE",
            &format!("/v1/orgs/{org}/members/{member}"),
            Some(&manager_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        app.count(
            "SELECT COUNT(*) FROM announcement_responses WHERE account_id = ?",
            member
        )
        .await?,
        0
    );
    Ok(())
}

#[tokio::test]
async fn admin_cannot_rewrite_federated_identity() -> Result<()> {
    let app = TestApp::new().await?;
    let (_, admin) = app.account("root", Role::Admin).await?;
    let (ann, _) = app.federated_account("ann", Role::Member).await?;
    let uri = format!("/v1/admin/accounts/{ann}");

    let (status, body) = app
        .send(
            "PATCH",
            &uri,
            Some(admin.as_str()),
            Some(json!({ "username": "hijacked", "email": "evil@example.com" })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["category"], "validation_failed");
    assert_eq!(
        app.count(
            "SELECT COUNT(*) FROM accounts WHERE id = ? AND username = 'ann' AND email = 'ann@example.com'",
            ann
        )
        .await?,
        1
    );

    // Profile fields stay editable.
    let (status, body) = app
        .send(
            "PATCH",
            &uri,
            Some(admin.as_str()),
            Some(json!({ "display_name": "Ann Lee" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_name"], "Ann Lee");
    assert_eq!(body["username"], "ann");
    Ok(())
}

#[tokio::test]
async fn federated_account_self_service() -> Result<()> {
    let app = TestApp::new().await?;
    let (ann, token) = app.federated_account("ann", Role::Member).await?;

    let (status, _) = app
        .send(
            "POST",
            "/v1/auth/login",
            None,
            Some(json!({ "username": "ann", "password": "rowing2025" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    for change in [
        json!({ "username": "annie", "current_password": "rowing2025" }),
        json!({ "email": "annie@example.com" }),
        json!({ "new_password": "rowing2026", "new_password_confirmation": "rowing2026" }),
    ] {
        let (status, body) = app
            .send("PATCH", "/v1/me", Some(token.as_str()), Some(change))
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["category"], "validation_failed");
    }
    assert_eq!(
        app.count(
            "SELECT COUNT(*) FROM accounts WHERE id = ? AND username = 'ann' AND password_hash IS NULL",
            ann
        )
        .await?,
        1
    );

    let (status, body) = app
        .send(
            "PATCH",
            "/v1/me",
            Some(token.as_str()),
            Some(json!({ "display_name": "Ann Lee", "phone_number": "555 0100" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phone_number"], "555 0100");

    // No password to re-enter, so deletion goes straight through.
    let (status, _) = app.send("DELETE", "/v1/me", Some(token.as_str()), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.count("SELECT COUNT(*) FROM accounts WHERE id = ?", ann).await?, 0);
    assert_eq!(app.count("SELECT COUNT(*) FROM sessions WHERE account_id = ?", ann).await?, 0);
    Ok(())
}

#[tokio::test]
async fn demoted_manager_loses_assignments() -> Result<()> {
    let app = TestApp::new().await?;
    let org = app.organization("Rowing").await?;
    let (_, admin) = app.account("root", Role::Admin).await?;
    let (mia, mia_token) = app.account("mia", Role::Manager).await?;
    app.assign(mia, org).await?;

    let (status, managers) = app.send("GET", &format!("/v1/orgs/{org}/managers"), None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(managers.as_array().map(Vec::len), Some(1));

    let uri = format!("/v1/admin/accounts/{mia}");
    let (status, body) = app
        .send("PATCH", &uri, Some(admin.as_str()), Some(json!({ "role": "member" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "member");

    let (_, managers) = app.send("GET", &format!("/v1/orgs/{org}/managers"), None, None).await?;
    assert_eq!(managers.as_array().map(Vec::len), Some(0));
    assert_eq!(
        app.count("SELECT COUNT(*) FROM manager_assignments WHERE account_id = ?", mia)
            .await?,
        0
    );

    // Promoting again does not bring the old scope back.
    let (status, _) = app
        .send("PATCH", &uri, Some(admin.as_str()), Some(json!({ "role": "manager" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .send(
            "PATCH",
            &format!("/v1/orgs/{org}"),
            Some(mia_token.as_str()),
            Some(json!({ "summary": "Mine again" })),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
