#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    // keeps the sqlite file alive for the duration of the test
    _dir: TempDir,
}

pub struct TestUser {
    pub id: String,
    pub token: String,
}

/// Fresh database with migrations applied, plus a pool for direct fixture edits.
pub async fn setup_pool() -> Result<(TempDir, SqlitePool)> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    Ok((dir, pool))
}

pub async fn setup() -> Result<TestApp> {
    let (dir, pool) = setup_pool().await?;
    let app = drms::create_app(pool.clone()).await?;
    Ok(TestApp { app, pool, _dir: dir })
}

impl TestApp {
    pub fn from_parts(app: Router, pool: SqlitePool, dir: TempDir) -> Self {
        Self { app, pool, _dir: dir }
    }

    pub async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok((status, value))
    }

    pub async fn register(&self, name: &str, email: &str, department: Option<&str>) -> Result<TestUser> {
        let (status, body) = self
            .send(
                "POST",
                "/auth/register",
                None,
                Some(json!({
                    "name": name,
                    "email": email,
                    "password": "password123",
                    "department": department
                })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "register {} failed: {}", email, body);

        Ok(TestUser {
            id: body["user"]["id"].as_str().context("missing user id")?.to_string(),
            token: body["token"].as_str().context("missing token")?.to_string(),
        })
    }

    /// Role changes bypass the API; the principal is reloaded on every request.
    pub async fn set_role(&self, email: &str, role: &str, department: Option<&str>, managed_department: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE users SET role = ?, department = ?, managed_department = ? WHERE email = ?")
            .bind(role)
            .bind(department)
            .bind(managed_department)
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_request(&self, token: &str, title: &str, department: Option<&str>) -> Result<String> {
        let (status, body) = self
            .send(
                "POST",
                "/requests",
                Some(token),
                Some(json!({
                    "title": title,
                    "document_type": "ID_CARD",
                    "department": department,
                    "due_date": "2026-12-01"
                })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "create request failed: {}", body);
        Ok(body["id"].as_str().context("missing request id")?.to_string())
    }

    /// Assigns the request to the given users and returns the new assignment ids in order.
    pub async fn assign(&self, token: &str, request_id: &str, employee_ids: &[&str]) -> Result<Vec<String>> {
        let (status, body) = self
            .send(
                "POST",
                &format!("/requests/{}/assignments", request_id),
                Some(token),
                Some(json!({ "employee_ids": employee_ids })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "assign failed: {}", body);

        let created = body["created"].as_array().context("missing created")?;
        let mut ids = Vec::new();
        for employee_id in employee_ids {
            let assignment = created
                .iter()
                .find(|a| a["employee_id"] == *employee_id)
                .context("assignment not created")?;
            ids.push(assignment["id"].as_str().context("missing assignment id")?.to_string());
        }
        Ok(ids)
    }

    pub async fn upload(&self, token: &str, assignment_id: &str, file_name: &str) -> Result<(StatusCode, Value)> {
        self.send(
            "POST",
            &format!("/assignments/{}/attachments", assignment_id),
            Some(token),
            Some(json!({
                "file_name": file_name,
                "content_type": "application/pdf",
                "size_bytes": 1024,
                "storage_key": format!("uploads/{}", file_name)
            })),
        )
        .await
    }

    /// The activity listener runs in the background; wait until the event lands.
    pub async fn wait_for_event(&self, event_name: &str) -> Result<Vec<(String, String)>> {
        for _ in 0..25 {
            let rows: Vec<(String, String)> =
                sqlx::query_as("SELECT event_name, description FROM activity_log WHERE event_name = ?")
                    .bind(event_name)
                    .fetch_all(&self.pool)
                    .await?;
            if !rows.is_empty() {
                return Ok(rows);
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
        }
        anyhow::bail!("event {} was never recorded", event_name)
    }
}
