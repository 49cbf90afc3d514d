//! End-to-end access checks through the real router and a real database:
//! list visibility, role gates, session inactivity and archived-task rules.
//!
//! # Running
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p server --test access_control
//! ```
//!
//! Tests are skipped when neither `SERVER_DATABASE_URL` nor `DATABASE_URL` is set.

use std::collections::HashSet;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use sqlx::PgPool;
use tower::ServiceExt;
use utils::api::{
    tasks::{TaskPriority, TaskStatus},
    users::Role,
};
use uuid::Uuid;

use server::{
    AppState,
    auth::JwtService,
    config::ServerConfig,
    db::{
        self,
        assignments::AssignmentRepository,
        tasks::{CreateTaskData, TaskRepository},
    },
    routes::router,
};

const SECRET: &str = "dGFza2Rlc2stYWNjZXNzLWNvbnRyb2wtdGVzdC1zZWNyZXQ=";

fn database_url() -> Option<String> {
    std::env::var("SERVER_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
}

macro_rules! skip_without_db {
    () => {
        if database_url().is_none() {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        }
    };
}

struct TestApp {
    pool: PgPool,
    router: Router,
    jwt: JwtService,
}

impl TestApp {
    async fn new() -> Self {
        let url = database_url().expect("DATABASE_URL must be set");
        let config = ServerConfig::from_lookup(|key: &str| match key {
            "SERVER_DATABASE_URL" => Some(url.clone()),
            "TASKDESK_JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .expect("config");

        let pool = PgPool::connect(&url)
            .await
            .expect("Failed to connect to database");
        db::migrate(&pool).await.expect("Failed to run migrations");

        Self {
            router: router(AppState::new(pool.clone(), config)),
            jwt: JwtService::new(SECRET.to_string().into()),
            pool,
        }
    }

    async fn department(&self) -> Uuid {
        sqlx::query_scalar("INSERT INTO departments (name) VALUES ($1) RETURNING id")
            .bind(format!("Dept {}", Uuid::new_v4()))
            .fetch_one(&self.pool)
            .await
            .expect("Failed to create department")
    }

    async fn user(&self, role: Role, department_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO profiles (id, email, role, department_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(format!("{id}@example.test"))
        .bind(role)
        .bind(department_id)
        .execute(&self.pool)
        .await
        .expect("Failed to create profile");
        id
    }

    /// Opens a session last used `idle` ago and returns its bearer token.
    async fn token_idle_for(&self, user_id: Uuid, idle: Duration) -> (Uuid, String) {
        let session_id: Uuid = sqlx::query_scalar(
            "INSERT INTO auth_sessions (user_id, last_used_at) VALUES ($1, $2) RETURNING id",
        )
        .bind(user_id)
        .bind(Utc::now() - idle)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to create session");

        let token = self
            .jwt
            .encode_access_token(user_id, session_id, Duration::minutes(5))
            .expect("Failed to sign token");
        (session_id, token)
    }

    async fn token(&self, user_id: Uuid) -> String {
        self.token_idle_for(user_id, Duration::zero()).await.1
    }

    async fn task(
        &self,
        created_by: Uuid,
        department_id: Option<Uuid>,
        assignees: &[Uuid],
    ) -> Uuid {
        TaskRepository::new(&self.pool)
            .create(CreateTaskData {
                project_id: None,
                parent_task_id: None,
                department_id,
                title: "access check".to_string(),
                description: None,
                status: TaskStatus::Todo,
                priority: TaskPriority::Medium,
                start_at: None,
                due_at: None,
                created_by,
                assignee_ids: assignees.to_vec(),
            })
            .await
            .expect("Failed to create task")
            .id
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn visible_task_ids(&self, token: &str) -> HashSet<Uuid> {
        let (status, body) = self.send("GET", "/v1/tasks", token, None).await;
        assert_eq!(status, StatusCode::OK);
        body["tasks"]
            .as_array()
            .expect("tasks array")
            .iter()
            .map(|task| task["id"].as_str().unwrap().parse().unwrap())
            .collect()
    }
}

#[tokio::test]
async fn task_list_follows_visibility_rules() {
    skip_without_db!();
    let app = TestApp::new().await;

    let ops = app.department().await;
    let sales = app.department().await;
    let staff = app.user(Role::Staff, Some(ops)).await;
    let colleague = app.user(Role::Staff, Some(ops)).await;
    let manager = app.user(Role::Manager, Some(ops)).await;
    let other_manager = app.user(Role::Manager, Some(sales)).await;
    let admin = app.user(Role::Admin, None).await;

    let own = app.task(staff, Some(ops), &[]).await;
    let assigned = app.task(colleague, Some(ops), &[staff]).await;
    let colleagues_only = app.task(colleague, Some(ops), &[]).await;
    let other_department = app.task(other_manager, Some(sales), &[]).await;

    let staff_token = app.token(staff).await;
    assert_eq!(
        app.visible_task_ids(&staff_token).await,
        HashSet::from([own, assigned])
    );

    let manager_token = app.token(manager).await;
    assert_eq!(
        app.visible_task_ids(&manager_token).await,
        HashSet::from([own, assigned, colleagues_only])
    );

    let (status, _) = app
        .send("GET", &format!("/v1/tasks/{other_department}"), &staff_token, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send("GET", &format!("/v1/tasks/{}", Uuid::new_v4()), &staff_token, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let admin_token = app.token(admin).await;
    let (status, body) = app
        .send("GET", &format!("/v1/tasks/{other_department}"), &admin_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], other_department.to_string());
}

#[tokio::test]
async fn role_gates_apply_to_authenticated_users() {
    skip_without_db!();
    let app = TestApp::new().await;

    let ops = app.department().await;
    let sales = app.department().await;
    let staff = app.user(Role::Staff, Some(ops)).await;
    let manager = app.user(Role::Manager, Some(ops)).await;
    let other_manager = app.user(Role::Manager, Some(sales)).await;
    let admin = app.user(Role::Admin, None).await;
    let task = app.task(staff, Some(ops), &[]).await;

    let staff_token = app.token(staff).await;
    let archive = format!("/v1/tasks/{task}/archive");
    let (status, _) = app.send("POST", &archive, &staff_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send("GET", "/v1/users", &staff_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Past the gate, the task rules still apply.
    let other_token = app.token(other_manager).await;
    let (status, _) = app.send("POST", &archive, &other_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let manager_token = app.token(manager).await;
    let (status, body) = app.send("GET", "/v1/users", &manager_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body["users"]
            .as_array()
            .unwrap()
            .iter()
            .all(|user| user["department_id"] == ops.to_string())
    );

    let new_department = json!({ "name": format!("Dept {}", Uuid::new_v4()) });
    let (status, _) = app
        .send("POST", "/v1/departments", &manager_token, Some(new_department.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin_token = app.token(admin).await;
    let (status, _) = app
        .send("POST", "/v1/departments", &admin_token, Some(new_department))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.send("POST", &archive, &manager_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_affected"], 1);
}

#[tokio::test]
async fn inactive_session_is_rejected_and_revoked() {
    skip_without_db!();
    let app = TestApp::new().await;
    let staff = app.user(Role::Staff, None).await;

    let (_, fresh) = app.token_idle_for(staff, Duration::days(1)).await;
    let (status, body) = app.send("GET", "/v1/me", &fresh, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], staff.to_string());

    let (stale_session, stale) = app.token_idle_for(staff, Duration::days(31)).await;
    let (status, _) = app.send("GET", "/v1/me", &stale, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let revoked: bool =
        sqlx::query_scalar("SELECT revoked_at IS NOT NULL FROM auth_sessions WHERE id = $1")
            .bind(stale_session)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert!(revoked);
}

#[tokio::test]
async fn assignees_of_archived_task_cannot_be_removed() {
    skip_without_db!();
    let app = TestApp::new().await;

    let ops = app.department().await;
    let staff = app.user(Role::Staff, Some(ops)).await;
    let manager = app.user(Role::Manager, Some(ops)).await;
    let task = app.task(manager, Some(ops), &[staff]).await;

    let manager_token = app.token(manager).await;
    let (status, _) = app
        .send("POST", &format!("/v1/tasks/{task}/archive"), &manager_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let staff_token = app.token(staff).await;
    let (status, _) = app
        .send(
            "DELETE",
            &format!("/v1/tasks/{task}/assignees/{staff}"),
            &staff_token,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let assignees = AssignmentRepository::new(&app.pool).list(task).await.unwrap();
    assert_eq!(assignees.len(), 1);
    assert_eq!(assignees[0].user_id, staff);

    let (status, _) = app
        .send("POST", &format!("/v1/tasks/{task}/restore"), &manager_token, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .send(
            "DELETE",
            &format!("/v1/tasks/{task}/assignees/{staff}"),
            &staff_token,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
