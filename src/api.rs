//! HTTP API for the taskview server

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::clock::Clock;
use crate::config::{Config, Identity, ViewSettings};
use crate::db::Database;
use crate::engine::{
    DerivedStats, Filter, FilterAction, SortBy, TaskView, TaskViewEngine, ViewFilters, ViewMode,
};
use crate::models::{Priority, Project, Status, Task, TaskPatch};

/// Application state shared across handlers
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub view: ViewSettings,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(db: Database, config: Config, clock: Arc<dyn Clock>) -> anyhow::Result<Arc<Self>> {
        let view = config.view.settings()?;
        Ok(Arc::new(Self {
            db,
            config,
            view,
            clock,
        }))
    }

    /// Engine pinned to the current instant; built per request so day
    /// boundaries follow the clock.
    fn engine(&self) -> TaskViewEngine {
        TaskViewEngine::new(self.clock.as_ref(), &self.view)
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/tasks", post(create_task))
        .route("/api/v1/tasks/mine", get(my_tasks))
        .route("/api/v1/tasks/{id}", patch(update_task))
        .route("/api/v1/stats", get(my_stats))
        .route("/api/v1/projects", get(list_projects).post(create_project))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint (no auth required)
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "taskview",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Auth middleware - resolves the Bearer token to an identity
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    // Skip auth for health check
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(token) = auth_header.and_then(|h| h.strip_prefix("Bearer ")) else {
        return ApiError::Unauthorized("Missing or invalid Authorization header").into_response();
    };

    let Some(identity) = state.config.identify(token) else {
        return ApiError::Unauthorized("Invalid API token").into_response();
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Query string of `GET /api/v1/tasks/mine`. An absent filter means "any".
#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub search: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub project: Option<String>,
    pub sort_by: Option<SortBy>,
    pub view: Option<ViewMode>,
}

impl From<TaskQuery> for ViewFilters {
    fn from(query: TaskQuery) -> Self {
        let mut actions = vec![
            FilterAction::SetStatus(Filter::from(query.status)),
            FilterAction::SetPriority(Filter::from(query.priority)),
            FilterAction::SetProject(Filter::from(query.project)),
        ];
        if let Some(search) = query.search {
            actions.push(FilterAction::SetSearch(search));
        }
        if let Some(sort_by) = query.sort_by {
            actions.push(FilterAction::SetSortBy(sort_by));
        }
        if let Some(view) = query.view {
            actions.push(FilterAction::SetViewMode(view));
        }
        ViewFilters::default().reduce_all(actions)
    }
}

async fn my_tasks(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<TaskView>, ApiError> {
    let filters = ViewFilters::from(query);
    let tasks = state.db.list_tasks(&identity.company_id)?;
    let view = state
        .engine()
        .view(&tasks, &identity.member_id, &identity.company_id, &filters);

    tracing::info!(
        member_id = %identity.member_id,
        company_id = %identity.company_id,
        shown = view.tasks.len(),
        "Task view served"
    );

    Ok(Json(view))
}

async fn my_stats(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DerivedStats>, ApiError> {
    let tasks = state.db.list_tasks(&identity.company_id)?;
    let stats = state
        .engine()
        .compute_stats(&tasks, &identity.member_id, &identity.company_id);
    Ok(Json(stats))
}

/// Body of `POST /api/v1/tasks`; the tenant always comes from the token.
#[derive(Debug, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(new_task): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    check_title(&new_task.title)?;
    check_status(&new_task.status)?;
    if let Some(project_id) = &new_task.project_id {
        check_project(&state.db, &identity.company_id, project_id)?;
    }

    let task = Task {
        id: uuid::Uuid::new_v4().to_string(),
        title: new_task.title,
        description: new_task.description,
        status: new_task.status,
        priority: new_task.priority,
        due_date: new_task.due_date,
        assignees: new_task.assignees,
        company_id: identity.company_id.clone(),
        project_id: new_task.project_id,
        updated_at: Some(state.clock.now()),
    };
    state.db.insert_task(&task)?;

    tracing::info!(task_id = %task.id, company_id = %task.company_id, "Task created");

    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::BadRequest("no fields to update".into()));
    }
    if let Some(title) = &patch.title {
        check_title(title)?;
    }
    if let Some(status) = &patch.status {
        check_status(status)?;
    }
    if let Some(Some(project_id)) = &patch.project_id {
        check_project(&state.db, &identity.company_id, project_id)?;
    }

    let updated = state
        .db
        .update_task(&identity.company_id, &id, &patch, state.clock.now())?;
    if !updated {
        return Err(ApiError::NotFound(format!("task {id}")));
    }

    tracing::info!(task_id = %id, member_id = %identity.member_id, "Task updated");

    let task = state
        .db
        .get_task(&identity.company_id, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("task {id}")))?;
    Ok(Json(task))
}

fn check_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".into()));
    }
    Ok(())
}

fn check_status(status: &Status) -> Result<(), ApiError> {
    if !status.is_known() {
        return Err(ApiError::BadRequest(format!(
            "unknown status '{status}', expected To-Do, In Progress or Done"
        )));
    }
    Ok(())
}

/// Tasks may only point at projects of their own company.
fn check_project(db: &Database, company_id: &str, project_id: &str) -> Result<(), ApiError> {
    if !db.project_exists(company_id, project_id)? {
        return Err(ApiError::BadRequest(format!("unknown project {project_id}")));
    }
    Ok(())
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(state.db.list_projects(&identity.company_id)?))
}

#[derive(Debug, Deserialize)]
pub struct NewProject {
    pub name: String,
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(new_project): Json<NewProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    if new_project.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }

    let project = Project {
        id: uuid::Uuid::new_v4().to_string(),
        company_id: identity.company_id,
        name: new_project.name,
    };
    state.db.insert_project(&project)?;

    Ok((StatusCode::CREATED, Json(project)))
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "API error");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
