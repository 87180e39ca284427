//! Class group endpoints

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::students::StudentResponse;
use crate::http::error::ApiError;
use crate::http::extractors::{ValidId, ValidJson, ValidQuery};
use crate::http::server::AppState;
use crate::models::{ClassGroup, GroupFilter, StudentSummary};
use crate::service::StudentIntake;

/// Create group request
#[derive(Deserialize)]
pub struct CreateGroupRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub level: String,
}

/// Add a new or existing student to a group
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddStudentRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub national_id: String,
    /// Only used when the student doesn't exist yet
    pub email: Option<String>,
}

/// GET /groups filters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupQuery {
    pub code: Option<String>,
    pub level: Option<String>,
    pub student_id: Option<i64>,
}

/// DELETE /groups/{id} confirmation
#[derive(Deserialize)]
pub struct DeleteGroupQuery {
    pub code: Option<String>,
}

/// Student as listed inside a group
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummaryResponse {
    pub id: i64,
    pub name: String,
    pub national_id: String,
    pub email: String,
}

impl From<StudentSummary> for StudentSummaryResponse {
    fn from(s: StudentSummary) -> Self {
        Self {
            id: s.id,
            name: s.name,
            national_id: s.national_id,
            email: s.email,
        }
    }
}

/// Group response
#[derive(Serialize)]
pub struct GroupResponse {
    pub id: i64,
    pub code: String,
    pub level: String,
    pub students: Vec<StudentSummaryResponse>,
}

impl From<ClassGroup> for GroupResponse {
    fn from(g: ClassGroup) -> Self {
        Self {
            id: g.id,
            code: g.code,
            level: g.level,
            students: g
                .students
                .into_iter()
                .map(StudentSummaryResponse::from)
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct GroupCreated {
    pub message: String,
    pub group: GroupResponse,
}

#[derive(Serialize)]
pub struct StudentAdded {
    pub message: String,
    /// False when an existing student was attached
    pub created: bool,
    pub student: StudentResponse,
}

/// GET /groups - list groups matching the filters
async fn list_groups(
    State(state): State<Arc<AppState>>,
    ValidQuery(q): ValidQuery<GroupQuery>,
) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    let filter = GroupFilter::from_raw(q.code, q.level, q.student_id);
    let groups = state.service.list_groups(&filter).await?;

    Ok(Json(groups.into_iter().map(GroupResponse::from).collect()))
}

/// POST /groups - create a group
async fn create_group(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateGroupRequest>,
) -> Result<(StatusCode, [(header::HeaderName, String); 1], Json<GroupCreated>), ApiError> {
    let group = state.service.create_group(&req.code, &req.level).await?;
    let location = format!("/groups/{}", group.id);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(GroupCreated {
            message: "group created successfully".to_owned(),
            group: GroupResponse::from(group),
        }),
    ))
}

/// GET /groups/{id} - get a single group
async fn get_group(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<Json<GroupResponse>, ApiError> {
    let group = state.service.get_group(id).await?;
    Ok(Json(GroupResponse::from(group)))
}

/// POST /groups/{id}/students - enroll a new or existing student
async fn add_student(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
    ValidJson(req): ValidJson<AddStudentRequest>,
) -> Result<Json<StudentAdded>, ApiError> {
    let intake = StudentIntake {
        name: req.name,
        national_id: req.national_id,
        email: req.email,
    };
    let outcome = state.service.add_student_to_group(id, &intake).await?;

    Ok(Json(StudentAdded {
        message: "student added to group successfully".to_owned(),
        created: outcome.created,
        student: StudentResponse::from(outcome.student),
    }))
}

/// DELETE /groups/{id}?code=... - delete an empty group after confirming its code
async fn delete_group(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
    ValidQuery(q): ValidQuery<DeleteGroupQuery>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_group(id, q.code.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Group routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/{id}", get(get_group).delete(delete_group))
        .route("/groups/{id}/students", post(add_student))
}
