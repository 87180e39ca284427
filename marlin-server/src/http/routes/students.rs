//! Student endpoints

use std::sync::Arc;

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::http::error::ApiError;
use crate::http::extractors::{ValidId, ValidJson, ValidQuery};
use crate::http::server::AppState;
use crate::models::{GroupSummary, Student, StudentFilter, StudentPatch, ValidationError};
use crate::service::StudentIntake;

/// Create student request; missing strings fail validation as empty
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub national_id: String,
    #[serde(default)]
    pub email: String,
    pub group_id: Option<i64>,
}

/// Partial update; absent fields are left unchanged
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentRequest {
    pub name: Option<String>,
    pub national_id: Option<String>,
    pub email: Option<String>,
    pub group_ids: Option<Vec<i64>>,
}

impl From<UpdateStudentRequest> for StudentPatch {
    fn from(r: UpdateStudentRequest) -> Self {
        Self {
            name: r.name,
            national_id: r.national_id,
            email: r.email,
            group_ids: r.group_ids,
        }
    }
}

/// GET /students filters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentQuery {
    pub name: Option<String>,
    pub national_id: Option<String>,
    pub email: Option<String>,
    pub group_id: Option<i64>,
}

/// DELETE /students/{id} confirmation
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteStudentQuery {
    #[serde(default)]
    pub national_id: String,
}

/// Group as listed inside a student
#[derive(Serialize)]
pub struct GroupSummaryResponse {
    pub id: i64,
    pub code: String,
    pub level: String,
}

impl From<GroupSummary> for GroupSummaryResponse {
    fn from(g: GroupSummary) -> Self {
        Self {
            id: g.id,
            code: g.code,
            level: g.level,
        }
    }
}

/// Student response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResponse {
    pub id: i64,
    pub name: String,
    pub national_id: String,
    pub email: String,
    pub groups: Vec<GroupSummaryResponse>,
}

impl From<Student> for StudentResponse {
    fn from(s: Student) -> Self {
        Self {
            id: s.id,
            name: s.name,
            national_id: s.national_id,
            email: s.email,
            groups: s.groups.into_iter().map(GroupSummaryResponse::from).collect(),
        }
    }
}

/// Confirmation message, with the affected student when there is one
#[derive(Serialize)]
pub struct StudentMessage {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentResponse>,
}

/// GET /students - list students matching the filters
async fn list_students(
    State(state): State<Arc<AppState>>,
    ValidQuery(q): ValidQuery<StudentQuery>,
) -> Result<Json<Vec<StudentResponse>>, ApiError> {
    let filter = StudentFilter::from_raw(q.name, q.national_id, q.email, q.group_id);
    let students = state.service.list_students(&filter).await?;

    Ok(Json(students.into_iter().map(StudentResponse::from).collect()))
}

/// POST /students - create a student enrolled in one group
async fn create_student(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateStudentRequest>,
) -> Result<Json<StudentMessage>, ApiError> {
    let group_id = req
        .group_id
        .ok_or(ValidationError::Empty { field: "groupId" })?;

    let intake = StudentIntake {
        name: req.name,
        national_id: req.national_id,
        email: Some(req.email),
    };
    let student = state.service.create_student(&intake, group_id).await?;

    Ok(Json(StudentMessage {
        message: "student enrolled successfully".to_owned(),
        student: Some(StudentResponse::from(student)),
    }))
}

/// GET /students/{id} - get a single student
async fn get_student(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<Json<StudentResponse>, ApiError> {
    let student = state.service.get_student(id).await?;
    Ok(Json(StudentResponse::from(student)))
}

/// PUT /students/{id} - partial update
async fn update_student(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
    ValidJson(req): ValidJson<UpdateStudentRequest>,
) -> Result<Json<StudentMessage>, ApiError> {
    let student = state.service.update_student(id, req.into()).await?;

    Ok(Json(StudentMessage {
        message: "student updated successfully".to_owned(),
        student: Some(StudentResponse::from(student)),
    }))
}

/// DELETE /students/{id}?nationalId=... - delete after confirming the national ID
async fn delete_student(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
    ValidQuery(q): ValidQuery<DeleteStudentQuery>,
) -> Result<Json<StudentMessage>, ApiError> {
    let student = state.service.delete_student(id, &q.national_id).await?;

    Ok(Json(StudentMessage {
        message: format!(
            "student with national ID {} deleted successfully",
            student.national_id
        ),
        student: None,
    }))
}

/// Student routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/students", get(list_students).post(create_student))
        .route(
            "/students/{id}",
            get(get_student).put(update_student).delete(delete_student),
        )
}
