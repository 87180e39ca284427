//! Persistence gateway seam
//!
//! The enrollment service talks to storage only through [`EnrollmentStore`].
//! [`PgStore`] is the production implementation; [`super::InMemoryStore`]
//! backs tests and the `--in-memory` server mode.

use async_trait::async_trait;
use sqlx::PgPool;

use super::repos::{DbError, GroupRepo, StudentRepo};
use crate::models::{
    ClassGroup, Email, GroupCode, GroupFilter, NationalId, NewGroup, NewStudent, Student,
    StudentChanges, StudentFilter,
};

/// Typed operations over students, class groups and enrollments.
///
/// Writes that add a member take `capacity` and must enforce it atomically
/// with the insert, returning `DbError::CapacityExceeded` when full.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Short name of the backing storage, reported by the health endpoint
    fn backend(&self) -> &'static str;

    async fn get_student(&self, id: i64) -> Result<Student, DbError>;

    async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, DbError>;

    async fn find_student_by_national_id(
        &self,
        national_id: &NationalId,
    ) -> Result<Option<Student>, DbError>;

    async fn national_id_taken(
        &self,
        national_id: &NationalId,
        except: Option<i64>,
    ) -> Result<bool, DbError>;

    async fn email_taken(&self, email: &Email, except: Option<i64>) -> Result<bool, DbError>;

    /// Insert a student enrolled in exactly `group_id`.
    async fn create_enrolled_student(
        &self,
        student: &NewStudent,
        group_id: i64,
        capacity: usize,
    ) -> Result<Student, DbError>;

    /// Version-guarded update; `DbError::StaleVersion` if the row moved on.
    async fn update_student(
        &self,
        id: i64,
        expected_version: i32,
        changes: &StudentChanges,
        capacity: Option<usize>,
    ) -> Result<Student, DbError>;

    async fn delete_student(&self, id: i64) -> Result<(), DbError>;

    async fn get_group(&self, id: i64) -> Result<ClassGroup, DbError>;

    async fn list_groups(&self, filter: &GroupFilter) -> Result<Vec<ClassGroup>, DbError>;

    async fn group_code_taken(&self, code: &GroupCode) -> Result<bool, DbError>;

    async fn insert_group(&self, group: &NewGroup) -> Result<ClassGroup, DbError>;

    /// Link an existing student to a group.
    async fn enroll(
        &self,
        group_id: i64,
        student_id: i64,
        capacity: usize,
    ) -> Result<ClassGroup, DbError>;

    /// Delete a group; `DbError::HasMembers` while students are enrolled.
    async fn delete_group(&self, id: i64) -> Result<(), DbError>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get_student(&self, id: i64) -> Result<Student, DbError> {
        StudentRepo::new(&self.pool).get(id).await
    }

    async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, DbError> {
        StudentRepo::new(&self.pool).list(filter).await
    }

    async fn find_student_by_national_id(
        &self,
        national_id: &NationalId,
    ) -> Result<Option<Student>, DbError> {
        StudentRepo::new(&self.pool)
            .find_by_national_id(national_id)
            .await
    }

    async fn national_id_taken(
        &self,
        national_id: &NationalId,
        except: Option<i64>,
    ) -> Result<bool, DbError> {
        StudentRepo::new(&self.pool)
            .national_id_taken(national_id, except)
            .await
    }

    async fn email_taken(&self, email: &Email, except: Option<i64>) -> Result<bool, DbError> {
        StudentRepo::new(&self.pool).email_taken(email, except).await
    }

    async fn create_enrolled_student(
        &self,
        student: &NewStudent,
        group_id: i64,
        capacity: usize,
    ) -> Result<Student, DbError> {
        StudentRepo::new(&self.pool)
            .create_enrolled(student, group_id, capacity)
            .await
            .map_err(|e| e.on_contention("group", group_id))
    }

    async fn update_student(
        &self,
        id: i64,
        expected_version: i32,
        changes: &StudentChanges,
        capacity: Option<usize>,
    ) -> Result<Student, DbError> {
        StudentRepo::new(&self.pool)
            .update(id, expected_version, changes, capacity)
            .await
            .map_err(|e| e.on_contention("student", id))
    }

    async fn delete_student(&self, id: i64) -> Result<(), DbError> {
        StudentRepo::new(&self.pool).delete(id).await
    }

    async fn get_group(&self, id: i64) -> Result<ClassGroup, DbError> {
        GroupRepo::new(&self.pool).get(id).await
    }

    async fn list_groups(&self, filter: &GroupFilter) -> Result<Vec<ClassGroup>, DbError> {
        GroupRepo::new(&self.pool).list(filter).await
    }

    async fn group_code_taken(&self, code: &GroupCode) -> Result<bool, DbError> {
        GroupRepo::new(&self.pool).code_taken(code).await
    }

    async fn insert_group(&self, group: &NewGroup) -> Result<ClassGroup, DbError> {
        GroupRepo::new(&self.pool).insert(group).await
    }

    async fn enroll(
        &self,
        group_id: i64,
        student_id: i64,
        capacity: usize,
    ) -> Result<ClassGroup, DbError> {
        GroupRepo::new(&self.pool)
            .enroll(group_id, student_id, capacity)
            .await
            .map_err(|e| e.on_contention("group", group_id))
    }

    async fn delete_group(&self, id: i64) -> Result<(), DbError> {
        GroupRepo::new(&self.pool)
            .delete_if_empty(id)
            .await
            .map_err(|e| e.on_contention("group", id))
    }
}
