//! In-memory store
//!
//! Same contract as the PostgreSQL store: unique keys report the same
//! constraint names, capacity is enforced under the write lock, and updates
//! are version-guarded. Every mutation validates fully before touching state,
//! so a failed write leaves nothing behind.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::repos::{DbError, EMAIL_KEY, ENROLLMENT_KEY, GROUP_CODE_KEY, NATIONAL_ID_KEY};
use super::store::EnrollmentStore;
use crate::models::{
    ClassGroup, Email, GroupCode, GroupFilter, GroupSummary, NationalId, NewGroup, NewStudent,
    Student, StudentChanges, StudentFilter, StudentSummary,
};

#[derive(Debug, Clone)]
struct StudentRow {
    name: String,
    national_id: String,
    email: String,
    version: i32,
}

#[derive(Debug, Clone)]
struct GroupRow {
    code: String,
    level: String,
}

#[derive(Debug, Default)]
struct State {
    students: BTreeMap<i64, StudentRow>,
    groups: BTreeMap<i64, GroupRow>,
    /// (group_id, student_id)
    enrollments: BTreeSet<(i64, i64)>,
    last_student_id: i64,
    last_group_id: i64,
}

impl State {
    fn student(&self, id: i64) -> Option<Student> {
        let row = self.students.get(&id)?;
        let groups = self
            .enrollments
            .iter()
            .filter(|(_, s)| *s == id)
            .filter_map(|(g, _)| {
                self.groups.get(g).map(|grp| GroupSummary {
                    id: *g,
                    code: grp.code.clone(),
                    level: grp.level.clone(),
                })
            })
            .collect();

        Some(Student {
            id,
            name: row.name.clone(),
            national_id: row.national_id.clone(),
            email: row.email.clone(),
            version: row.version,
            groups,
        })
    }

    fn group(&self, id: i64) -> Option<ClassGroup> {
        let row = self.groups.get(&id)?;
        let students = self
            .enrollments
            .range((id, i64::MIN)..=(id, i64::MAX))
            .filter_map(|(_, s)| {
                self.students.get(s).map(|st| StudentSummary {
                    id: *s,
                    name: st.name.clone(),
                    national_id: st.national_id.clone(),
                    email: st.email.clone(),
                })
            })
            .collect();

        Some(ClassGroup {
            id,
            code: row.code.clone(),
            level: row.level.clone(),
            students,
        })
    }

    fn member_count(&self, group_id: i64) -> usize {
        self.enrollments
            .range((group_id, i64::MIN)..=(group_id, i64::MAX))
            .count()
    }

    fn require_room(&self, group_id: i64, capacity: Option<usize>) -> Result<(), DbError> {
        if !self.groups.contains_key(&group_id) {
            return Err(DbError::group_not_found(group_id));
        }
        if let Some(capacity) = capacity {
            if self.member_count(group_id) >= capacity {
                return Err(DbError::CapacityExceeded { group_id, capacity });
            }
        }
        Ok(())
    }

    fn national_id_taken(&self, national_id: &str, except: Option<i64>) -> bool {
        self.students
            .iter()
            .any(|(id, s)| Some(*id) != except && s.national_id == national_id)
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.students
            .iter()
            .any(|(id, s)| Some(*id) != except && s.email == email)
    }

    fn check_student_keys(
        &self,
        national_id: Option<&str>,
        email: Option<&str>,
        except: Option<i64>,
    ) -> Result<(), DbError> {
        if national_id.is_some_and(|n| self.national_id_taken(n, except)) {
            return Err(unique(NATIONAL_ID_KEY));
        }
        if email.is_some_and(|e| self.email_taken(e, except)) {
            return Err(unique(EMAIL_KEY));
        }
        Ok(())
    }
}

fn unique(constraint: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: constraint.to_owned(),
    }
}

/// Store kept entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get_student(&self, id: i64) -> Result<Student, DbError> {
        self.state
            .read()
            .await
            .student(id)
            .ok_or_else(|| DbError::student_not_found(id))
    }

    async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, DbError> {
        let state = self.state.read().await;
        Ok(state
            .students
            .keys()
            .filter_map(|id| state.student(*id))
            .filter(|s| filter.matches(s))
            .collect())
    }

    async fn find_student_by_national_id(
        &self,
        national_id: &NationalId,
    ) -> Result<Option<Student>, DbError> {
        let state = self.state.read().await;
        let found = state
            .students
            .iter()
            .find(|(_, s)| s.national_id == national_id.as_str())
            .map(|(id, _)| *id);
        Ok(found.and_then(|id| state.student(id)))
    }

    async fn national_id_taken(
        &self,
        national_id: &NationalId,
        except: Option<i64>,
    ) -> Result<bool, DbError> {
        Ok(self
            .state
            .read()
            .await
            .national_id_taken(national_id.as_str(), except))
    }

    async fn email_taken(&self, email: &Email, except: Option<i64>) -> Result<bool, DbError> {
        Ok(self.state.read().await.email_taken(email.as_str(), except))
    }

    async fn create_enrolled_student(
        &self,
        student: &NewStudent,
        group_id: i64,
        capacity: usize,
    ) -> Result<Student, DbError> {
        let mut state = self.state.write().await;

        state.require_room(group_id, Some(capacity))?;
        state.check_student_keys(
            Some(student.national_id.as_str()),
            Some(student.email.as_str()),
            None,
        )?;

        state.last_student_id += 1;
        let id = state.last_student_id;
        state.students.insert(
            id,
            StudentRow {
                name: student.name.as_str().to_owned(),
                national_id: student.national_id.as_str().to_owned(),
                email: student.email.as_str().to_owned(),
                version: 1,
            },
        );
        state.enrollments.insert((group_id, id));

        state.student(id).ok_or_else(|| DbError::student_not_found(id))
    }

    async fn update_student(
        &self,
        id: i64,
        expected_version: i32,
        changes: &StudentChanges,
        capacity: Option<usize>,
    ) -> Result<Student, DbError> {
        let mut state = self.state.write().await;

        let current_version = state
            .students
            .get(&id)
            .map(|s| s.version)
            .ok_or_else(|| DbError::student_not_found(id))?;

        if current_version != expected_version {
            return Err(DbError::StaleVersion {
                resource: "student",
                id: id.to_string(),
            });
        }

        state.check_student_keys(
            changes.national_id.as_ref().map(|n| n.as_str()),
            changes.email.as_ref().map(|e| e.as_str()),
            Some(id),
        )?;

        if let Some(group_ids) = &changes.group_ids {
            for &group_id in group_ids {
                let rejoining = state.enrollments.contains(&(group_id, id));
                state.require_room(group_id, if rejoining { None } else { capacity })?;
            }
        }

        if let Some(row) = state.students.get_mut(&id) {
            if let Some(name) = &changes.name {
                row.name = name.as_str().to_owned();
            }
            if let Some(national_id) = &changes.national_id {
                row.national_id = national_id.as_str().to_owned();
            }
            if let Some(email) = &changes.email {
                row.email = email.as_str().to_owned();
            }
            row.version += 1;
        }

        if let Some(group_ids) = &changes.group_ids {
            state.enrollments.retain(|(_, s)| *s != id);
            for &group_id in group_ids {
                state.enrollments.insert((group_id, id));
            }
        }

        state.student(id).ok_or_else(|| DbError::student_not_found(id))
    }

    async fn delete_student(&self, id: i64) -> Result<(), DbError> {
        let mut state = self.state.write().await;
        if state.students.remove(&id).is_none() {
            return Err(DbError::student_not_found(id));
        }
        state.enrollments.retain(|(_, s)| *s != id);
        Ok(())
    }

    async fn get_group(&self, id: i64) -> Result<ClassGroup, DbError> {
        self.state
            .read()
            .await
            .group(id)
            .ok_or_else(|| DbError::group_not_found(id))
    }

    async fn list_groups(&self, filter: &GroupFilter) -> Result<Vec<ClassGroup>, DbError> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .keys()
            .filter_map(|id| state.group(*id))
            .filter(|g| filter.matches(g))
            .collect())
    }

    async fn group_code_taken(&self, code: &GroupCode) -> Result<bool, DbError> {
        Ok(self
            .state
            .read()
            .await
            .groups
            .values()
            .any(|g| g.code == code.as_str()))
    }

    async fn insert_group(&self, group: &NewGroup) -> Result<ClassGroup, DbError> {
        let mut state = self.state.write().await;
        if state.groups.values().any(|g| g.code == group.code.as_str()) {
            return Err(unique(GROUP_CODE_KEY));
        }

        state.last_group_id += 1;
        let id = state.last_group_id;
        state.groups.insert(
            id,
            GroupRow {
                code: group.code.as_str().to_owned(),
                level: group.level.as_str().to_owned(),
            },
        );

        state.group(id).ok_or_else(|| DbError::group_not_found(id))
    }

    async fn enroll(
        &self,
        group_id: i64,
        student_id: i64,
        capacity: usize,
    ) -> Result<ClassGroup, DbError> {
        let mut state = self.state.write().await;

        state.require_room(group_id, Some(capacity))?;
        if !state.students.contains_key(&student_id) {
            return Err(DbError::student_not_found(student_id));
        }
        if !state.enrollments.insert((group_id, student_id)) {
            return Err(unique(ENROLLMENT_KEY));
        }

        state
            .group(group_id)
            .ok_or_else(|| DbError::group_not_found(group_id))
    }

    async fn delete_group(&self, id: i64) -> Result<(), DbError> {
        let mut state = self.state.write().await;
        if !state.groups.contains_key(&id) {
            return Err(DbError::group_not_found(id));
        }
        if state.member_count(id) > 0 {
            return Err(DbError::HasMembers { group_id: id });
        }
        state.groups.remove(&id);
        Ok(())
    }
}
