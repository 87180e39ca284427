//! Class group lifecycle operations

use super::error::{CODE_TAKEN, GROUP_NOT_EMPTY};
use super::{EnrollmentService, IntakeMode, IntakeOutcome, ServiceError, StudentIntake};
use crate::models::{ClassGroup, GroupCode, GroupFilter, GroupLevel, NewGroup};

impl EnrollmentService {
    /// Create a group with a unique code.
    pub async fn create_group(&self, code: &str, level: &str) -> Result<ClassGroup, ServiceError> {
        let group = NewGroup {
            code: GroupCode::new(code)?,
            level: GroupLevel::new(level)?,
        };

        if self.store.group_code_taken(&group.code).await? {
            return Err(ServiceError::Conflict(CODE_TAKEN.to_owned()));
        }

        let created = self.store.insert_group(&group).await?;
        tracing::info!(group_id = created.id, code = %created.code, "group created");
        Ok(created)
    }

    /// Add a student to a group, reusing the record when the national ID is
    /// already registered.
    pub async fn add_student_to_group(
        &self,
        group_id: i64,
        intake: &StudentIntake,
    ) -> Result<IntakeOutcome, ServiceError> {
        self.create_or_attach_student(group_id, intake, IntakeMode::Attach)
            .await
    }

    /// List groups matching every supplied filter.
    pub async fn list_groups(&self, filter: &GroupFilter) -> Result<Vec<ClassGroup>, ServiceError> {
        Ok(self.store.list_groups(filter).await?)
    }

    pub async fn get_group(&self, id: i64) -> Result<ClassGroup, ServiceError> {
        Ok(self.store.get_group(id).await?)
    }

    /// Delete an empty group once the caller confirms its code.
    pub async fn delete_group(&self, id: i64, code: Option<&str>) -> Result<(), ServiceError> {
        let code = code.map(str::trim).filter(|c| !c.is_empty()).ok_or_else(|| {
            ServiceError::InvalidInput("the group code is required to delete a group".to_owned())
        })?;

        let group = self.store.get_group(id).await?;

        if group.code != code {
            return Err(ServiceError::Conflict(
                "the code supplied does not match the group's code".to_owned(),
            ));
        }

        if group.member_count() > 0 {
            return Err(ServiceError::Conflict(GROUP_NOT_EMPTY.to_owned()));
        }

        self.store.delete_group(id).await?;
        tracing::info!(group_id = id, "group deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::InMemoryStore;
    use crate::service::EnrollmentPolicy;

    fn service() -> EnrollmentService {
        EnrollmentService::new(Arc::new(InMemoryStore::new()), EnrollmentPolicy::default())
    }

    fn intake(n: u32) -> StudentIntake {
        StudentIntake {
            name: format!("Student {}", n),
            national_id: format!("{:011}", n),
            email: Some(format!("s{}@example.com", n)),
        }
    }

    #[tokio::test]
    async fn create_group_requires_fields() {
        let svc = service();
        assert!(matches!(
            svc.create_group("", "Basic").await.unwrap_err(),
            ServiceError::Validation(_)
        ));
        assert!(matches!(
            svc.create_group("A1", "").await.unwrap_err(),
            ServiceError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_code_conflicts() {
        let svc = service();
        svc.create_group("A1", "Basic").await.unwrap();
        let err = svc.create_group("A1", "Advanced").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m == CODE_TAKEN));
    }

    #[tokio::test]
    async fn attach_reuses_existing_student() {
        let svc = service();
        let a1 = svc.create_group("A1", "Basic").await.unwrap().id;
        let b1 = svc.create_group("B1", "Basic").await.unwrap().id;

        let first = svc.add_student_to_group(a1, &intake(1)).await.unwrap();
        assert!(first.created);

        let mut differing = intake(1);
        differing.name = "Someone Else".into();
        differing.email = None;
        let second = svc.add_student_to_group(b1, &differing).await.unwrap();

        assert!(!second.created);
        assert_eq!(second.student.id, first.student.id);
        assert_eq!(second.student.name, "Student 1");
        assert_eq!(second.student.groups.len(), 2);
    }

    #[tokio::test]
    async fn attach_twice_conflicts() {
        let svc = service();
        let a1 = svc.create_group("A1", "Basic").await.unwrap().id;
        svc.add_student_to_group(a1, &intake(1)).await.unwrap();

        let err = svc.add_student_to_group(a1, &intake(1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn attach_new_student_needs_email() {
        let svc = service();
        let a1 = svc.create_group("A1", "Basic").await.unwrap().id;

        let mut no_email = intake(1);
        no_email.email = None;
        assert!(matches!(
            svc.add_student_to_group(a1, &no_email).await.unwrap_err(),
            ServiceError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn attach_checks_name_and_group() {
        let svc = service();
        let mut nameless = intake(1);
        nameless.name = String::new();
        assert!(matches!(
            svc.add_student_to_group(1, &nameless).await.unwrap_err(),
            ServiceError::Validation(_)
        ));
        assert!(matches!(
            svc.add_student_to_group(1, &intake(1)).await.unwrap_err(),
            ServiceError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn attach_respects_capacity() {
        let svc = service();
        let a1 = svc.create_group("A1", "Basic").await.unwrap().id;
        for n in 1..=5 {
            svc.add_student_to_group(a1, &intake(n)).await.unwrap();
        }
        let err = svc.add_student_to_group(a1, &intake(6)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_group_rules() {
        let svc = service();
        let a1 = svc.create_group("A1", "Basic").await.unwrap().id;
        let enrolled = svc.add_student_to_group(a1, &intake(1)).await.unwrap();

        assert!(matches!(
            svc.delete_group(a1, None).await.unwrap_err(),
            ServiceError::InvalidInput(_)
        ));
        assert!(matches!(
            svc.delete_group(a1, Some("B1")).await.unwrap_err(),
            ServiceError::Conflict(_)
        ));
        assert!(matches!(
            svc.delete_group(a1, Some("A1")).await.unwrap_err(),
            ServiceError::Conflict(ref m) if m == GROUP_NOT_EMPTY
        ));

        svc.delete_student(enrolled.student.id, &enrolled.student.national_id)
            .await
            .unwrap();
        svc.delete_group(a1, Some("A1")).await.unwrap();
        assert!(svc.list_groups(&GroupFilter::default()).await.unwrap().is_empty());
        assert!(matches!(
            svc.delete_group(a1, Some("A1")).await.unwrap_err(),
            ServiceError::NotFound { .. }
        ));
    }
}
