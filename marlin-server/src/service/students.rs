//! Student lifecycle operations and the shared intake rule

use super::error::{ALREADY_ENROLLED, EMAIL_TAKEN, NATIONAL_ID_TAKEN};
use super::{EnrollmentService, IntakeMode, IntakeOutcome, ServiceError, StudentIntake};
use crate::models::{
    Email, NationalId, NewStudent, Student, StudentChanges, StudentFilter, StudentName,
    StudentPatch,
};

impl EnrollmentService {
    /// Create a student enrolled in `group_id`.
    pub async fn create_student(
        &self,
        intake: &StudentIntake,
        group_id: i64,
    ) -> Result<Student, ServiceError> {
        let outcome = self
            .create_or_attach_student(group_id, intake, IntakeMode::Enroll)
            .await?;
        Ok(outcome.student)
    }

    /// The one student-intake rule behind both creating a student and adding
    /// one to a group. Capacity and field formats apply in every mode; only the
    /// handling of an already registered national ID differs.
    pub(crate) async fn create_or_attach_student(
        &self,
        group_id: i64,
        intake: &StudentIntake,
        mode: IntakeMode,
    ) -> Result<IntakeOutcome, ServiceError> {
        let name = StudentName::new(&intake.name)?;
        let national_id = NationalId::new(&intake.national_id)?;
        let email = match mode {
            IntakeMode::Enroll => Some(Email::new(intake.email.as_deref().unwrap_or(""))?),
            IntakeMode::Attach => None,
        };

        let existing = self.store.find_student_by_national_id(&national_id).await?;

        if mode == IntakeMode::Enroll {
            if existing.is_some() {
                return Err(ServiceError::Conflict(NATIONAL_ID_TAKEN.to_owned()));
            }
            if let Some(email) = &email {
                if self.store.email_taken(email, None).await? {
                    return Err(ServiceError::Conflict(EMAIL_TAKEN.to_owned()));
                }
            }
        }

        let group = self.store.get_group(group_id).await?;
        if group.has_member(national_id.as_str()) {
            return Err(ServiceError::Conflict(ALREADY_ENROLLED.to_owned()));
        }

        let capacity = self.policy.group_capacity;
        if group.member_count() >= capacity {
            tracing::warn!(group_id, capacity, "enrollment rejected, group is full");
            return Err(ServiceError::capacity(group_id, capacity));
        }

        if let Some(student) = existing {
            self.store.enroll(group_id, student.id, capacity).await?;
            tracing::info!(student_id = student.id, group_id, "attached existing student");
            return Ok(IntakeOutcome {
                student: self.store.get_student(student.id).await?,
                created: false,
            });
        }

        let email = match email {
            Some(email) => email,
            None => {
                let email = Email::new(intake.email.as_deref().unwrap_or(""))?;
                if self.store.email_taken(&email, None).await? {
                    return Err(ServiceError::Conflict(EMAIL_TAKEN.to_owned()));
                }
                email
            }
        };

        let student = self
            .store
            .create_enrolled_student(
                &NewStudent {
                    name,
                    national_id,
                    email,
                },
                group_id,
                capacity,
            )
            .await?;

        tracing::info!(student_id = student.id, group_id, "student enrolled");
        Ok(IntakeOutcome {
            student,
            created: true,
        })
    }

    /// List students matching every supplied filter.
    pub async fn list_students(&self, filter: &StudentFilter) -> Result<Vec<Student>, ServiceError> {
        Ok(self.store.list_students(filter).await?)
    }

    pub async fn get_student(&self, id: i64) -> Result<Student, ServiceError> {
        Ok(self.store.get_student(id).await?)
    }

    /// Apply a partial update. Only supplied fields are validated.
    ///
    /// A non-empty `group_ids` replaces every membership; an empty list is
    /// ignored.
    pub async fn update_student(&self, id: i64, patch: StudentPatch) -> Result<Student, ServiceError> {
        let current = self.store.get_student(id).await?;

        let mut changes = StudentChanges::default();
        if let Some(raw) = &patch.national_id {
            changes.national_id = Some(NationalId::new(raw)?);
        }
        if let Some(raw) = &patch.email {
            changes.email = Some(Email::new(raw)?);
        }
        if let Some(raw) = &patch.name {
            changes.name = Some(StudentName::new(raw)?);
        }

        if let Some(national_id) = &changes.national_id {
            if self.store.national_id_taken(national_id, Some(id)).await? {
                return Err(ServiceError::Conflict(NATIONAL_ID_TAKEN.to_owned()));
            }
        }
        if let Some(email) = &changes.email {
            if self.store.email_taken(email, Some(id)).await? {
                return Err(ServiceError::Conflict(EMAIL_TAKEN.to_owned()));
            }
        }

        let capacity = self
            .policy
            .check_capacity_on_replace
            .then_some(self.policy.group_capacity);

        if let Some(group_ids) = patch.group_ids.filter(|ids| !ids.is_empty()) {
            // Existence in the order given, so the first missing id is reported
            let mut groups = Vec::with_capacity(group_ids.len());
            for group_id in &group_ids {
                groups.push(self.store.get_group(*group_id).await?);
            }

            if let Some(capacity) = capacity {
                for group in &groups {
                    let joining = !current.groups.iter().any(|g| g.id == group.id);
                    if joining && group.member_count() >= capacity {
                        return Err(ServiceError::capacity(group.id, capacity));
                    }
                }
            }

            // Ascending order keeps group row locks in a consistent order
            let mut ids: Vec<i64> = groups.iter().map(|g| g.id).collect();
            ids.sort_unstable();
            ids.dedup();
            changes.group_ids = Some(ids);
        }

        if changes.is_empty() {
            return Ok(current);
        }

        let updated = self
            .store
            .update_student(id, current.version, &changes, capacity)
            .await
            .map_err(|e| {
                let err = ServiceError::from(e);
                if matches!(err, ServiceError::StaleWrite { .. }) {
                    tracing::warn!(student_id = id, "concurrent update detected");
                }
                err
            })?;

        tracing::info!(student_id = id, version = updated.version, "student updated");
        Ok(updated)
    }

    /// Delete a student once the caller proves it knows the national ID.
    pub async fn delete_student(&self, id: i64, national_id: &str) -> Result<Student, ServiceError> {
        let student = self.store.get_student(id).await?;

        if !student.has_national_id(national_id) {
            return Err(ServiceError::InvalidInput(
                "the national ID supplied does not match the student's record".to_owned(),
            ));
        }

        self.store.delete_student(id).await?;
        tracing::info!(student_id = id, "student deleted");
        Ok(student)
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

    async fn group(svc: &EnrollmentService, code: &str) -> i64 {
        svc.create_group(code, "Basic").await.unwrap().id
    }

    #[tokio::test]
    async fn create_rejects_bad_formats() {
        let svc = service();
        let g = group(&svc, "A1").await;

        let mut bad_id = intake(1);
        bad_id.national_id = "123.456".into();
        assert!(matches!(
            svc.create_student(&bad_id, g).await.unwrap_err(),
            ServiceError::Validation(_)
        ));

        let mut bad_email = intake(1);
        bad_email.email = Some("not-an-email".into());
        assert!(matches!(
            svc.create_student(&bad_email, g).await.unwrap_err(),
            ServiceError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_national_id_any_format() {
        let svc = service();
        let g = group(&svc, "A1").await;

        let mut first = intake(1);
        first.national_id = "123.456.789-09".into();
        svc.create_student(&first, g).await.unwrap();

        let mut second = intake(2);
        second.national_id = "12345678909".into();
        let err = svc.create_student(&second, g).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m == NATIONAL_ID_TAKEN));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let svc = service();
        let g = group(&svc, "A1").await;
        svc.create_student(&intake(1), g).await.unwrap();

        let mut other = intake(2);
        other.email = intake(1).email;
        let err = svc.create_student(&other, g).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m == EMAIL_TAKEN));
    }

    #[tokio::test]
    async fn unknown_group_is_not_found() {
        let svc = service();
        let err = svc.create_student(&intake(1), 42).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { resource: "group", .. }));
    }

    #[tokio::test]
    async fn fifth_succeeds_sixth_conflicts() {
        let svc = service();
        let g = group(&svc, "A1").await;
        for n in 1..=5 {
            svc.create_student(&intake(n), g).await.unwrap();
        }

        let err = svc.create_student(&intake(6), g).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m.contains("maximum of 5")));
        assert_eq!(svc.get_group(g).await.unwrap().member_count(), 5);
    }

    #[tokio::test]
    async fn partial_update_touches_only_supplied_fields() {
        let svc = service();
        let g = group(&svc, "A1").await;
        let s = svc.create_student(&intake(1), g).await.unwrap();

        let updated = svc
            .update_student(
                s.id,
                StudentPatch {
                    name: Some("Ana Souza".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Ana Souza");
        assert_eq!(updated.email, s.email);
        assert_eq!(updated.national_id, s.national_id);
        assert_eq!(updated.groups, s.groups);
    }

    #[tokio::test]
    async fn explicit_empty_value_is_invalid() {
        let svc = service();
        let g = group(&svc, "A1").await;
        let s = svc.create_student(&intake(1), g).await.unwrap();

        let err = svc
            .update_student(
                s.id,
                StudentPatch {
                    email: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn update_may_keep_own_email() {
        let svc = service();
        let g = group(&svc, "A1").await;
        let s = svc.create_student(&intake(1), g).await.unwrap();

        let updated = svc
            .update_student(
                s.id,
                StudentPatch {
                    email: Some(s.email.clone()),
                    national_id: Some("000.000.000-01".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.national_id, "00000000001");
    }

    #[tokio::test]
    async fn update_conflicts_with_other_student() {
        let svc = service();
        let g = group(&svc, "A1").await;
        let a = svc.create_student(&intake(1), g).await.unwrap();
        let b = svc.create_student(&intake(2), g).await.unwrap();

        let err = svc
            .update_student(
                b.id,
                StudentPatch {
                    national_id: Some(a.national_id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m == NATIONAL_ID_TAKEN));
    }

    #[tokio::test]
    async fn replace_groups_reports_first_missing() {
        let svc = service();
        let a1 = group(&svc, "A1").await;
        let b1 = group(&svc, "B1").await;
        let s = svc.create_student(&intake(1), a1).await.unwrap();

        let err = svc
            .update_student(
                s.id,
                StudentPatch {
                    name: Some("Changed".into()),
                    group_ids: Some(vec![b1, 77, 88]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { ref id, .. } if id == "77"));

        // nothing was written
        let after = svc.get_student(s.id).await.unwrap();
        assert_eq!(after.name, s.name);
        assert_eq!(after.groups.len(), 1);
        assert_eq!(after.groups[0].id, a1);
    }

    #[tokio::test]
    async fn replace_groups_wholesale() {
        let svc = service();
        let a1 = group(&svc, "A1").await;
        let b1 = group(&svc, "B1").await;
        let c1 = group(&svc, "C1").await;
        let s = svc.create_student(&intake(1), a1).await.unwrap();

        let updated = svc
            .update_student(
                s.id,
                StudentPatch {
                    group_ids: Some(vec![c1, b1, c1]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let ids: Vec<i64> = updated.groups.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![b1, c1]);
        assert!(svc.get_group(a1).await.unwrap().students.is_empty());
    }

    #[tokio::test]
    async fn empty_group_list_is_ignored() {
        let svc = service();
        let a1 = group(&svc, "A1").await;
        let s = svc.create_student(&intake(1), a1).await.unwrap();

        let same = svc
            .update_student(
                s.id,
                StudentPatch {
                    group_ids: Some(vec![]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(same, s);
    }

    #[tokio::test]
    async fn replace_groups_respects_capacity() {
        let svc = service();
        let full = group(&svc, "FULL").await;
        let home = group(&svc, "HOME").await;
        for n in 1..=5 {
            svc.create_student(&intake(n), full).await.unwrap();
        }
        let s = svc.create_student(&intake(6), home).await.unwrap();

        let err = svc
            .update_student(
                s.id,
                StudentPatch {
                    group_ids: Some(vec![full]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // a member of a full group may keep it in its new list
        let member = svc
            .list_students(&StudentFilter {
                group_id: Some(full),
                ..Default::default()
            })
            .await
            .unwrap()
            .remove(0);
        let kept = svc
            .update_student(
                member.id,
                StudentPatch {
                    group_ids: Some(vec![full, home]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(kept.groups.len(), 2);
    }

    #[tokio::test]
    async fn replace_groups_can_skip_capacity() {
        let svc = EnrollmentService::new(
            Arc::new(InMemoryStore::new()),
            EnrollmentPolicy {
                group_capacity: 1,
                check_capacity_on_replace: false,
            },
        );
        let full = group(&svc, "FULL").await;
        let home = group(&svc, "HOME").await;
        svc.create_student(&intake(1), full).await.unwrap();
        let s = svc.create_student(&intake(2), home).await.unwrap();

        let moved = svc
            .update_student(
                s.id,
                StudentPatch {
                    group_ids: Some(vec![full]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.groups[0].id, full);
        assert_eq!(svc.get_group(full).await.unwrap().member_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_enrollments_never_overfill_a_group() {
        let svc = service();
        let g = group(&svc, "A1").await;

        let handles: Vec<_> = (1..=20)
            .map(|n| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.create_student(&intake(n), g).await })
            })
            .collect();

        let mut enrolled = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => enrolled += 1,
                Err(ServiceError::Conflict(m)) => assert!(m.contains("maximum of 5"), "{}", m),
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(enrolled, 5);
        assert_eq!(svc.get_group(g).await.unwrap().member_count(), 5);
        assert_eq!(svc.list_students(&StudentFilter::default()).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn delete_requires_matching_national_id() {
        let svc = service();
        let g = group(&svc, "A1").await;
        let s = svc.create_student(&intake(1), g).await.unwrap();

        let err = svc.delete_student(s.id, "99999999999").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert!(svc.get_student(s.id).await.is_ok());

        svc.delete_student(s.id, "000.000.000-01").await.unwrap();
        assert!(matches!(
            svc.get_student(s.id).await.unwrap_err(),
            ServiceError::NotFound { .. }
        ));
        assert!(svc.get_group(g).await.unwrap().students.is_empty());
    }

    #[tokio::test]
    async fn listing_is_stable() {
        let svc = service();
        let g = group(&svc, "A1").await;
        for n in 1..=3 {
            svc.create_student(&intake(n), g).await.unwrap();
        }

        let first = svc.list_students(&StudentFilter::default()).await.unwrap();
        let second = svc.list_students(&StudentFilter::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
