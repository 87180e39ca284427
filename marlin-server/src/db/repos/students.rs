//! Student repository
//!
//! - list/get: one LEFT JOIN query, rows folded into students with groups
//! - create: student row + first enrollment in one transaction
//! - update: version-guarded UPDATE, optional membership replacement

use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};

use super::groups::{ensure_room, lock_group};
use super::DbError;
use crate::models::{Email, GroupSummary, NationalId, NewStudent, Student, StudentChanges, StudentFilter};

/// Students joined with their groups; callers append WHERE and ORDER BY s.id, g.id
const STUDENT_SELECT: &str = r#"
    SELECT
        s.id,
        s.name,
        s.national_id,
        s.email,
        s.version,
        g.id AS group_id,
        g.code AS group_code,
        g.level AS group_level
    FROM students s
    LEFT JOIN enrollments e ON e.student_id = s.id
    LEFT JOIN class_groups g ON g.id = e.group_id
"#;

/// Collapse joined rows (ordered by student id) into students.
fn fold_rows(rows: Vec<PgRow>) -> Vec<Student> {
    let mut students: Vec<Student> = Vec::new();

    for r in rows {
        let id: i64 = r.get("id");
        if students.last().map(|s| s.id) != Some(id) {
            students.push(Student {
                id,
                name: r.get("name"),
                national_id: r.get("national_id"),
                email: r.get("email"),
                version: r.get("version"),
                groups: Vec::new(),
            });
        }

        if let Some(group_id) = r.get::<Option<i64>, _>("group_id") {
            if let Some(student) = students.last_mut() {
                student.groups.push(GroupSummary {
                    id: group_id,
                    code: r.get("group_code"),
                    level: r.get("group_level"),
                });
            }
        }
    }

    students
}

async fn fetch_student<'e, E>(executor: E, id: i64) -> Result<Student, DbError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("{STUDENT_SELECT} WHERE s.id = $1 ORDER BY s.id, g.id");
    let rows = sqlx::query(&sql).bind(id).fetch_all(executor).await?;

    fold_rows(rows)
        .into_iter()
        .next()
        .ok_or_else(|| DbError::student_not_found(id))
}

/// Student repository
pub struct StudentRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> StudentRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a single student with memberships.
    pub async fn get(&self, id: i64) -> Result<Student, DbError> {
        fetch_student(self.pool, id).await
    }

    /// List students matching every supplied filter, ordered by id.
    pub async fn list(&self, filter: &StudentFilter) -> Result<Vec<Student>, DbError> {
        let sql = format!(
            r#"{STUDENT_SELECT}
            WHERE ($1::text IS NULL OR strpos(s.name, $1) > 0)
              AND ($2::text IS NULL OR s.national_id = $2)
              AND ($3::text IS NULL OR strpos(s.email, $3) > 0)
              AND ($4::bigint IS NULL OR EXISTS (
                    SELECT 1 FROM enrollments f
                    WHERE f.student_id = s.id AND f.group_id = $4))
            ORDER BY s.id, g.id
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(filter.name.as_deref())
            .bind(filter.national_id.as_deref())
            .bind(filter.email.as_deref())
            .bind(filter.group_id)
            .fetch_all(self.pool)
            .await?;

        Ok(fold_rows(rows))
    }

    pub async fn find_by_national_id(
        &self,
        national_id: &NationalId,
    ) -> Result<Option<Student>, DbError> {
        let sql = format!("{STUDENT_SELECT} WHERE s.national_id = $1 ORDER BY s.id, g.id");
        let rows = sqlx::query(&sql)
            .bind(national_id.as_str())
            .fetch_all(self.pool)
            .await?;

        Ok(fold_rows(rows).into_iter().next())
    }

    /// Whether another student (not `except`) already holds this national ID.
    pub async fn national_id_taken(
        &self,
        national_id: &NationalId,
        except: Option<i64>,
    ) -> Result<bool, DbError> {
        let (taken,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM students
                WHERE national_id = $1 AND ($2::bigint IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(national_id.as_str())
        .bind(except)
        .fetch_one(self.pool)
        .await?;

        Ok(taken)
    }

    /// Whether another student (not `except`) already uses this email.
    pub async fn email_taken(&self, email: &Email, except: Option<i64>) -> Result<bool, DbError> {
        let (taken,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM students
                WHERE email = $1 AND ($2::bigint IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email.as_str())
        .bind(except)
        .fetch_one(self.pool)
        .await?;

        Ok(taken)
    }

    /// Insert a student already enrolled in `group_id` (atomic).
    ///
    /// The group row is locked before counting members, so two concurrent
    /// enrollments can't both take the last seat.
    pub async fn create_enrolled(
        &self,
        student: &NewStudent,
        group_id: i64,
        capacity: usize,
    ) -> Result<Student, DbError> {
        let mut tx = self.pool.begin().await?;

        lock_group(&mut *tx, group_id, Some(capacity)).await?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO students (name, national_id, email)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(student.name.as_str())
        .bind(student.national_id.as_str())
        .bind(student.email.as_str())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO enrollments (student_id, group_id) VALUES ($1, $2)")
            .bind(id)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        let created = fetch_student(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Apply changes if the stored version still equals `expected_version`.
    ///
    /// A replacement group list deletes every current enrollment and inserts
    /// the new set. With `capacity` set, groups the student is not already in
    /// must have room.
    ///
    /// Target groups are locked before the student row, the same order
    /// enrollment takes, so the two never wait on each other in a cycle.
    pub async fn update(
        &self,
        id: i64,
        expected_version: i32,
        changes: &StudentChanges,
        capacity: Option<usize>,
    ) -> Result<Student, DbError> {
        let mut tx = self.pool.begin().await?;

        if let Some(group_ids) = &changes.group_ids {
            for &group_id in group_ids {
                lock_group(&mut *tx, group_id, None).await?;
            }
        }

        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE students
            SET name = COALESCE($3, name),
                national_id = COALESCE($4, national_id),
                email = COALESCE($5, email),
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(changes.name.as_ref().map(|n| n.as_str()))
        .bind(changes.national_id.as_ref().map(|n| n.as_str()))
        .bind(changes.email.as_ref().map(|e| e.as_str()))
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            let (exists,): (bool,) =
                sqlx::query_as("SELECT EXISTS(SELECT 1 FROM students WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;

            return Err(if exists {
                DbError::StaleVersion {
                    resource: "student",
                    id: id.to_string(),
                }
            } else {
                DbError::student_not_found(id)
            });
        }

        if let Some(group_ids) = &changes.group_ids {
            let previous: Vec<(i64,)> = sqlx::query_as(
                "DELETE FROM enrollments WHERE student_id = $1 RETURNING group_id",
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

            for &group_id in group_ids {
                let rejoining = previous.iter().any(|(g,)| *g == group_id);
                if let (Some(capacity), false) = (capacity, rejoining) {
                    ensure_room(&mut *tx, group_id, capacity).await?;
                }

                sqlx::query("INSERT INTO enrollments (student_id, group_id) VALUES ($1, $2)")
                    .bind(id)
                    .bind(group_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let student = fetch_student(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(student)
    }

    /// Delete a student; enrollments cascade.
    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::student_not_found(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Integration tests - run with DATABASE_URL set
    // cargo test -p marlin-server -- --ignored

    use super::*;
    use crate::db::{create_pool, migrations};
    use crate::models::{GroupCode, GroupLevel, NewGroup, StudentName};
    use crate::db::repos::GroupRepo;

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url).await.expect("pool creation failed");
        migrations::run(&pool).await.expect("migrations failed");
        pool
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn stale_version_is_detected() {
        let pool = pool().await;
        let suffix = std::process::id() % 100_000;
        let group = GroupRepo::new(&pool)
            .insert(&NewGroup {
                code: GroupCode::new(&format!("STALE{}", suffix)).unwrap(),
                level: GroupLevel::new("Basic").unwrap(),
            })
            .await
            .unwrap();

        let repo = StudentRepo::new(&pool);
        let created = repo
            .create_enrolled(
                &NewStudent {
                    name: StudentName::new("Stale Writer").unwrap(),
                    national_id: NationalId::new(&format!("{:011}", 90_000_000_000u64 + suffix as u64)).unwrap(),
                    email: Email::new(&format!("stale{}@example.com", suffix)).unwrap(),
                },
                group.id,
                5,
            )
            .await
            .unwrap();

        let rename = StudentChanges {
            name: Some(StudentName::new("First").unwrap()),
            ..Default::default()
        };
        repo.update(created.id, created.version, &rename, None).await.unwrap();

        let err = repo
            .update(created.id, created.version, &rename, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StaleVersion { .. }));

        repo.delete(created.id).await.unwrap();
        GroupRepo::new(&pool).delete_if_empty(group.id).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires database"]
    async fn update_and_attach_to_same_group_do_not_deadlock() {
        let pool = pool().await;
        let suffix = std::process::id() % 100_000;
        let groups = GroupRepo::new(&pool);
        let home = groups
            .insert(&NewGroup {
                code: GroupCode::new(&format!("HOME{}", suffix)).unwrap(),
                level: GroupLevel::new("Basic").unwrap(),
            })
            .await
            .unwrap();
        let target = groups
            .insert(&NewGroup {
                code: GroupCode::new(&format!("TGT{}", suffix)).unwrap(),
                level: GroupLevel::new("Basic").unwrap(),
            })
            .await
            .unwrap();

        for round in 0..20u64 {
            let repo = StudentRepo::new(&pool);
            let student = repo
                .create_enrolled(
                    &NewStudent {
                        name: StudentName::new("Racer").unwrap(),
                        national_id: NationalId::new(&format!(
                            "{:011}",
                            80_000_000_000u64 + suffix as u64 * 100 + round
                        ))
                        .unwrap(),
                        email: Email::new(&format!("racer{}-{}@example.com", suffix, round)).unwrap(),
                    },
                    home.id,
                    5,
                )
                .await
                .unwrap();

            let changes = StudentChanges {
                email: Some(Email::new(&format!("moved{}-{}@example.com", suffix, round)).unwrap()),
                group_ids: Some(vec![target.id]),
                ..Default::default()
            };

            let (student_id, version, target_id) = (student.id, student.version, target.id);

            let update_pool = pool.clone();
            let update = tokio::spawn(async move {
                StudentRepo::new(&update_pool)
                    .update(student_id, version, &changes, Some(5))
                    .await
            });
            let attach_pool = pool.clone();
            let attach = tokio::spawn(async move {
                GroupRepo::new(&attach_pool).enroll(target_id, student_id, 5).await
            });

            let update = update.await.unwrap();
            let attach = attach.await.unwrap();
            assert!(
                !matches!(update, Err(DbError::Sqlx(_)) | Err(DbError::Contention { .. })),
                "update: {:?}",
                update.err()
            );
            assert!(
                !matches!(attach, Err(DbError::Sqlx(_)) | Err(DbError::Contention { .. })),
                "attach: {:?}",
                attach.err()
            );

            StudentRepo::new(&pool).delete(student_id).await.unwrap();
        }

        groups.delete_if_empty(home.id).await.unwrap();
        groups.delete_if_empty(target.id).await.unwrap();
    }
}
