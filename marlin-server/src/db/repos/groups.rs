//! Class group repository
//!
//! Every write that adds or removes members locks the group row first
//! (`SELECT ... FOR UPDATE`), which serializes capacity checks per group.

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgExecutor, PgPool, Row};

use super::DbError;
use crate::models::{ClassGroup, GroupCode, GroupFilter, NewGroup, StudentSummary};

/// Groups joined with their students; callers append WHERE and ORDER BY g.id, s.id
const GROUP_SELECT: &str = r#"
    SELECT
        g.id,
        g.code,
        g.level,
        s.id AS student_id,
        s.name AS student_name,
        s.national_id AS student_national_id,
        s.email AS student_email
    FROM class_groups g
    LEFT JOIN enrollments e ON e.group_id = g.id
    LEFT JOIN students s ON s.id = e.student_id
"#;

fn fold_rows(rows: Vec<PgRow>) -> Vec<ClassGroup> {
    let mut groups: Vec<ClassGroup> = Vec::new();

    for r in rows {
        let id: i64 = r.get("id");
        if groups.last().map(|g| g.id) != Some(id) {
            groups.push(ClassGroup {
                id,
                code: r.get("code"),
                level: r.get("level"),
                students: Vec::new(),
            });
        }

        if let Some(student_id) = r.get::<Option<i64>, _>("student_id") {
            if let Some(group) = groups.last_mut() {
                group.students.push(StudentSummary {
                    id: student_id,
                    name: r.get("student_name"),
                    national_id: r.get("student_national_id"),
                    email: r.get("student_email"),
                });
            }
        }
    }

    groups
}

async fn fetch_group<'e, E>(executor: E, id: i64) -> Result<ClassGroup, DbError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("{GROUP_SELECT} WHERE g.id = $1 ORDER BY g.id, s.id");
    let rows = sqlx::query(&sql).bind(id).fetch_all(executor).await?;

    fold_rows(rows)
        .into_iter()
        .next()
        .ok_or_else(|| DbError::group_not_found(id))
}

/// Lock a group row for the rest of the transaction.
///
/// With `capacity` set, also fails with `CapacityExceeded` when the group
/// already holds that many students.
pub(crate) async fn lock_group(
    conn: &mut PgConnection,
    group_id: i64,
    capacity: Option<usize>,
) -> Result<(), DbError> {
    let locked: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM class_groups WHERE id = $1 FOR UPDATE")
            .bind(group_id)
            .fetch_optional(&mut *conn)
            .await?;

    if locked.is_none() {
        return Err(DbError::group_not_found(group_id));
    }

    match capacity {
        Some(capacity) => ensure_room(conn, group_id, capacity).await,
        None => Ok(()),
    }
}

/// Fail with `CapacityExceeded` when the group already holds `capacity`
/// students. Only meaningful while the group row is locked.
pub(crate) async fn ensure_room(
    conn: &mut PgConnection,
    group_id: i64,
    capacity: usize,
) -> Result<(), DbError> {
    let (members,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM enrollments WHERE group_id = $1")
            .bind(group_id)
            .fetch_one(&mut *conn)
            .await?;

    if members as usize >= capacity {
        return Err(DbError::CapacityExceeded { group_id, capacity });
    }
    Ok(())
}

/// Class group repository
pub struct GroupRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> GroupRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a single group with its students.
    pub async fn get(&self, id: i64) -> Result<ClassGroup, DbError> {
        fetch_group(self.pool, id).await
    }

    /// List groups matching every supplied filter, ordered by id.
    pub async fn list(&self, filter: &GroupFilter) -> Result<Vec<ClassGroup>, DbError> {
        let sql = format!(
            r#"{GROUP_SELECT}
            WHERE ($1::text IS NULL OR strpos(g.code, $1) > 0)
              AND ($2::text IS NULL OR strpos(g.level, $2) > 0)
              AND ($3::bigint IS NULL OR EXISTS (
                    SELECT 1 FROM enrollments f
                    WHERE f.group_id = g.id AND f.student_id = $3))
            ORDER BY g.id, s.id
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(filter.code.as_deref())
            .bind(filter.level.as_deref())
            .bind(filter.student_id)
            .fetch_all(self.pool)
            .await?;

        Ok(fold_rows(rows))
    }

    pub async fn code_taken(&self, code: &GroupCode) -> Result<bool, DbError> {
        let (taken,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM class_groups WHERE code = $1)")
                .bind(code.as_str())
                .fetch_one(self.pool)
                .await?;

        Ok(taken)
    }

    /// Insert a group. A duplicate code surfaces as `UniqueViolation`.
    pub async fn insert(&self, group: &NewGroup) -> Result<ClassGroup, DbError> {
        let row = sqlx::query(
            r#"
            INSERT INTO class_groups (code, level)
            VALUES ($1, $2)
            RETURNING id, code, level
            "#,
        )
        .bind(group.code.as_str())
        .bind(group.level.as_str())
        .fetch_one(self.pool)
        .await?;

        Ok(ClassGroup {
            id: row.get("id"),
            code: row.get("code"),
            level: row.get("level"),
            students: Vec::new(),
        })
    }

    /// Enroll an existing student, respecting capacity (atomic).
    pub async fn enroll(
        &self,
        group_id: i64,
        student_id: i64,
        capacity: usize,
    ) -> Result<ClassGroup, DbError> {
        let mut tx = self.pool.begin().await?;

        lock_group(&mut *tx, group_id, Some(capacity)).await?;

        sqlx::query("INSERT INTO enrollments (student_id, group_id) VALUES ($1, $2)")
            .bind(student_id)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        let group = fetch_group(&mut *tx, group_id).await?;
        tx.commit().await?;
        Ok(group)
    }

    /// Delete a group only while it has no students.
    pub async fn delete_if_empty(&self, id: i64) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        lock_group(&mut *tx, id, None).await?;

        let (members,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM enrollments WHERE group_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        if members > 0 {
            return Err(DbError::HasMembers { group_id: id });
        }

        sqlx::query("DELETE FROM class_groups WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, migrations};

    #[tokio::test]
    #[ignore = "requires database"]
    async fn duplicate_code_is_unique_violation() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url).await.expect("pool creation failed");
        migrations::run(&pool).await.expect("migrations failed");

        let repo = GroupRepo::new(&pool);
        let group = NewGroup {
            code: GroupCode::new(&format!("DUP{}", std::process::id())).unwrap(),
            level: crate::models::GroupLevel::new("Basic").unwrap(),
        };
        let created = repo.insert(&group).await.unwrap();

        let err = repo.insert(&group).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::UniqueViolation { ref constraint } if constraint == super::super::GROUP_CODE_KEY
        ));

        repo.delete_if_empty(created.id).await.unwrap();
    }
}
