//! Schema creation for students, class groups and enrollments
//!
//! Idempotent: every statement uses IF NOT EXISTS, so it runs on each startup.

use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS class_groups (
        id BIGSERIAL PRIMARY KEY,
        code VARCHAR(32) NOT NULL,
        level VARCHAR(64) NOT NULL,
        CONSTRAINT class_groups_code_key UNIQUE (code)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS students (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(200) NOT NULL CHECK (name <> ''),
        national_id TEXT NOT NULL CHECK (national_id ~ '^[0-9]{11}$'),
        email VARCHAR(254) NOT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        CONSTRAINT students_national_id_key UNIQUE (national_id),
        CONSTRAINT students_email_key UNIQUE (email)
    )
    "#,
    // Pure link table. Removing a student drops its enrollments; a group
    // with enrollments can't be removed.
    r#"
    CREATE TABLE IF NOT EXISTS enrollments (
        student_id BIGINT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
        group_id BIGINT NOT NULL REFERENCES class_groups(id) ON DELETE RESTRICT,
        CONSTRAINT enrollments_pkey PRIMARY KEY (student_id, group_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS enrollments_group_id_idx ON enrollments (group_id)",
];

/// Run all schema migrations
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running enrollment schema migrations...");

    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Migrations complete");
    Ok(())
}
