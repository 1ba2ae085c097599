use sqlx::PgPool;

use crate::db::models::Exam;

pub(crate) const COLUMNS: &str = "\
    id, title, description, duration_minutes, status, created_by, \
    created_at, updated_at, published_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}
