use crate::{
    error::{Error, ErrorKind, QueryError},
    form::TagForm,
    schema::{Id, Tag},
    seed::parse_rows,
};

use sqlx::{Pool, Sqlite};

pub const CSV_COLUMNS: &[&str] = &["name", "color", "slug"];

pub async fn list_tags(pool: &Pool<Sqlite>) -> Result<Vec<Tag>, Error> {
    let list: Vec<Tag> = sqlx::query_as("SELECT id, name, color, slug FROM tags ORDER BY id")
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn get_tag(id: Id, pool: &Pool<Sqlite>) -> Result<Tag, Error> {
    let tag: Option<Tag> = sqlx::query_as("SELECT id, name, color, slug FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    tag.ok_or_else(|| ErrorKind::NotFound.default())
}

pub async fn create_tag(form: TagForm, pool: &Pool<Sqlite>) -> Result<Tag, Error> {
    let tag = form.validate()?;

    let row: Option<Tag> = sqlx::query_as(
        "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING RETURNING id, name, color, slug",
    )
    .bind(&tag.name)
    .bind(&tag.color)
    .bind(&tag.slug)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    row.ok_or_else(|| ErrorKind::Conflict.new("Tag with this name, color or slug already exists."))
}

/// Loads `name,color,slug` rows, validating each one. Existing tags are skipped.
pub async fn import_csv(text: &str, pool: &Pool<Sqlite>) -> Result<u64, Error> {
    let rows = parse_rows(text, CSV_COLUMNS)?;

    let tags = rows
        .into_iter()
        .map(|row| {
            let mut row = row.into_iter();
            TagForm {
                name: row.next(),
                color: row.next(),
                slug: row.next(),
            }
            .validate()
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let mut tx = pool.begin().await.map_err(QueryError::from)?;
    let mut inserted = 0;

    for tag in tags.iter() {
        let result = sqlx::query(
            "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(&tag.name)
        .bind(&tag.color)
        .bind(&tag.slug)
        .execute(&mut *tx)
        .await
        .map_err(QueryError::from)?;

        inserted += result.rows_affected();
    }

    tx.commit().await.map_err(QueryError::from)?;
    log::info!("Imported {inserted} new tags");

    Ok(inserted)
}
