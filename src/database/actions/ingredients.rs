use crate::{
    error::{Error, ErrorKind, QueryError},
    form::IngredientForm,
    schema::{Id, Ingredient},
    seed::parse_rows,
};

use sqlx::{Pool, Sqlite};

pub const CSV_COLUMNS: &[&str] = &["name", "measurement_unit"];

/// Whole catalog, or the names containing `name` (case-insensitive) with prefix matches first.
pub async fn list_ingredients(
    name: Option<&str>,
    pool: &Pool<Sqlite>,
) -> Result<Vec<Ingredient>, Error> {
    let search = name
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty());

    let rows: Vec<Ingredient> = sqlx::query_as(
        "
        SELECT id, name, measurement_unit
        FROM ingredients
        WHERE $1 IS NULL OR instr(name_lower, $1) > 0
        ORDER BY CASE WHEN instr(name_lower, $1) = 1 THEN 0 ELSE 1 END, name_lower, id
    ",
    )
    .bind(search)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Sqlite>) -> Result<Ingredient, Error> {
    let row: Option<Ingredient> =
        sqlx::query_as("SELECT id, name, measurement_unit FROM ingredients WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    row.ok_or_else(|| ErrorKind::NotFound.default())
}

pub async fn create_ingredient(
    form: IngredientForm,
    pool: &Pool<Sqlite>,
) -> Result<Ingredient, Error> {
    let (name, unit) = form.validate()?;

    let row: Option<Ingredient> = sqlx::query_as(
        "
        INSERT INTO ingredients (name, name_lower, measurement_unit)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        RETURNING id, name, measurement_unit
    ",
    )
    .bind(&name)
    .bind(name.to_lowercase())
    .bind(&unit)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    row.ok_or_else(|| ErrorKind::Conflict.new("Ingredient with this name and unit already exists."))
}

/// Loads `name,measurement_unit` rows. Pairs already in the catalog are skipped.
/// Returns the number of new ingredients.
pub async fn import_csv(text: &str, pool: &Pool<Sqlite>) -> Result<u64, Error> {
    let rows = parse_rows(text, CSV_COLUMNS)?;

    let mut tx = pool.begin().await.map_err(QueryError::from)?;
    let mut inserted = 0;

    for row in rows.iter() {
        let (name, unit) = (&row[0], &row[1]);

        let result = sqlx::query(
            "INSERT INTO ingredients (name, name_lower, measurement_unit) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(name)
        .bind(name.to_lowercase())
        .bind(unit)
        .execute(&mut *tx)
        .await
        .map_err(QueryError::from)?;

        inserted += result.rows_affected();
    }

    tx.commit().await.map_err(QueryError::from)?;
    log::info!(
        "Imported {inserted} new ingredients ({} rows read)",
        rows.len()
    );

    Ok(inserted)
}
