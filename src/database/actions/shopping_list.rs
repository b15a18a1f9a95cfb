use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    constants::SHOPPING_LIST_FORMATS,
    error::{Error, ErrorKind, QueryError},
    schema::{Id, ShoppingListItem},
};

use sqlx::{Pool, Sqlite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShoppingListFormat {
    Text,
    Csv,
}

impl ShoppingListFormat {
    /// `txt` when absent.
    pub fn from_query(value: Option<&str>) -> Result<Self, Error> {
        match value.map(str::trim) {
            None | Some("") | Some("txt") => Ok(Self::Text),
            Some("csv") => Ok(Self::Csv),
            Some(other) => {
                let known: Vec<&str> = SHOPPING_LIST_FORMATS.iter().map(|(ext, _)| *ext).collect();
                Err(ErrorKind::Validation.field(
                    "format",
                    &format!("Unknown format {other}, expected one of: {}", known.join(", ")),
                ))
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        SHOPPING_LIST_FORMATS
            .iter()
            .find(|(ext, _)| *ext == self.extension())
            .map(|(_, mime)| *mime)
            .unwrap_or("application/octet-stream")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShoppingListExport {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

/// Every ingredient row of every recipe in the cart, summed per ingredient and ordered by name.
pub async fn fetch_shopping_list(
    user_id: Id,
    pool: &Pool<Sqlite>,
) -> Result<Vec<ShoppingListItem>, Error> {
    let rows: Vec<ShoppingListItem> = sqlx::query_as(
        "
        SELECT i.name, i.measurement_unit, SUM(ri.amount) AS amount
        FROM shopping_carts c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
        GROUP BY i.id, i.name, i.measurement_unit
        ORDER BY i.name, i.id
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

fn csv_field(value: &str) -> String {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn render_shopping_list(
    username: &str,
    items: &[ShoppingListItem],
    format: ShoppingListFormat,
) -> String {
    let mut out = String::new();

    match format {
        ShoppingListFormat::Text => {
            out.push_str(&format!("Shopping list for {username}:\n"));
            for item in items {
                out.push_str(&format!(
                    "{} {} {}\n",
                    item.name, item.amount, item.measurement_unit
                ));
            }
        }
        ShoppingListFormat::Csv => {
            out.push_str(&format!(
                "\"Shopping list for {}\",amount,measurement_unit\r\n",
                username.replace('"', "\"\"")
            ));
            for item in items {
                out.push_str(&format!(
                    "{},{},{}\r\n",
                    csv_field(&item.name),
                    item.amount,
                    csv_field(&item.measurement_unit)
                ));
            }
        }
    }

    out
}

pub fn attachment_name(username: &str, format: ShoppingListFormat) -> String {
    format!("{username}_shopping_cart.{}", format.extension())
}

/// `attachment` header value with an ASCII fallback and, when needed, an RFC 5987 UTF-8 name.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == filename {
        return format!("attachment; filename=\"{filename}\"");
    }

    let encoded: String = filename
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect();

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

pub async fn export(
    session: &SessionData,
    format: ShoppingListFormat,
    pool: &Pool<Sqlite>,
) -> Result<ShoppingListExport, Error> {
    session.authenticate(ActionType::ManageOwnLists)?;

    let items = fetch_shopping_list(session.user_id, pool).await?;
    log::debug!(
        "Exporting {} shopping list items for user {}",
        items.len(),
        session.user_id
    );

    Ok(ShoppingListExport {
        filename: attachment_name(&session.username, format),
        content_type: format.content_type(),
        body: render_shopping_list(&session.username, &items, format),
    })
}
