use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::{generate_jwt_session, SessionData},
    },
    config::Config,
    error::{Error, ErrorKind, QueryError},
    form::{LoginForm, RegisterForm, SetPasswordForm},
    pagination::{PageContext, PageRequest},
    schema::{Id, User, UserInfo, UserProfile, UserProfileRow, UserRole},
};

use sqlx::{Pool, Sqlite};

const INVALID_CREDENTIALS: &str = "Unable to log in with provided credentials.";

pub async fn get_user(pool: &Pool<Sqlite>, email: &str) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as(
        "SELECT id, email, username, first_name, last_name, password, role FROM users WHERE email = $1",
    )
    .bind(email.trim().to_lowercase())
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_id(pool: &Pool<Sqlite>, user_id: Id) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as(
        "SELECT id, email, username, first_name, last_name, password, role FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

async fn taken(column: &str, value: &str, pool: &Pool<Sqlite>) -> Result<bool, Error> {
    let row: Option<(Id,)> = sqlx::query_as(&format!("SELECT id FROM users WHERE {column} = $1"))
        .bind(value)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row.is_some())
}

/// Validates the form, hashes the password and creates a regular user.
pub async fn register_user(form: RegisterForm, pool: &Pool<Sqlite>) -> Result<UserInfo, Error> {
    let user = form.validate()?;

    if taken("email", &user.email, pool).await? {
        return Err(ErrorKind::Conflict.field("email", "A user with that email already exists."));
    }
    if taken("username", &user.username, pool).await? {
        return Err(
            ErrorKind::Conflict.field("username", "A user with that username already exists.")
        );
    }

    let password = hash_password(&user.password)?;

    let row: Option<UserInfo> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING
        RETURNING email, id, username, first_name, last_name
    ",
    )
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(password)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    let info = row.ok_or_else(|| ErrorKind::Conflict.default())?;
    log::info!("Registered user {} ({})", info.username, info.id);

    Ok(info)
}

/// Returns a signed session token.
pub async fn login_user(
    form: LoginForm,
    config: &Config,
    pool: &Pool<Sqlite>,
) -> Result<String, Error> {
    let (email, password) = match (form.email, form.password) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
            (email, password)
        }
        _ => return Err(ErrorKind::Validation.new(INVALID_CREDENTIALS)),
    };

    let user = get_user(pool, &email)
        .await?
        .ok_or_else(|| ErrorKind::Validation.new(INVALID_CREDENTIALS))?;

    if !verify_password(&password, &user.password) {
        log::debug!("Failed login for user {}", user.id);
        return Err(ErrorKind::Validation.new(INVALID_CREDENTIALS));
    }

    generate_jwt_session(&user, config)
}

pub async fn fetch_users(
    viewer: Option<Id>,
    page: &PageRequest,
    pool: &Pool<Sqlite>,
) -> Result<PageContext<UserProfile>, Error> {
    let rows: Vec<UserProfileRow> = sqlx::query_as(
        "
        SELECT u.email, u.id, u.username, u.first_name, u.last_name,
            EXISTS(SELECT 1 FROM subscriptions s WHERE s.user_id = $1 AND s.author_id = u.id) AS is_subscribed,
            COUNT(*) OVER() AS count
        FROM users u
        ORDER BY u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(viewer)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    let rows = rows.into_iter().map(UserProfile::from).collect();

    PageContext::from_rows(rows, total_count, page)
}

pub async fn get_profile(
    viewer: Option<Id>,
    user_id: Id,
    pool: &Pool<Sqlite>,
) -> Result<UserProfile, Error> {
    let row: Option<UserProfile> = sqlx::query_as(
        "
        SELECT u.email, u.id, u.username, u.first_name, u.last_name,
            EXISTS(SELECT 1 FROM subscriptions s WHERE s.user_id = $1 AND s.author_id = u.id) AS is_subscribed
        FROM users u
        WHERE u.id = $2
    ",
    )
    .bind(viewer)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    row.ok_or_else(|| ErrorKind::NotFound.default())
}

pub async fn set_password(
    session: &SessionData,
    form: SetPasswordForm,
    pool: &Pool<Sqlite>,
) -> Result<(), Error> {
    let current = form
        .current_password
        .ok_or_else(|| ErrorKind::Validation.field("current_password", "This field is required."))?;
    let new = form
        .new_password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ErrorKind::Validation.field("new_password", "This field is required."))?;

    let user = get_user_by_id(pool, session.user_id)
        .await?
        .ok_or_else(|| ErrorKind::Unauthorized.default())?;

    if !verify_password(&current, &user.password) {
        return Err(ErrorKind::Validation.field("current_password", "Invalid password."));
    }

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(hash_password(&new)?)
        .bind(user.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;
    log::info!("User {} changed their password", user.id);

    Ok(())
}

pub async fn set_role(email: &str, role: UserRole, pool: &Pool<Sqlite>) -> Result<(), Error> {
    let result = sqlx::query("UPDATE users SET role = $1 WHERE email = $2")
        .bind(role)
        .bind(email.trim().to_lowercase())
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::NotFound.new("No user with that email."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::tests::test_config,
        jwt::verify_jwt_session,
        testing::{create_user, memory_pool, session},
    };

    fn register_form(email: &str, username: &str) -> RegisterForm {
        RegisterForm {
            email: Some(email.to_string()),
            username: Some(username.to_string()),
            first_name: Some(String::from("Ann")),
            last_name: Some(String::from("Lee")),
            password: Some(String::from("pa55word")),
        }
    }

    #[tokio::test]
    async fn duplicate_email_or_username_conflicts() {
        let pool = memory_pool().await;
        register_user(register_form("ann@example.com", "ann"), &pool)
            .await
            .unwrap();

        let error = register_user(register_form("ANN@example.com", "other"), &pool)
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Conflict);
        assert_eq!(error.field.as_deref(), Some("email"));

        let error = register_user(register_form("other@example.com", "ann"), &pool)
            .await
            .unwrap_err();
        assert_eq!(error.field.as_deref(), Some("username"));
    }

    #[tokio::test]
    async fn login_checks_password() {
        let pool = memory_pool().await;
        let config = test_config();
        let info = register_user(register_form("ann@example.com", "ann"), &pool)
            .await
            .unwrap();

        let token = login_user(
            LoginForm {
                email: Some(String::from("Ann@Example.com")),
                password: Some(String::from("pa55word")),
            },
            &config,
            &pool,
        )
        .await
        .unwrap();
        assert_eq!(verify_jwt_session(&token, &config).unwrap().user_id, info.id);

        let error = login_user(
            LoginForm {
                email: Some(String::from("ann@example.com")),
                password: Some(String::from("wrong")),
            },
            &config,
            &pool,
        )
        .await
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(error.info, INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn set_password_requires_current_one() {
        let pool = memory_pool().await;
        let config = test_config();
        let id = create_user("ann", &pool).await;
        let session = session(id, "ann");

        let error = set_password(
            &session,
            SetPasswordForm {
                new_password: Some(String::from("new")),
                current_password: Some(String::from("wrong")),
            },
            &pool,
        )
        .await
        .unwrap_err();
        assert_eq!(error.field.as_deref(), Some("current_password"));

        set_password(
            &session,
            SetPasswordForm {
                new_password: Some(String::from("new")),
                current_password: Some(String::from("correct horse battery staple")),
            },
            &pool,
        )
        .await
        .unwrap();

        let form = LoginForm {
            email: Some(String::from("ann@example.com")),
            password: Some(String::from("new")),
        };
        assert!(login_user(form, &config, &pool).await.is_ok());
    }

    #[tokio::test]
    async fn profiles_report_subscription() {
        let pool = memory_pool().await;
        let ann = create_user("ann", &pool).await;
        let bob = create_user("bob", &pool).await;
        sqlx::query("INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2)")
            .bind(ann)
            .bind(bob)
            .execute(&pool)
            .await
            .unwrap();

        let page = fetch_users(Some(ann), &PageRequest::new(1, 6), &pool)
            .await
            .unwrap();
        assert_eq!(page.count, 2);
        let flags: Vec<(Id, bool)> = page
            .results
            .iter()
            .map(|u| (u.id, u.is_subscribed))
            .collect();
        assert_eq!(flags, vec![(ann, false), (bob, true)]);

        assert!(!get_profile(None, bob, &pool).await.unwrap().is_subscribed);
        assert_eq!(
            get_profile(None, 999, &pool).await.unwrap_err().kind,
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn set_role_promotes_by_email() {
        let pool = memory_pool().await;
        let id = create_user("ann", &pool).await;

        set_role("ann@example.com", UserRole::Admin, &pool)
            .await
            .unwrap();
        let user = get_user_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(user.role, UserRole::Admin);

        assert!(set_role("nobody@example.com", UserRole::Admin, &pool)
            .await
            .is_err());
    }
}
