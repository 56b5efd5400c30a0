/// PostgreSQL credential store
use super::CredentialStore;
use crate::error::{Result, UserCenterError};
use crate::models::{
    LoginAuditEntry, NewLoginAudit, NewSession, NewUser, PageRequest, ProductAssociation, Session,
    User, UserChanges, UserFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::{debug, info};

const USER_COLUMNS: &str = "id, username, email, password_hash, nickname, avatar, role, status, \
     disabled_remark, source, last_login_at, created_at, updated_at";

const SESSION_COLUMNS: &str =
    "id, user_id, token, expires_at, ip_address, user_agent, device_id, created_at";

#[derive(FromRow)]
struct ProductRow {
    user_id: i64,
    #[sqlx(flatten)]
    product: ProductAssociation,
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
    service_name: String,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool, service_name: impl Into<String>) -> Self {
        Self {
            pool,
            service_name: service_name.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fill `products` on each user, keeping join order
    async fn attach_products(&self, users: &mut [User]) -> Result<()> {
        if users.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT user_id, product_id, name, joined_at
            FROM user_products
            WHERE user_id = ANY($1)
            ORDER BY joined_at, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_user: HashMap<i64, Vec<ProductAssociation>> = HashMap::new();
        for row in rows {
            by_user.entry(row.user_id).or_default().push(row.product);
        }
        for user in users.iter_mut() {
            user.products = by_user.remove(&user.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn with_products(&self, user: Option<User>) -> Result<Option<User>> {
        match user {
            Some(user) => {
                let mut users = [user];
                self.attach_products(&mut users).await?;
                let [user] = users;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn user_exists(&self, id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

/// Escape LIKE wildcards so filters match literally
fn like_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    qb.push(" WHERE TRUE");
    if let Some(username) = &filter.username {
        qb.push(" AND username LIKE ").push_bind(like_pattern(username));
    }
    if let Some(email) = &filter.email {
        qb.push(" AND email LIKE ").push_bind(like_pattern(email));
    }
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(source) = &filter.source {
        qb.push(" AND source = ").push_bind(source.clone());
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
        exclude_id: Option<i64>,
    ) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE (username = $1 OR email = $2)
              AND ($3::BIGINT IS NULL OR id <> $3)
            ORDER BY (username = $1) DESC, id
            LIMIT 1
            "#
        ))
        .bind(username)
        .bind(email)
        .bind(exclude_id)
        .fetch_optional(&self.pool)
        .await?;

        self.with_products(user).await
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.with_products(user).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (
                username, email, password_hash, nickname, avatar,
                role, status, disabled_remark, source
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.nickname)
        .bind(&user.avatar)
        .bind(user.role)
        .bind(user.status)
        .bind(&user.disabled_remark)
        .bind(&user.source)
        .fetch_one(&self.pool)
        .await?;

        debug!(user_id = created.id, "Inserted user");
        Ok(created)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<User> {
        let revoke_sessions = changes.password_hash.is_some();
        let (set_remark, remark) = match changes.disabled_remark {
            Some(remark) => (true, remark),
            None => (false, None),
        };

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                nickname = COALESCE($5, nickname),
                avatar = COALESCE($6, avatar),
                role = COALESCE($7, role),
                status = COALESCE($8, status),
                disabled_remark = CASE WHEN $9 THEN $10 ELSE disabled_remark END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.password_hash)
        .bind(changes.nickname)
        .bind(changes.avatar)
        .bind(changes.role)
        .bind(changes.status)
        .bind(set_remark)
        .bind(remark)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(UserCenterError::user_not_found)?;

        if revoke_sessions {
            let revoked = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            debug!(user_id = id, revoked, "Password replaced, sessions dropped");
        }
        tx.commit().await?;

        let mut users = [updated];
        self.attach_products(&mut users).await?;
        let [updated] = users;
        Ok(updated)
    }

    async fn delete_user_cascade(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM login_audit WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM user_products WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<(Vec<User>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filters(&mut count, filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY id LIMIT ")
            .push_bind(page.page_size as i64)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let mut users = select.build_query_as::<User>().fetch_all(&self.pool).await?;

        self.attach_products(&mut users).await?;
        Ok((users, total))
    }

    async fn touch_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_product(&self, user_id: i64, product: ProductAssociation) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO user_products (user_id, product_id, name, joined_at)
            SELECT $1, $2, $3, $4
            WHERE EXISTS (SELECT 1 FROM users WHERE id = $1)
            "#,
        )
        .bind(user_id)
        .bind(&product.product_id)
        .bind(&product.name)
        .bind(product.joined_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(UserCenterError::user_not_found());
        }
        Ok(())
    }

    async fn remove_product(&self, user_id: i64, product_id: &str) -> Result<()> {
        let removed = sqlx::query("DELETE FROM user_products WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if removed > 0 {
            Ok(())
        } else if self.user_exists(user_id).await? {
            Err(UserCenterError::AssociationNotFound)
        } else {
            Err(UserCenterError::user_not_found())
        }
    }

    async fn create_session(&self, session: NewSession) -> Result<Session> {
        let created = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO user_sessions (user_id, token, expires_at, ip_address, user_agent, device_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.user_id)
        .bind(&session.token)
        .bind(session.expires_at)
        .bind(&session.client.ip_address)
        .bind(&session.client.user_agent)
        .bind(&session.client.device_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn find_valid_session(&self, token: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions WHERE token = $1 AND expires_at > NOW()"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn delete_session(&self, token: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all_sessions(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_sessions(&self, user_id: i64) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM user_sessions
            WHERE user_id = $1 AND expires_at > NOW()
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn append_login_audit(&self, entry: NewLoginAudit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO login_audit (user_id, username, ip_address, user_agent, success, message)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.username)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.success)
        .bind(&entry.message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_login_audit(&self, user_id: i64, limit: i64) -> Result<Vec<LoginAuditEntry>> {
        let entries = sqlx::query_as::<_, LoginAuditEntry>(
            r#"
            SELECT id, user_id, username, ip_address, user_agent, success, message, created_at
            FROM login_audit
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn close(&self) {
        info!(service = %self.service_name, "Closing credential store");
        db_pool::close_pool(&self.pool, &self.service_name).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("bob"), "%bob%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
