use serde_json::{Value, json};
use sqlx::{FromRow, SqlitePool};

use crate::database::is_unique_violation;
use crate::error::AppError;
use crate::routes::movie::Movie;
use crate::utils::{Role, verify_password};

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_db(&self.role)
    }

    pub fn verify_login(&self, password: &str) -> Result<bool, bcrypt::BcryptError> {
        verify_password(password, &self.password_hash)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "nome": self.username,
            "role": self.role,
        })
    }

    pub async fn create(
        pool: &SqlitePool,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<i64, AppError> {
        let result = sqlx::query("INSERT INTO users (username, password_hash, role) VALUES (?, ?, ?)")
            .bind(username)
            .bind(password_hash)
            .bind(role.as_str())
            .execute(pool)
            .await;

        match result {
            Ok(done) => {
                tracing::info!("Created user: {}", username);
                Ok(done.last_insert_rowid())
            }
            Err(e) if is_unique_violation(&e) => Err(AppError::Conflict("Usuário já existe")),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_username(
        pool: &SqlitePool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, role FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, username, password_hash, role FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, username, password_hash, role FROM users ORDER BY id")
            .fetch_all(pool)
            .await
    }

    /// 返回是否找到该用户
    pub async fn update_password(
        pool: &SqlitePool,
        id: i64,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let done = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// 删除用户及其评论，并在同一事务内重算受影响电影的评分
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let movie_ids: Vec<i64> =
            sqlx::query_scalar("SELECT DISTINCT id_filme FROM reviews WHERE id_usuario = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM reviews WHERE id_usuario = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let done = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for movie_id in movie_ids {
            Movie::refresh_rating(&mut *tx, movie_id).await?;
        }

        tx.commit().await?;
        tracing::info!("Deleted user {}", id);
        Ok(true)
    }
}
