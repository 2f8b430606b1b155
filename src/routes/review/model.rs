use chrono::Utc;
use serde_json::{Value, json};
use sqlx::{FromRow, SqlitePool};

use crate::database::is_unique_violation;
use crate::error::AppError;
use crate::routes::movie::Movie;

#[derive(Debug, Clone, FromRow)]
pub struct Review {
    pub id: i64,
    pub id_filme: i64,
    pub id_usuario: i64,
    pub nome_usuario: String,
    pub nota: i64,
    pub titulo: String,
    pub descricao: String,
    pub data: String,
    pub editado: bool,
}

#[derive(Debug, Clone)]
pub struct ReviewInput<'a> {
    pub nota: i64,
    pub titulo: &'a str,
    pub descricao: &'a str,
}

const SELECT_REVIEW: &str = r#"
    SELECT r.id, r.id_filme, r.id_usuario, u.username AS nome_usuario,
           r.nota, r.titulo, r.descricao, r.data, r.editado
    FROM reviews r
    JOIN users u ON u.id = r.id_usuario
"#;

fn today() -> String {
    Utc::now().format("%d/%m/%Y").to_string()
}

impl Review {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "id_filme": self.id_filme.to_string(),
            "nome_usuario": self.nome_usuario,
            "nota": self.nota.to_string(),
            "titulo": self.titulo,
            "descricao": self.descricao,
            "data": self.data,
            "editado": self.editado.to_string(),
        })
    }

    pub async fn create(
        pool: &SqlitePool,
        user_id: i64,
        movie_id: i64,
        input: &ReviewInput<'_>,
    ) -> Result<i64, AppError> {
        let mut tx = pool.begin().await?;
        // 令牌仍有效但账户可能已被删除
        let author: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if author.is_none() {
            return Err(AppError::Unauthenticated);
        }
        if !Movie::exists(&mut *tx, movie_id).await? {
            return Err(AppError::NotFound("Filme não encontrado"));
        }

        let inserted = sqlx::query(
            "INSERT INTO reviews (id_filme, id_usuario, nota, titulo, descricao, data) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(movie_id)
        .bind(user_id)
        .bind(input.nota)
        .bind(input.titulo)
        .bind(input.descricao)
        .bind(today())
        .execute(&mut *tx)
        .await;
        let id = match inserted {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict("Você já avaliou este filme"));
            }
            Err(e) => return Err(e.into()),
        };

        Movie::refresh_rating(&mut *tx, movie_id).await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Review>(&format!("{SELECT_REVIEW} WHERE r.id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Review>(&format!("{SELECT_REVIEW} WHERE r.id_usuario = ? ORDER BY r.id"))
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_by_movie(
        pool: &SqlitePool,
        movie_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Review>(&format!("{SELECT_REVIEW} WHERE r.id_filme = ? ORDER BY r.id"))
            .bind(movie_id)
            .fetch_all(pool)
            .await
    }

    pub async fn update(&self, pool: &SqlitePool, input: &ReviewInput<'_>) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query(
            "UPDATE reviews SET nota = ?, titulo = ?, descricao = ?, data = ?, editado = 1 WHERE id = ?",
        )
        .bind(input.nota)
        .bind(input.titulo)
        .bind(input.descricao)
        .bind(today())
        .bind(self.id)
        .execute(&mut *tx)
        .await?;
        Movie::refresh_rating(&mut *tx, self.id_filme).await?;
        tx.commit().await
    }

    pub async fn delete(&self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(self.id)
            .execute(&mut *tx)
            .await?;
        Movie::refresh_rating(&mut *tx, self.id_filme).await?;
        tx.commit().await
    }
}
