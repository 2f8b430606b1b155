use serde_json::{Value, json};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::common::{Payload, required_int, required_str, required_str_list};
use crate::database::is_unique_violation;
use crate::error::AppError;
use crate::validation::validate_movie;

#[derive(Debug, Clone, FromRow)]
pub struct Movie {
    pub id: i64,
    pub titulo: String,
    pub diretor: String,
    pub ano: String,
    pub generos: String,
    pub sinopse: String,
    pub nota: f64,
    pub qtd_avaliacoes: i64,
}

/// 创建或编辑电影时提交的字段
#[derive(Debug, Clone)]
pub struct MovieInput {
    pub titulo: String,
    pub diretor: String,
    pub ano: String,
    pub generos: Vec<String>,
    pub sinopse: String,
}

impl MovieInput {
    pub fn from_payload(movie: &Payload) -> Result<Self, AppError> {
        let titulo = required_str(movie, "titulo")?;
        let diretor = required_str(movie, "diretor")?;
        let ano = match movie.get("ano") {
            Some(Value::Number(_)) => required_int(movie, "ano")?.to_string(),
            _ => required_str(movie, "ano")?.to_string(),
        };
        let generos = required_str_list(movie, "genero")?;
        let sinopse = movie.get("sinopse").and_then(Value::as_str).unwrap_or("");
        validate_movie(titulo, diretor, &ano, &generos, sinopse)?;

        Ok(Self {
            titulo: titulo.trim().to_string(),
            diretor: diretor.trim().to_string(),
            ano,
            generos: generos.iter().map(|genre| genre.to_string()).collect(),
            sinopse: sinopse.to_string(),
        })
    }
}

const SELECT_MOVIE: &str =
    "SELECT id, titulo, diretor, ano, generos, sinopse, nota, qtd_avaliacoes FROM movies";

impl Movie {
    pub fn genres(&self) -> Vec<&str> {
        self.generos
            .split(',')
            .filter(|genre| !genre.is_empty())
            .collect()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "titulo": self.titulo,
            "diretor": self.diretor,
            "ano": self.ano,
            "genero": self.genres(),
            "sinopse": self.sinopse,
            "nota": format!("{:.1}", self.nota),
            "qtd_avaliacoes": self.qtd_avaliacoes.to_string(),
        })
    }

    pub async fn create(pool: &SqlitePool, input: &MovieInput) -> Result<i64, AppError> {
        let result = sqlx::query(
            "INSERT INTO movies (titulo, diretor, ano, generos, sinopse) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&input.titulo)
        .bind(&input.diretor)
        .bind(&input.ano)
        .bind(input.generos.join(","))
        .bind(&input.sinopse)
        .execute(pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(AppError::Conflict("Filme já cadastrado")),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update(pool: &SqlitePool, id: i64, input: &MovieInput) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE movies SET titulo = ?, diretor = ?, ano = ?, generos = ?, sinopse = ? WHERE id = ?",
        )
        .bind(&input.titulo)
        .bind(&input.diretor)
        .bind(&input.ano)
        .bind(input.generos.join(","))
        .bind(&input.sinopse)
        .bind(id)
        .execute(pool)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(e) if is_unique_violation(&e) => Err(AppError::Conflict("Filme já cadastrado")),
            Err(e) => Err(e.into()),
        }
    }

    /// 连同该电影的全部评论一起删除
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM reviews WHERE id_filme = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let done = sqlx::query("DELETE FROM movies WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(done.rows_affected() > 0)
    }

    pub async fn list(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Movie>(&format!("{SELECT_MOVIE} ORDER BY id"))
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Movie>(&format!("{SELECT_MOVIE} WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub(crate) async fn exists(conn: &mut SqliteConnection, id: i64) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM movies WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(found.is_some())
    }

    /// 重算平均分与评论数，调用方负责事务
    pub(crate) async fn refresh_rating(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE movies
            SET nota = COALESCE((SELECT AVG(nota) FROM reviews WHERE id_filme = ?), 0),
                qtd_avaliacoes = (SELECT COUNT(*) FROM reviews WHERE id_filme = ?)
            WHERE id = ?
            "#,
        )
        .bind(id)
        .bind(id)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }
}
