//! Field rules for accounts, movies and reviews.

use crate::error::AppError;

pub const GENRES: &[&str] = &[
    "Ação",
    "Animação",
    "Aventura",
    "Comédia",
    "Documentário",
    "Drama",
    "Fantasia",
    "Ficção Científica",
    "Musical",
    "Romance",
    "Suspense",
    "Terror",
];

fn len_between(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.chars().count())
}

fn is_alphanumeric(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_alphanumeric())
}

pub fn validate_username(username: &str) -> Result<(), AppError> {
    if !len_between(username, 3, 20) {
        return Err(AppError::Validation(
            "Login deve ter entre 3 e 20 caracteres".into(),
        ));
    }
    if !is_alphanumeric(username) {
        return Err(AppError::Validation(
            "Login deve conter apenas letras e números".into(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if !len_between(password, 3, 20) {
        return Err(AppError::Validation(
            "Senha deve ter entre 3 e 20 caracteres".into(),
        ));
    }
    if !is_alphanumeric(password) {
        return Err(AppError::Validation(
            "Senha deve conter apenas letras e números".into(),
        ));
    }
    Ok(())
}

pub fn validate_credentials(username: &str, password: &str) -> Result<(), AppError> {
    validate_username(username)?;
    validate_password(password)
}

pub fn validate_movie(
    titulo: &str,
    diretor: &str,
    ano: &str,
    generos: &[&str],
    sinopse: &str,
) -> Result<(), AppError> {
    if !len_between(titulo.trim(), 1, 30) {
        return Err(AppError::Validation(
            "Título deve ter entre 1 e 30 caracteres".into(),
        ));
    }
    if !len_between(diretor.trim(), 3, 30) {
        return Err(AppError::Validation(
            "Diretor deve ter entre 3 e 30 caracteres".into(),
        ));
    }
    if ano.len() != 4 || !ano.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation("Ano deve ter 4 dígitos".into()));
    }
    if sinopse.chars().count() > 250 {
        return Err(AppError::Validation(
            "Sinopse deve ter no máximo 250 caracteres".into(),
        ));
    }
    if generos.is_empty() {
        return Err(AppError::Validation(
            "Informe pelo menos um gênero".into(),
        ));
    }
    if let Some(unknown) = generos.iter().find(|genre| !GENRES.contains(*genre)) {
        return Err(AppError::Validation(format!("Gênero inválido: {unknown}")));
    }
    Ok(())
}

pub fn validate_review(nota: i64, titulo: &str, descricao: &str) -> Result<(), AppError> {
    if !(0..=5).contains(&nota) {
        return Err(AppError::Validation("Nota deve ser entre 0 e 5".into()));
    }
    if !len_between(titulo.trim(), 1, 50) {
        return Err(AppError::Validation(
            "Título deve ter entre 1 e 50 caracteres".into(),
        ));
    }
    if descricao.chars().count() > 250 {
        return Err(AppError::Validation(
            "Descrição deve ter no máximo 250 caracteres".into(),
        ));
    }
    Ok(())
}
