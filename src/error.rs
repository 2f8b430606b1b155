use thiserror::Error;

use crate::result::{ApiResponse, Status};

/// 请求处理过程中的错误，按协议状态码分类
#[derive(Debug, Error)]
pub enum AppError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("invalid fields: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
    #[error("token signing error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("handler panicked: {0}")]
    Panic(String),
}

impl AppError {
    pub fn status(&self) -> Status {
        match self {
            AppError::Malformed(_) => Status::MALFORMED_REQUEST,
            AppError::UnknownOperation(_) => Status::UNKNOWN_OPERATION,
            AppError::Unauthenticated => Status::UNAUTHORIZED,
            AppError::Forbidden => Status::FORBIDDEN,
            AppError::NotFound(_) => Status::NOT_FOUND,
            AppError::Validation(_) => Status::INVALID_FIELDS,
            AppError::Conflict(_) => Status::CONFLICT,
            AppError::Database(_)
            | AppError::Hashing(_)
            | AppError::Token(_)
            | AppError::Serialization(_)
            | AppError::Panic(_) => Status::INTERNAL_ERROR,
        }
    }

    /// 客户端可见的消息；内部错误细节只写日志
    pub fn client_message(&self) -> String {
        match self {
            AppError::Malformed(detail) => format!("Erro: requisição mal formatada ({detail})"),
            AppError::UnknownOperation(operation) => {
                format!("Erro: operação desconhecida: {operation}")
            }
            AppError::Unauthenticated => "Erro: Token inválido".to_string(),
            AppError::Forbidden => "Erro: sem permissão".to_string(),
            AppError::NotFound(what) | AppError::Conflict(what) => format!("Erro: {what}"),
            AppError::Validation(detail) => format!("Erro: {detail}"),
            _ => "Erro: Falha interna do servidor".to_string(),
        }
    }

    pub fn into_response(self) -> ApiResponse {
        ApiResponse::error(self.status(), self.client_message())
    }
}
