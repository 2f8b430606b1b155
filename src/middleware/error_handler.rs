use tracing::error;

use crate::error::AppError;

/// 记录会被转换为 5xx 响应的错误
pub fn log_errors(operation: &str, err: &AppError) {
    if err.status().is_server_error() {
        error!(
            operation,
            status = %err.status(),
            error = %err,
            "Server error occurred while handling request"
        );
    }
}
