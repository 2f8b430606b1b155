use serde_json::{Map, Value};

use crate::error::AppError;

/// 请求信封中除 `operacao` 与 `token` 外的字段
pub type Payload = Map<String, Value>;

// 公共字段提取：缺失或类型错误 -> 422，值不合法 -> 405

pub fn required_str<'a>(payload: &'a Payload, key: &str) -> Result<&'a str, AppError> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(key))
}

pub fn required_object<'a>(payload: &'a Payload, key: &str) -> Result<&'a Payload, AppError> {
    payload
        .get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| missing(key))
}

/// 整数字段，协议中通常以字符串传输，也接受 JSON 数字
pub fn required_int(payload: &Payload, key: &str) -> Result<i64, AppError> {
    match payload.get(key) {
        Some(Value::Number(number)) => number
            .as_i64()
            .ok_or_else(|| AppError::Validation(format!("campo '{key}' inválido"))),
        Some(Value::String(raw)) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Validation(format!("campo '{key}' inválido"))),
        _ => Err(missing(key)),
    }
}

pub fn required_str_list<'a>(payload: &'a Payload, key: &str) -> Result<Vec<&'a str>, AppError> {
    let items = payload
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| missing(key))?;
    items
        .iter()
        .map(|item| item.as_str().ok_or_else(|| missing(key)))
        .collect()
}

fn missing(key: &str) -> AppError {
    AppError::Malformed(format!("campo '{key}' ausente ou inválido"))
}
