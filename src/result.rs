use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::{Map, Value};

/// 协议状态码，线上以三位数字字符串传输
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(u16);

impl Status {
    pub const OK: Status = Status(200);
    pub const CREATED: Status = Status(201);
    pub const UNKNOWN_OPERATION: Status = Status(400);
    pub const UNAUTHORIZED: Status = Status(401);
    pub const FORBIDDEN: Status = Status(403);
    pub const NOT_FOUND: Status = Status(404);
    pub const INVALID_FIELDS: Status = Status(405);
    pub const CONFLICT: Status = Status(409);
    pub const MALFORMED_REQUEST: Status = Status(422);
    pub const INTERNAL_ERROR: Status = Status(500);

    pub fn code(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    pub fn is_server_error(self) -> bool {
        self.0 >= 500
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.parse::<u16>() {
            Ok(code) if (100..1000).contains(&code) => Ok(Status(code)),
            _ => Err(de::Error::custom(format!("invalid status code {raw:?}"))),
        }
    }
}

/// 响应信封：`{"status": "200", "mensagem": "...", ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: Status,
    #[serde(rename = "mensagem", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ApiResponse {
    pub fn success(status: Status, message: &str) -> Self {
        Self {
            status,
            message: Some(message.to_string()),
            data: Map::new(),
        }
    }

    pub fn error(status: Status, message: String) -> Self {
        Self {
            status,
            message: Some(message),
            data: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// 编码为单行 JSON（不含换行符）
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode response envelope");
            FALLBACK_INTERNAL_ERROR.to_string()
        })
    }
}

const FALLBACK_INTERNAL_ERROR: &str =
    r#"{"status":"500","mensagem":"Erro: Falha interna do servidor"}"#;
