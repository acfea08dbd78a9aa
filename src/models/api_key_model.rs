use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApiKeyRecord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub created_at: String,
    pub last_used: Option<String>,
    pub usage_count: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: Option<String>,
}

/// La clave en claro solo se devuelve al crearla.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedApiKeyResponse {
    pub id: String,
    pub name: String,
    pub api_key: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EndpointUsage {
    pub endpoint: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyStats {
    pub api_key_active: bool,
    pub name: String,
    pub created_at: String,
    pub total_usage: i64,
    pub last_used: Option<String>,
    pub recent_usage_30_days: i64,
    pub success_rate: f64,
    pub popular_endpoints: Vec<EndpointUsage>,
}

/// `?api_key=...` en todas las rutas protegidas
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyQuery {
    pub api_key: String,
}
