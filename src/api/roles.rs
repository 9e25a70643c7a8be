//! Role administration under `admin/roles`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ApiClient;
use crate::error::ApiResult;

pub const ROLES_PATH: &str = "admin/roles";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Body for both create and update.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct RoleService {
    client: ApiClient,
}

impl RoleService {
    pub fn new(client: ApiClient) -> Self { Self { client } }

    pub async fn list(&self) -> ApiResult<Vec<Role>> { self.client.get_result(ROLES_PATH).await }

    pub async fn get(&self, id: &str) -> ApiResult<Role> {
        self.client.get_result(&format!("{}/{}", ROLES_PATH, urlencoding::encode(id))).await
    }

    pub async fn by_name(&self, name: &str) -> ApiResult<Role> {
        self.client.get_result(&format!("{}/by-name/{}", ROLES_PATH, urlencoding::encode(name))).await
    }

    pub async fn create(&self, request: &RoleRequest) -> ApiResult<Role> { self.client.post_result(ROLES_PATH, request).await }

    pub async fn update(&self, id: &str, request: &RoleRequest) -> ApiResult<Role> {
        self.client.put_result(&format!("{}/{}", ROLES_PATH, urlencoding::encode(id)), request).await
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let _: Value = self.client.delete_result(&format!("{}/{}", ROLES_PATH, urlencoding::encode(id))).await?;
        Ok(())
    }

    /// Replace the role's permission set. The backend takes a bare id array.
    pub async fn assign_permissions(&self, role_id: &str, permission_ids: &[String]) -> ApiResult<()> {
        let url = format!("{}/{}/assign-permissions", ROLES_PATH, urlencoding::encode(role_id));
        let _: Value = self.client.post_result(&url, permission_ids).await?;
        Ok(())
    }
}
