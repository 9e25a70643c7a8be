//! Permission administration under `admin/Permissions`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ApiClient;
use crate::error::ApiResult;

pub const PERMISSIONS_PATH: &str = "admin/Permissions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct PermissionService {
    client: ApiClient,
}

impl PermissionService {
    pub fn new(client: ApiClient) -> Self { Self { client } }

    pub async fn list(&self) -> ApiResult<Vec<Permission>> { self.client.get_result(PERMISSIONS_PATH).await }

    pub async fn get(&self, id: &str) -> ApiResult<Permission> {
        self.client.get_result(&format!("{}/{}", PERMISSIONS_PATH, urlencoding::encode(id))).await
    }

    pub async fn by_name(&self, name: &str) -> ApiResult<Permission> {
        self.client.get_result(&format!("{}/by-name/{}", PERMISSIONS_PATH, urlencoding::encode(name))).await
    }

    pub async fn create(&self, request: &PermissionRequest) -> ApiResult<Permission> {
        self.client.post_result(PERMISSIONS_PATH, request).await
    }

    pub async fn update(&self, id: &str, request: &PermissionRequest) -> ApiResult<Permission> {
        self.client.put_result(&format!("{}/{}", PERMISSIONS_PATH, urlencoding::encode(id)), request).await
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let _: Value = self.client.delete_result(&format!("{}/{}", PERMISSIONS_PATH, urlencoding::encode(id))).await?;
        Ok(())
    }
}
