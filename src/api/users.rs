use serde::{Deserialize, Serialize};

use super::query::CachedQuery;
use crate::client::ApiClient;
use crate::error::ApiResult;

pub const USERS_LIST_PATH: &str = "Home/UsersList";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDto {
    pub id: String,
    pub phone_number: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_code: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Clone)]
pub struct UserService {
    client: ApiClient,
}

impl UserService {
    pub fn new(client: ApiClient) -> Self { Self { client } }

    pub async fn list(&self) -> ApiResult<Vec<UserDto>> { self.client.get_result(USERS_LIST_PATH).await }

    /// Cache-backed view of the user list, as the users screen shows it.
    pub fn list_query(&self) -> CachedQuery<Vec<UserDto>> { CachedQuery::new(&self.client, USERS_LIST_PATH) }
}
