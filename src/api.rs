//! Typed result helpers and the domain services built on them.
//!
//! The transport hands back a [`CanonicalResult`] for every 2xx answer; the
//! helpers here are the one place where `success=false` becomes an `Err`, and
//! where the payload is decoded into the caller's type.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::{ApiClient, NoticeLevel, RequestConfig};
use crate::envelope::CanonicalResult;
use crate::error::{ApiError, ApiResult};

pub mod auth;
pub mod mutation;
pub mod otp;
pub mod permissions;
pub mod query;
pub mod roles;
pub mod users;

pub use auth::AuthService;
pub use mutation::{Mutation, MutationPhase};
pub use otp::{OtpSession, OtpStore};
pub use permissions::PermissionService;
pub use query::{ApiState, CachedQuery};
pub use roles::RoleService;
pub use users::UserService;

/// Members that may hold the actual list when a collection comes back wrapped.
const ARRAY_KEYS: &[&str] = &[
    "value", "Value", "list", "List", "data", "Data", "items", "Items", "result", "Result", "results", "Results",
];

fn first_array(v: &Value) -> Option<&Value> {
    let obj = v.as_object()?;
    ARRAY_KEYS.iter().filter_map(|k| obj.get(*k)).find(|c| c.is_array())
}

/// Decode a canonical payload into `T`.
///
/// A missing payload decodes as `null` when `T` allows it (`Option`, `()`,
/// `Value`) and as `[]` when `T` is a sequence. Types that would accept an
/// object are records, and a record with no payload is a decode error rather
/// than a blank value. An object that does not fit `T` is searched for a
/// wrapped array before giving up.
pub fn decode_payload<T: DeserializeOwned>(data: Option<Value>) -> ApiResult<T> {
    let Some(value) = data.filter(|v| !v.is_null()) else {
        if let Ok(v) = serde_json::from_value::<T>(Value::Null) {
            return Ok(v);
        }
        if serde_json::from_value::<T>(json!({})).is_err() {
            if let Ok(v) = serde_json::from_value::<T>(json!([])) {
                return Ok(v);
            }
        }
        return Err(ApiError::decode("response carried no payload"));
    };
    match serde_json::from_value::<T>(value.clone()) {
        Ok(v) => Ok(v),
        Err(first) => match first_array(&value) {
            Some(inner) => serde_json::from_value(inner.clone()).map_err(ApiError::from),
            None => Err(ApiError::from(first)),
        },
    }
}

impl ApiClient {
    /// Turn a canonical result into the caller's payload, notifying once on
    /// `success=false`.
    pub fn unwrap_canonical<T: DeserializeOwned>(&self, canonical: CanonicalResult<Value>, config: &RequestConfig) -> ApiResult<T> {
        match canonical.into_result() {
            Ok(data) => decode_payload(data),
            Err(e) => {
                if !config.silent {
                    self.notify(NoticeLevel::Error, e.message());
                }
                Err(e)
            }
        }
    }

    pub async fn get_result<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        self.get_result_with(url, &RequestConfig::default()).await
    }

    pub async fn get_result_with<T: DeserializeOwned>(&self, url: &str, config: &RequestConfig) -> ApiResult<T> {
        let canonical = self.get(url, config).await?;
        self.unwrap_canonical(canonical, config)
    }

    pub async fn post_result<T: DeserializeOwned, B: Serialize + ?Sized>(&self, url: &str, body: &B) -> ApiResult<T> {
        self.post_result_with(url, body, &RequestConfig::default()).await
    }

    pub async fn post_result_with<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        config: &RequestConfig,
    ) -> ApiResult<T> {
        let canonical = self.post(url, body, config).await?;
        self.unwrap_canonical(canonical, config)
    }

    pub async fn put_result<T: DeserializeOwned, B: Serialize + ?Sized>(&self, url: &str, body: &B) -> ApiResult<T> {
        self.put_result_with(url, body, &RequestConfig::default()).await
    }

    pub async fn put_result_with<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        config: &RequestConfig,
    ) -> ApiResult<T> {
        let canonical = self.put(url, body, config).await?;
        self.unwrap_canonical(canonical, config)
    }

    pub async fn delete_result<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        self.delete_result_with(url, &RequestConfig::default()).await
    }

    pub async fn delete_result_with<T: DeserializeOwned>(&self, url: &str, config: &RequestConfig) -> ApiResult<T> {
        let canonical = self.delete(url, config).await?;
        self.unwrap_canonical(canonical, config)
    }
}
