use serde::{Deserialize, Serialize};
use std::fmt;

/// 认证信息
///
/// 包含访问后端所需的 AccessKeyId 和 AccessKeySecret
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    access_key_id: String,
    access_key_secret: String,
}

impl Credential {
    /// 创建认证信息
    #[inline]
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    /// 获取认证信息的 AccessKeyId
    #[inline]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// 获取认证信息的 AccessKeySecret
    #[inline]
    pub fn access_key_secret(&self) -> &str {
        &self.access_key_secret
    }

    /// 同时返回认证信息的 AccessKeyId 和 AccessKeySecret
    #[inline]
    pub fn into_pair(self) -> (String, String) {
        (self.access_key_id, self.access_key_secret)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_fmt(format_args!(
            "Credential {{ access_key_id: {:?}, access_key_secret: CENSORED }}",
            self.access_key_id,
        ))
    }
}
