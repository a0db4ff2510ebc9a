use super::{Credential, ErrorKind, ObjectStorageError, ObjectStorageResult, PartSize};
use assert_impl::assert_impl;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Error as IoError, Read},
    num::NonZeroUsize,
    path::Path,
    time::Duration,
};
use thiserror::Error;

/// 配置加载错误
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("failed to read config: {0}")]
    Io(#[from] IoError),

    /// 配置文件格式错误
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// 配置项不合法
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// 对象存储配置
///
/// 在客户端实例的生命周期内不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    endpoint: String,
    bucket_name: String,
    #[serde(flatten)]
    credential: Credential,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    part_size: PartSize,
    #[serde(default = "default_concurrency")]
    concurrency: NonZeroUsize,
    #[serde(default, rename = "deadline_secs", with = "optional_secs")]
    deadline: Option<Duration>,
    #[serde(default = "default_abort_on_failure")]
    abort_on_failure: bool,
}

fn default_concurrency() -> NonZeroUsize {
    NonZeroUsize::new(1).unwrap()
}

fn default_abort_on_failure() -> bool {
    true
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(deadline: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        deadline.map(|d| d.as_secs()).serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

impl ObjectStorageConfig {
    /// 创建对象存储配置构建器
    #[inline]
    pub fn builder(
        endpoint: impl Into<String>,
        bucket_name: impl Into<String>,
        credential: Credential,
    ) -> ObjectStorageConfigBuilder {
        ObjectStorageConfigBuilder::new(endpoint, bucket_name, credential)
    }

    /// 从 JSON 阅读器中读取配置
    pub fn from_json_reader(reader: impl Read) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.check().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// 从 JSON 文件中读取配置
    pub fn load_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_reader(BufReader::new(File::open(path)?))
    }

    /// 获取服务端点
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 获取存储空间名称
    #[inline]
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// 获取认证信息
    #[inline]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// 获取自定义域名
    ///
    /// 空字符串视为未配置
    #[inline]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref().filter(|domain| !domain.is_empty())
    }

    /// 获取默认分片大小
    #[inline]
    pub fn part_size(&self) -> PartSize {
        self.part_size
    }

    /// 获取分片上传并发数
    #[inline]
    pub fn concurrency(&self) -> NonZeroUsize {
        self.concurrency
    }

    /// 获取分片上传的截止时间
    #[inline]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// 分片上传失败后是否终止远端的分片上传会话
    #[inline]
    pub fn abort_on_failure(&self) -> bool {
        self.abort_on_failure
    }

    /// 检查配置是否合法
    pub fn validate(&self) -> ObjectStorageResult<()> {
        self.check()
            .map_err(|msg| ObjectStorageError::new_with_msg(ErrorKind::InvalidConfiguration, msg))
    }

    fn check(&self) -> Result<(), String> {
        if self.endpoint.trim().is_empty() {
            return Err("endpoint must not be empty".to_owned());
        }
        if self.bucket_name.trim().is_empty() {
            return Err("bucket name must not be empty".to_owned());
        }
        Ok(())
    }

    #[allow(dead_code)]
    fn assert() {
        assert_impl!(Send: Self);
        assert_impl!(Sync: Self);
    }
}

/// 对象存储配置构建器
#[derive(Debug)]
pub struct ObjectStorageConfigBuilder(ObjectStorageConfig);

impl ObjectStorageConfigBuilder {
    fn new(endpoint: impl Into<String>, bucket_name: impl Into<String>, credential: Credential) -> Self {
        Self(ObjectStorageConfig {
            endpoint: endpoint.into(),
            bucket_name: bucket_name.into(),
            credential,
            domain: None,
            part_size: Default::default(),
            concurrency: default_concurrency(),
            deadline: None,
            abort_on_failure: default_abort_on_failure(),
        })
    }

    /// 设置自定义域名
    #[inline]
    pub fn domain(&mut self, domain: impl Into<String>) -> &mut Self {
        self.0.domain = Some(domain.into());
        self
    }

    /// 设置默认分片大小
    #[inline]
    pub fn part_size(&mut self, part_size: PartSize) -> &mut Self {
        self.0.part_size = part_size;
        self
    }

    /// 设置分片上传并发数
    #[inline]
    pub fn concurrency(&mut self, concurrency: NonZeroUsize) -> &mut Self {
        self.0.concurrency = concurrency;
        self
    }

    /// 设置分片上传的截止时间
    ///
    /// 超过截止时间后将返回 [`ErrorKind::Timeout`] 错误
    #[inline]
    pub fn deadline(&mut self, deadline: Duration) -> &mut Self {
        self.0.deadline = Some(deadline);
        self
    }

    /// 设置分片上传失败后是否终止远端的分片上传会话
    #[inline]
    pub fn abort_on_failure(&mut self, abort_on_failure: bool) -> &mut Self {
        self.0.abort_on_failure = abort_on_failure;
        self
    }

    /// 构建对象存储配置
    #[inline]
    pub fn build(&mut self) -> ObjectStorageConfig {
        self.0.to_owned()
    }
}
