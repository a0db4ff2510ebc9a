use std::{error, fmt};

/// 对象存储错误类型
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 非法的配置，例如分片大小为 0
    InvalidConfiguration,

    /// 后端调用失败
    BackendError,

    /// 本地 IO 失败
    LocalIoError,

    /// 进度回调失败
    CallbackError,

    /// 超过截止时间
    Timeout,

    /// 分片上传结果不完整或不连续
    InvalidPartResults,
}

/// 对象存储错误
///
/// 所有的后端错误，本地 IO 错误以及回调错误都会被包装为该错误
#[derive(Debug)]
pub struct ObjectStorageError {
    kind: ErrorKind,
    message: String,
    cause: Option<Box<dyn error::Error + Send + Sync>>,
}

impl ObjectStorageError {
    /// 创建对象存储错误，错误信息取自原始错误
    #[inline]
    pub fn new(kind: ErrorKind, err: impl Into<Box<dyn error::Error + Send + Sync>>) -> Self {
        let cause = err.into();
        Self {
            kind,
            message: cause.to_string(),
            cause: Some(cause),
        }
    }

    /// 创建仅包含错误信息的对象存储错误
    #[inline]
    pub fn new_with_msg(kind: ErrorKind, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
            cause: None,
        }
    }

    /// 创建包含错误信息和原始错误的对象存储错误
    #[inline]
    pub fn new_with_msg_and_cause(
        kind: ErrorKind,
        message: impl fmt::Display,
        err: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            message: message.to_string(),
            cause: Some(err.into()),
        }
    }

    pub(crate) fn from_backend(err: anyhow::Error) -> Self {
        Self::new(ErrorKind::BackendError, err)
    }

    pub(crate) fn from_callback(err: anyhow::Error) -> Self {
        Self::new(ErrorKind::CallbackError, err)
    }

    /// 获取错误类型
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误信息
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取原始错误
    #[inline]
    pub fn cause(&self) -> Option<&(dyn error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    #[inline]
    pub fn into_cause(self) -> Option<Box<dyn error::Error + Send + Sync>> {
        self.cause
    }
}

impl fmt::Display for ObjectStorageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl error::Error for ObjectStorageError {
    #[inline]
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.cause.as_ref().map(|cause| cause.as_ref() as &(dyn error::Error + 'static))
    }
}

impl From<std::io::Error> for ObjectStorageError {
    #[inline]
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::LocalIoError, err)
    }
}

/// 对象存储结果
pub type ObjectStorageResult<T> = Result<T, ObjectStorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::{
        error::Error as _,
        io::{Error as IoError, ErrorKind as IoErrorKind},
    };

    #[test]
    fn test_error_keeps_message_and_cause() {
        let err = ObjectStorageError::from_backend(anyhow!("connection reset"));
        assert_eq!(err.kind(), ErrorKind::BackendError);
        assert_eq!(err.message(), "connection reset");
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(err.source().unwrap().to_string(), "connection reset");

        let err: ObjectStorageError = IoError::new(IoErrorKind::NotFound, "no such file").into();
        assert_eq!(err.kind(), ErrorKind::LocalIoError);
        assert_eq!(err.message(), "no such file");
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_error_without_cause() {
        let err = ObjectStorageError::new_with_msg(ErrorKind::InvalidConfiguration, "part size must be positive");
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert!(err.source().is_none());
        assert!(err.into_cause().is_none());
    }
}
