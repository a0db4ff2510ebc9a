use super::{Credential, ErrorKind, ObjectStorageError, ObjectStorageResult, TransferProgressInfo};
use anyhow::Result as AnyResult;
use auto_impl::auto_impl;
use log::debug;
use std::{
    fmt::Debug,
    io::{Read, Write},
    num::NonZeroUsize,
    ops::Deref,
};

/// 后端传输进度回调
pub type OnProgress<'r> = &'r (dyn Fn(&TransferProgressInfo) -> AnyResult<()> + Send + Sync);

/// 对象存储后端接口
///
/// 负责创建实际执行网络传输的后端客户端
#[auto_impl(&, Box, Arc)]
pub trait ObjectStoreBackend: Debug + Send + Sync {
    /// 创建后端客户端
    fn new_client(&self, endpoint: &str, credential: &Credential) -> AnyResult<Box<dyn BackendClient>>;
}

/// 后端客户端接口
///
/// 每次操作都会创建一个新的客户端，并在操作结束时调用 [`Self::close`]
pub trait BackendClient: Debug + Send + Sync {
    /// 上传对象
    ///
    /// `size` 为 [`None`] 时表示数据大小未知
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn Read,
        size: Option<u64>,
        on_progress: OnProgress<'_>,
    ) -> AnyResult<()>;

    /// 下载对象，并写入 `destination`
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &mut dyn Write,
        on_progress: OnProgress<'_>,
    ) -> AnyResult<()>;

    /// 删除对象
    fn delete_object(&self, bucket: &str, key: &str) -> AnyResult<()>;

    /// 初始化分片上传，返回上传 ID
    fn initiate_multipart_upload(&self, bucket: &str, key: &str) -> AnyResult<String>;

    /// 上传分片
    fn upload_part(
        &self,
        request: &UploadPartRequest<'_>,
        body: &mut dyn Read,
        on_progress: OnProgress<'_>,
    ) -> AnyResult<PartUploadResult>;

    /// 完成分片上传
    ///
    /// `parts` 必须按照分片编号升序排列
    fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartUploadResult],
    ) -> AnyResult<()>;

    /// 终止分片上传，并丢弃已经上传的分片
    fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> AnyResult<()>;

    /// 关闭客户端
    fn close(&self);
}

/// 上传分片请求
#[derive(Debug, Clone, Copy)]
pub struct UploadPartRequest<'a> {
    bucket: &'a str,
    key: &'a str,
    upload_id: &'a str,
    part_number: NonZeroUsize,
    part_size: u64,
}

impl<'a> UploadPartRequest<'a> {
    #[inline]
    pub fn new(bucket: &'a str, key: &'a str, upload_id: &'a str, part_number: NonZeroUsize, part_size: u64) -> Self {
        Self {
            bucket,
            key,
            upload_id,
            part_number,
            part_size,
        }
    }

    #[inline]
    pub fn bucket(&self) -> &'a str {
        self.bucket
    }

    #[inline]
    pub fn key(&self) -> &'a str {
        self.key
    }

    #[inline]
    pub fn upload_id(&self) -> &'a str {
        self.upload_id
    }

    /// 获取分片编号，从 1 开始
    #[inline]
    pub fn part_number(&self) -> NonZeroUsize {
        self.part_number
    }

    /// 获取分片大小
    #[inline]
    pub fn part_size(&self) -> u64 {
        self.part_size
    }
}

/// 分片上传结果
///
/// 每个上传成功的分片对应一个结果，完成分片上传时需要提供所有结果
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartUploadResult {
    part_number: NonZeroUsize,
    etag: String,
    size: u64,
}

impl PartUploadResult {
    #[inline]
    pub fn new(part_number: NonZeroUsize, etag: impl Into<String>, size: u64) -> Self {
        Self {
            part_number,
            etag: etag.into(),
            size,
        }
    }

    /// 获取分片编号，从 1 开始
    #[inline]
    pub fn part_number(&self) -> NonZeroUsize {
        self.part_number
    }

    /// 获取分片 ETag
    #[inline]
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// 获取分片大小
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// 后端客户端守卫
///
/// 无论操作成功还是失败，离开作用域时都会关闭客户端
#[derive(Debug)]
pub(crate) struct ClientGuard {
    client: Box<dyn BackendClient>,
}

impl ClientGuard {
    pub(crate) fn acquire(
        backend: &dyn ObjectStoreBackend,
        endpoint: &str,
        credential: &Credential,
    ) -> ObjectStorageResult<Self> {
        let client = backend.new_client(endpoint, credential).map_err(|err| {
            ObjectStorageError::new_with_msg_and_cause(
                ErrorKind::BackendError,
                "failed to create backend client",
                err,
            )
        })?;
        debug!("Backend client for {} is acquired", endpoint);
        Ok(Self { client })
    }
}

impl Deref for ClientGuard {
    type Target = dyn BackendClient;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.client.close();
        debug!("Backend client is released");
    }
}

mod memory;
pub use memory::MemoryBackend;
