use super::{
    backend::{BackendClient, ClientGuard, ObjectStoreBackend},
    multipart::MultipartUploader,
    ErrorKind, NoopProgress, ObjectStorageConfig, ObjectStorageError, ObjectStorageProgress, ObjectStorageResult,
    ObjectUrlResolver, PartSize, PartsSource, ProgressBridge, TransferProgressInfo,
};
use assert_impl::assert_impl;
use auto_impl::auto_impl;
use log::{debug, warn};
use std::{
    fmt::Debug,
    fs::{remove_file, File},
    io::Read,
    path::Path,
    sync::Arc,
};

/// 上传成功后的响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStorageResponse {
    object_name: String,
    object_url: String,
}

impl ObjectStorageResponse {
    #[inline]
    pub fn new(object_name: impl Into<String>, object_url: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            object_url: object_url.into(),
        }
    }

    /// 获取对象名称
    #[inline]
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// 获取对象访问地址
    #[inline]
    pub fn object_url(&self) -> &str {
        &self.object_url
    }
}

/// 对象存储服务接口
///
/// 每次调用都会创建一个后端客户端，并在调用结束时关闭。
/// 调用结束前，进度接口会收到且只会收到一次成功或失败通知。
#[auto_impl(&, Box, Arc)]
pub trait ObjectStorageService: Debug + Send + Sync {
    /// 上传内存数据
    fn upload_bytes(&self, object_name: &str, data: &[u8]) -> ObjectStorageResult<ObjectStorageResponse>;

    /// 上传输入流，数据大小未知
    fn upload_reader(&self, object_name: &str, reader: &mut dyn Read) -> ObjectStorageResult<ObjectStorageResponse>;

    /// 上传本地文件
    fn upload_path(&self, object_name: &str, path: &Path) -> ObjectStorageResult<ObjectStorageResponse>;

    /// 下载对象到本地文件
    ///
    /// 下载失败时会删除已经写入的本地文件
    fn download(&self, object_name: &str, local_path: &Path) -> ObjectStorageResult<()>;

    /// 删除对象
    fn delete(&self, object_name: &str) -> ObjectStorageResult<()>;

    /// 分片上传本地文件
    fn multipart_upload_path(
        &self,
        object_name: &str,
        path: &Path,
        part_size: u64,
    ) -> ObjectStorageResult<ObjectStorageResponse>;

    /// 分片上传已打开的文件
    fn multipart_upload_file(
        &self,
        object_name: &str,
        file: File,
        part_size: u64,
    ) -> ObjectStorageResult<ObjectStorageResponse>;
}

/// 对象存储管理器
///
/// [`ObjectStorageService`] 的实现，通过 [`ObjectStoreBackend`] 完成实际的传输。
/// 管理器本身不可变，进度接口在构建时绑定，可以通过 [`Self::with_progress`] 派生出绑定其他进度接口的管理器。
///
/// ### 上传数据
///
/// ```
/// use oss_transfer::{prelude::*, Credential, MemoryBackend, ObjectStorageConfig, ObjectStorageManager};
///
/// # fn example() -> anyhow::Result<()> {
/// let config = ObjectStorageConfig::builder(
///     "http://oss-cn-test.aliyuncs.com",
///     "mybucket",
///     Credential::new("abcdefghklmnopq", "1234567890"),
/// )
/// .build();
/// let manager = ObjectStorageManager::builder(config, MemoryBackend::new()).build()?;
/// let response = manager.upload_bytes("a/b.txt", b"hello")?;
/// assert_eq!(response.object_url(), "https://mybucket.oss-cn-test.aliyuncs.com/a/b.txt");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ObjectStorageManager(Arc<ObjectStorageManagerInner>);

#[derive(Debug)]
struct ObjectStorageManagerInner {
    config: ObjectStorageConfig,
    backend: Arc<dyn ObjectStoreBackend>,
    resolver: ObjectUrlResolver,
    progress: Arc<dyn ObjectStorageProgress>,
}

impl ObjectStorageManager {
    /// 创建对象存储管理器构建器
    #[inline]
    pub fn builder(
        config: ObjectStorageConfig,
        backend: impl ObjectStoreBackend + 'static,
    ) -> ObjectStorageManagerBuilder {
        ObjectStorageManagerBuilder {
            config,
            backend: Arc::new(backend),
            progress: Arc::new(NoopProgress),
        }
    }

    /// 派生出绑定指定进度接口的对象存储管理器
    ///
    /// 原管理器不受影响
    pub fn with_progress(&self, progress: impl ObjectStorageProgress + 'static) -> Self {
        Self(Arc::new(ObjectStorageManagerInner {
            config: self.0.config.to_owned(),
            backend: self.0.backend.to_owned(),
            resolver: self.0.resolver.to_owned(),
            progress: Arc::new(progress),
        }))
    }

    /// 获取对象存储配置
    #[inline]
    pub fn config(&self) -> &ObjectStorageConfig {
        &self.0.config
    }

    /// 解析对象访问地址
    #[inline]
    pub fn object_url(&self, object_name: &str) -> String {
        self.0.resolver.resolve(object_name)
    }

    /// 使用配置中的默认分片大小分片上传本地文件
    pub fn multipart_upload_path_with_default_part_size(
        &self,
        object_name: &str,
        path: &Path,
    ) -> ObjectStorageResult<ObjectStorageResponse> {
        self.multipart_upload_path(object_name, path, self.0.config.part_size().as_u64())
    }

    fn run<T>(
        &self,
        object_name: &str,
        f: impl FnOnce(&dyn BackendClient, &ProgressBridge<'_>) -> ObjectStorageResult<T>,
    ) -> ObjectStorageResult<T> {
        let bridge = ProgressBridge::new(object_name, self.0.progress.as_ref());
        let result = check_object_name(object_name)
            .and_then(|_| {
                ClientGuard::acquire(
                    self.0.backend.as_ref(),
                    self.0.config.endpoint(),
                    self.0.config.credential(),
                )
            })
            .and_then(|client| f(&*client, &bridge));
        bridge.finish(result)
    }

    fn put(
        &self,
        client: &dyn BackendClient,
        bridge: &ProgressBridge<'_>,
        object_name: &str,
        body: &mut dyn Read,
        size: Option<u64>,
    ) -> ObjectStorageResult<ObjectStorageResponse> {
        let transfer = bridge.transfer();
        let on_progress = |info: &TransferProgressInfo| transfer.on_transfer(info);
        client
            .put_object(self.0.config.bucket_name(), object_name, body, size, &on_progress)
            .map_err(|err| transfer.backend_error(err))?;
        debug!("{} is uploaded to bucket {}", object_name, self.0.config.bucket_name());
        Ok(self.response(object_name))
    }

    fn multipart_upload(
        &self,
        client: &dyn BackendClient,
        bridge: &ProgressBridge<'_>,
        object_name: &str,
        source: PartsSource,
        part_size: PartSize,
    ) -> ObjectStorageResult<ObjectStorageResponse> {
        MultipartUploader::new(&self.0.config, client, bridge, object_name).upload(&source, part_size)?;
        Ok(self.response(object_name))
    }

    fn response(&self, object_name: &str) -> ObjectStorageResponse {
        ObjectStorageResponse::new(object_name, self.object_url(object_name))
    }

    #[allow(dead_code)]
    fn assert() {
        assert_impl!(Send: Self);
        assert_impl!(Sync: Self);
    }
}

impl ObjectStorageService for ObjectStorageManager {
    fn upload_bytes(&self, object_name: &str, mut data: &[u8]) -> ObjectStorageResult<ObjectStorageResponse> {
        self.run(object_name, |client, bridge| {
            let size = data.len() as u64;
            self.put(client, bridge, object_name, &mut data, Some(size))
        })
    }

    fn upload_reader(&self, object_name: &str, reader: &mut dyn Read) -> ObjectStorageResult<ObjectStorageResponse> {
        self.run(object_name, |client, bridge| {
            self.put(client, bridge, object_name, reader, None)
        })
    }

    fn upload_path(&self, object_name: &str, path: &Path) -> ObjectStorageResult<ObjectStorageResponse> {
        self.run(object_name, |client, bridge| {
            let mut file = File::open(path)?;
            let size = file.metadata()?.len();
            self.put(client, bridge, object_name, &mut file, Some(size))
        })
    }

    fn download(&self, object_name: &str, local_path: &Path) -> ObjectStorageResult<()> {
        self.run(object_name, |client, bridge| {
            let mut file = File::create(local_path)?;
            let transfer = bridge.transfer();
            let on_progress = |info: &TransferProgressInfo| transfer.on_transfer(info);
            let result = client
                .get_object(self.0.config.bucket_name(), object_name, &mut file, &on_progress)
                .map_err(|err| transfer.backend_error(err));
            if result.is_err() {
                drop(file);
                if let Err(err) = remove_file(local_path) {
                    warn!("Failed to remove partially downloaded {}: {}", local_path.display(), err);
                }
            } else {
                debug!("{} is downloaded to {}", object_name, local_path.display());
            }
            result
        })
    }

    fn delete(&self, object_name: &str) -> ObjectStorageResult<()> {
        self.run(object_name, |client, bridge| {
            client
                .delete_object(self.0.config.bucket_name(), object_name)
                .map_err(|err| bridge.backend_error(err))?;
            debug!("{} is deleted from bucket {}", object_name, self.0.config.bucket_name());
            Ok(())
        })
    }

    fn multipart_upload_path(
        &self,
        object_name: &str,
        path: &Path,
        part_size: u64,
    ) -> ObjectStorageResult<ObjectStorageResponse> {
        self.run(object_name, |client, bridge| {
            let part_size = PartSize::try_from(part_size)?;
            let source = PartsSource::open(path)?;
            self.multipart_upload(client, bridge, object_name, source, part_size)
        })
    }

    fn multipart_upload_file(
        &self,
        object_name: &str,
        file: File,
        part_size: u64,
    ) -> ObjectStorageResult<ObjectStorageResponse> {
        self.run(object_name, |client, bridge| {
            let part_size = PartSize::try_from(part_size)?;
            let source = PartsSource::from_file(file)?;
            self.multipart_upload(client, bridge, object_name, source, part_size)
        })
    }
}

fn check_object_name(object_name: &str) -> ObjectStorageResult<()> {
    if object_name.is_empty() {
        Err(ObjectStorageError::new_with_msg(
            ErrorKind::InvalidConfiguration,
            "object name must not be empty",
        ))
    } else {
        Ok(())
    }
}

/// 对象存储管理器构建器
#[derive(Debug)]
pub struct ObjectStorageManagerBuilder {
    config: ObjectStorageConfig,
    backend: Arc<dyn ObjectStoreBackend>,
    progress: Arc<dyn ObjectStorageProgress>,
}

impl ObjectStorageManagerBuilder {
    /// 绑定进度接口
    #[inline]
    pub fn progress(&mut self, progress: impl ObjectStorageProgress + 'static) -> &mut Self {
        self.progress = Arc::new(progress);
        self
    }

    /// 构建对象存储管理器
    ///
    /// 配置不合法时返回 [`ErrorKind::InvalidConfiguration`] 错误
    pub fn build(&mut self) -> ObjectStorageResult<ObjectStorageManager> {
        self.config.validate()?;
        Ok(ObjectStorageManager(Arc::new(ObjectStorageManagerInner {
            resolver: ObjectUrlResolver::new(&self.config),
            config: self.config.to_owned(),
            backend: self.backend.to_owned(),
            progress: self.progress.to_owned(),
        })))
    }
}
