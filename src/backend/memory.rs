use super::{
    super::{Credential, TransferProgressInfo},
    BackendClient, ObjectStoreBackend, OnProgress, PartUploadResult, UploadPartRequest,
};
use anyhow::{anyhow, bail, ensure, Result as AnyResult};
use dashmap::DashMap;
use md5::{Digest, Md5};
use std::{
    collections::BTreeMap,
    fmt::{self, Debug},
    io::{Read, Write},
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

const CHUNK_SIZE: usize = 1 << 16;

/// 内存对象存储后端
///
/// 所有对象和分片上传会话都保存在内存中，可以在多个线程中共享。
/// 分片的 ETag 为分片内容 MD5 的十六进制表示。
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend(Arc<MemoryBackendInner>);

#[derive(Default)]
struct MemoryBackendInner {
    objects: DashMap<ObjectKey, Vec<u8>>,
    uploads: DashMap<String, MultipartUpload>,
    next_upload_id: AtomicU64,
    open_clients: AtomicUsize,
    created_clients: AtomicUsize,
    credential: Option<Credential>,
}

type ObjectKey = (String, String);

#[derive(Debug)]
struct MultipartUpload {
    object_key: ObjectKey,
    parts: Mutex<BTreeMap<NonZeroUsize, StoredPart>>,
}

#[derive(Debug)]
struct StoredPart {
    etag: String,
    data: Vec<u8>,
}

impl MemoryBackend {
    /// 创建内存对象存储后端，接受任意认证信息
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// 创建只接受指定认证信息的内存对象存储后端
    #[inline]
    pub fn with_credential(credential: Credential) -> Self {
        Self(Arc::new(MemoryBackendInner {
            credential: Some(credential),
            ..Default::default()
        }))
    }

    /// 获取对象内容
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.0
            .objects
            .get(&(bucket.to_owned(), key.to_owned()))
            .map(|data| data.to_owned())
    }

    /// 直接写入对象内容
    pub fn insert_object(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.0.objects.insert((bucket.to_owned(), key.to_owned()), data.into());
    }

    /// 获取对象数量
    #[inline]
    pub fn objects_count(&self) -> usize {
        self.0.objects.len()
    }

    /// 获取尚未完成或终止的分片上传会话数量
    #[inline]
    pub fn pending_uploads(&self) -> usize {
        self.0.uploads.len()
    }

    /// 获取当前尚未关闭的客户端数量
    #[inline]
    pub fn open_clients(&self) -> usize {
        self.0.open_clients.load(Ordering::SeqCst)
    }

    /// 获取累计创建的客户端数量
    #[inline]
    pub fn created_clients(&self) -> usize {
        self.0.created_clients.load(Ordering::SeqCst)
    }
}

impl ObjectStoreBackend for MemoryBackend {
    fn new_client(&self, _endpoint: &str, credential: &Credential) -> AnyResult<Box<dyn BackendClient>> {
        if let Some(expected) = &self.0.credential {
            ensure!(
                expected == credential,
                "InvalidAccessKeyId: access key {} is not accepted",
                credential.access_key_id()
            );
        }
        self.0.created_clients.fetch_add(1, Ordering::SeqCst);
        self.0.open_clients.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryClient {
            backend: self.to_owned(),
        }))
    }
}

impl Debug for MemoryBackendInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackendInner")
            .field("objects", &self.objects.len())
            .field("uploads", &self.uploads.len())
            .field("open_clients", &self.open_clients)
            .finish()
    }
}

#[derive(Debug)]
struct MemoryClient {
    backend: MemoryBackend,
}

impl MemoryClient {
    fn inner(&self) -> &MemoryBackendInner {
        &self.backend.0
    }
}

impl BackendClient for MemoryClient {
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn Read,
        size: Option<u64>,
        on_progress: OnProgress<'_>,
    ) -> AnyResult<()> {
        let data = read_with_progress(body, size, on_progress)?;
        self.inner().objects.insert((bucket.to_owned(), key.to_owned()), data);
        Ok(())
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &mut dyn Write,
        on_progress: OnProgress<'_>,
    ) -> AnyResult<()> {
        let data = self
            .backend
            .object(bucket, key)
            .ok_or_else(|| anyhow!("NoSuchKey: {}/{}", bucket, key))?;
        let total = data.len() as u64;
        let mut written = 0u64;
        for chunk in data.chunks(CHUNK_SIZE) {
            destination.write_all(chunk)?;
            written += chunk.len() as u64;
            on_progress(&TransferProgressInfo::new(written, Some(total)))?;
        }
        destination.flush()?;
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> AnyResult<()> {
        self.inner().objects.remove(&(bucket.to_owned(), key.to_owned()));
        Ok(())
    }

    fn initiate_multipart_upload(&self, bucket: &str, key: &str) -> AnyResult<String> {
        let id = self.inner().next_upload_id.fetch_add(1, Ordering::SeqCst);
        let upload_id = hex::encode(Md5::digest(format!("{}/{}#{}", bucket, key, id)));
        self.inner().uploads.insert(
            upload_id.to_owned(),
            MultipartUpload {
                object_key: (bucket.to_owned(), key.to_owned()),
                parts: Default::default(),
            },
        );
        Ok(upload_id)
    }

    fn upload_part(
        &self,
        request: &UploadPartRequest<'_>,
        body: &mut dyn Read,
        on_progress: OnProgress<'_>,
    ) -> AnyResult<PartUploadResult> {
        ensure!(
            self.inner().uploads.contains_key(request.upload_id()),
            "NoSuchUpload: {}",
            request.upload_id()
        );
        let data = read_with_progress(body, Some(request.part_size()), on_progress)?;
        let etag = hex::encode(Md5::digest(&data));
        let upload = self
            .inner()
            .uploads
            .get(request.upload_id())
            .ok_or_else(|| anyhow!("NoSuchUpload: {}", request.upload_id()))?;
        ensure!(
            upload.object_key == (request.bucket().to_owned(), request.key().to_owned()),
            "InvalidRequest: upload {} belongs to another object",
            request.upload_id()
        );
        let size = data.len() as u64;
        upload
            .parts
            .lock()
            .map_err(|_| anyhow!("InternalError: parts lock is poisoned"))?
            .insert(
                request.part_number(),
                StoredPart {
                    etag: etag.to_owned(),
                    data,
                },
            );
        Ok(PartUploadResult::new(request.part_number(), etag, size))
    }

    fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartUploadResult],
    ) -> AnyResult<()> {
        ensure!(!parts.is_empty(), "InvalidRequest: no parts are given");
        ensure!(
            parts
                .windows(2)
                .all(|pair| pair[0].part_number() < pair[1].part_number()),
            "InvalidPartOrder: parts must be sorted by part number"
        );
        let data = {
            let upload = self
                .inner()
                .uploads
                .get(upload_id)
                .ok_or_else(|| anyhow!("NoSuchUpload: {}", upload_id))?;
            let stored = upload
                .parts
                .lock()
                .map_err(|_| anyhow!("InternalError: parts lock is poisoned"))?;
            let mut data = Vec::new();
            for part in parts {
                match stored.get(&part.part_number()) {
                    Some(stored_part) if stored_part.etag == part.etag() => data.extend_from_slice(&stored_part.data),
                    Some(_) => bail!("InvalidPart: etag of part {} does not match", part.part_number()),
                    None => bail!("InvalidPart: part {} is not uploaded", part.part_number()),
                }
            }
            data
        };
        // 只有校验通过才结束会话
        self.inner()
            .uploads
            .remove(upload_id)
            .ok_or_else(|| anyhow!("NoSuchUpload: {}", upload_id))?;
        self.inner().objects.insert((bucket.to_owned(), key.to_owned()), data);
        Ok(())
    }

    fn abort_multipart_upload(&self, _bucket: &str, _key: &str, upload_id: &str) -> AnyResult<()> {
        self.inner()
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("NoSuchUpload: {}", upload_id))
    }

    fn close(&self) {
        self.inner().open_clients.fetch_sub(1, Ordering::SeqCst);
    }
}

fn read_with_progress(body: &mut dyn Read, size: Option<u64>, on_progress: OnProgress<'_>) -> AnyResult<Vec<u8>> {
    let mut data = Vec::with_capacity(size.unwrap_or_default().min(1 << 24) as usize);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let have_read = body.read(&mut buf)?;
        if have_read == 0 {
            break;
        }
        data.extend_from_slice(&buf[..have_read]);
        on_progress(&TransferProgressInfo::new(data.len() as u64, size))?;
    }
    if let Some(size) = size {
        ensure!(
            data.len() as u64 == size,
            "IncompleteBody: expected {} bytes, got {}",
            size,
            data.len()
        );
    }
    Ok(data)
}
