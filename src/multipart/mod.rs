use super::{
    backend::{BackendClient, PartUploadResult, UploadPartRequest},
    ErrorKind, ObjectStorageConfig, ObjectStorageError, ObjectStorageResult, Part, PartPlan, PartSize, PartsSource,
    ProgressBridge, TransferProgressInfo,
};
use anyhow::bail;
use log::{debug, info, warn};
use rayon::ThreadPoolBuilder;
use std::{
    io::empty,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
    time::Instant,
};

mod progress;
use progress::PartProgresses;

/// 分片上传器
///
/// 负责一次分片上传调用：初始化分片上传会话，上传每个分片，
/// 按照分片编号排序上传结果后完成分片上传。
/// 任何一步失败都会停止后续分片的上传，并尽力取消正在上传的分片，
/// 然后根据配置终止远端的分片上传会话。
#[derive(Debug)]
pub(crate) struct MultipartUploader<'a> {
    config: &'a ObjectStorageConfig,
    client: &'a dyn BackendClient,
    bridge: &'a ProgressBridge<'a>,
    object_name: &'a str,
    started_at: Instant,
    cancelled: AtomicBool,
}

impl<'a> MultipartUploader<'a> {
    pub(crate) fn new(
        config: &'a ObjectStorageConfig,
        client: &'a dyn BackendClient,
        bridge: &'a ProgressBridge<'a>,
        object_name: &'a str,
    ) -> Self {
        Self {
            config,
            client,
            bridge,
            object_name,
            started_at: Instant::now(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// 上传数据源
    ///
    /// 分片计划依据数据源的实际大小计算，空数据源将直接上传一个空对象
    pub(crate) fn upload(&self, source: &PartsSource, part_size: PartSize) -> ObjectStorageResult<()> {
        let plan = PartPlan::with_part_size(source.size(), part_size);
        if plan.is_empty() {
            debug!("Source of {} is empty, uploads it as a whole object", self.object_name);
            return self.put_empty();
        }

        let upload_id = self
            .client
            .initiate_multipart_upload(self.config.bucket_name(), self.object_name)
            .map_err(|err| self.bridge.backend_error(err))?;
        debug!(
            "Multipart upload {} of {} is initiated, {} parts of {} bytes",
            upload_id,
            self.object_name,
            plan.part_count(),
            plan.part_size().as_u64(),
        );

        let result = self
            .upload_parts(&upload_id, &plan, source)
            .and_then(|parts| self.complete(&upload_id, &plan, parts));
        match &result {
            Ok(_) => info!(
                "Multipart upload {} of {} is completed, {} bytes in {:?}",
                upload_id,
                self.object_name,
                plan.file_length(),
                self.started_at.elapsed(),
            ),
            Err(err) => {
                debug!("Multipart upload {} of {} failed: {}", upload_id, self.object_name, err);
                if self.config.abort_on_failure() {
                    self.abort(&upload_id);
                }
            }
        }
        result
    }

    fn put_empty(&self) -> ObjectStorageResult<()> {
        let transfer = self.bridge.transfer();
        let on_progress = |info: &TransferProgressInfo| transfer.on_transfer(info);
        self.client
            .put_object(
                self.config.bucket_name(),
                self.object_name,
                &mut empty(),
                Some(0),
                &on_progress,
            )
            .map_err(|err| transfer.backend_error(err))
    }

    fn upload_parts(
        &self,
        upload_id: &str,
        plan: &PartPlan,
        source: &PartsSource,
    ) -> ObjectStorageResult<Vec<PartUploadResult>> {
        let progresses = PartProgresses::default();
        let concurrency = self.config.concurrency().get().min(plan.part_count());
        if concurrency <= 1 {
            return plan
                .parts()
                .iter()
                .map(|part| self.upload_part(upload_id, plan, part, source, &progresses))
                .collect();
        }

        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|i| format!("oss-transfer.multipart.{}", i))
            .build()
            .map_err(|err| ObjectStorageError::new(ErrorKind::LocalIoError, err))?;
        let next_part = AtomicUsize::new(0);
        let results = Mutex::new(Vec::with_capacity(plan.part_count()));
        thread_pool.scope_fifo(|s| {
            for _ in 0..concurrency {
                s.spawn_fifo(|_| {
                    while !self.cancelled.load(Ordering::SeqCst) {
                        let part = match plan.parts().get(next_part.fetch_add(1, Ordering::SeqCst)) {
                            Some(part) => part,
                            None => return,
                        };
                        let result = self.upload_part(upload_id, plan, part, source, &progresses);
                        let mut results = results.lock().unwrap_or_else(PoisonError::into_inner);
                        let failed = result.is_err();
                        results.push(result);
                        // 首个失败的结果入队后才取消其他分片，保证返回的是最初的错误
                        if failed {
                            self.cancelled.store(true, Ordering::SeqCst);
                        }
                    }
                })
            }
        });
        results
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .collect()
    }

    fn upload_part(
        &self,
        upload_id: &str,
        plan: &PartPlan,
        part: &Part,
        source: &PartsSource,
        progresses: &PartProgresses,
    ) -> ObjectStorageResult<PartUploadResult> {
        self.check_deadline()?;
        let key = progresses.start(part.part_number(), part.len());
        let request = UploadPartRequest::new(
            self.config.bucket_name(),
            self.object_name,
            upload_id,
            part.part_number(),
            part.len(),
        );
        let transfer = self.bridge.transfer();
        let on_progress = |info: &TransferProgressInfo| {
            if self.cancelled.load(Ordering::SeqCst) {
                bail!("upload of part {} is cancelled", part.part_number());
            }
            key.update(info.transferred_bytes());
            transfer.report(plan.file_length(), key.current_uploaded())
        };
        match self
            .client
            .upload_part(&request, &mut source.reader(part), &on_progress)
        {
            Ok(uploaded) => {
                key.complete();
                debug!(
                    "Part {} of multipart upload {} is uploaded, etag: {}",
                    part.part_number(),
                    upload_id,
                    uploaded.etag(),
                );
                Ok(uploaded)
            }
            Err(err) => {
                key.discard();
                Err(transfer.backend_error(err))
            }
        }
    }

    fn complete(&self, upload_id: &str, plan: &PartPlan, mut parts: Vec<PartUploadResult>) -> ObjectStorageResult<()> {
        parts.sort_by_key(|part| part.part_number());
        verify_part_results(&parts, plan.part_count())?;
        self.check_deadline()?;
        self.client
            .complete_multipart_upload(self.config.bucket_name(), self.object_name, upload_id, &parts)
            .map_err(|err| self.bridge.backend_error(err))
    }

    fn abort(&self, upload_id: &str) {
        match self
            .client
            .abort_multipart_upload(self.config.bucket_name(), self.object_name, upload_id)
        {
            Ok(_) => debug!("Multipart upload {} of {} is aborted", upload_id, self.object_name),
            Err(err) => warn!(
                "Failed to abort multipart upload {} of {}: {}",
                upload_id, self.object_name, err
            ),
        }
    }

    fn check_deadline(&self) -> ObjectStorageResult<()> {
        match self.config.deadline() {
            Some(deadline) if self.started_at.elapsed() >= deadline => Err(ObjectStorageError::new_with_msg(
                ErrorKind::Timeout,
                format!(
                    "multipart upload of {} exceeded the deadline of {:?}",
                    self.object_name, deadline
                ),
            )),
            _ => Ok(()),
        }
    }
}

/// 检查排序后的分片上传结果
///
/// 分片编号必须从 1 开始逐一递增，且数量与分片计划一致
pub(crate) fn verify_part_results(parts: &[PartUploadResult], part_count: usize) -> ObjectStorageResult<()> {
    if parts.len() != part_count {
        return Err(ObjectStorageError::new_with_msg(
            ErrorKind::InvalidPartResults,
            format!("expected {} part results, got {}", part_count, parts.len()),
        ));
    }
    for (index, part) in parts.iter().enumerate() {
        if part.part_number().get() != index + 1 {
            return Err(ObjectStorageError::new_with_msg(
                ErrorKind::InvalidPartResults,
                format!("expected part number {}, got {}", index + 1, part.part_number()),
            ));
        }
    }
    Ok(())
}
