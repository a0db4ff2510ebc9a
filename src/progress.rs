use super::{ErrorKind, ObjectStorageError, ObjectStorageResult};
use anyhow::Result as AnyResult;
use auto_impl::auto_impl;
use log::warn;
use std::{
    fmt::Debug,
    io::Error as IoError,
    sync::atomic::{AtomicBool, Ordering},
};

/// 上传下载进度接口
///
/// 由调用方实现，接收对象传输的进度，成功和失败通知。
/// 任何回调返回错误都会导致整个操作失败。
#[auto_impl(&, Box, Arc)]
pub trait ObjectStorageProgress: Debug + Send + Sync {
    /// 传输进度
    ///
    /// `percent` 取值范围为 `[0, 100]`，总大小未知时 `total_bytes` 为 0
    fn progress(&self, object_name: &str, percent: f64, total_bytes: u64, current_written_bytes: u64)
        -> AnyResult<()>;

    /// 传输成功
    fn success(&self, object_name: &str) -> AnyResult<()>;

    /// 传输失败
    fn failed(&self, object_name: &str) -> AnyResult<()>;
}

/// 不做任何事的进度接口实现
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ObjectStorageProgress for NoopProgress {
    #[inline]
    fn progress(&self, _object_name: &str, _percent: f64, _total_bytes: u64, _current_written_bytes: u64) -> AnyResult<()> {
        Ok(())
    }

    #[inline]
    fn success(&self, _object_name: &str) -> AnyResult<()> {
        Ok(())
    }

    #[inline]
    fn failed(&self, _object_name: &str) -> AnyResult<()> {
        Ok(())
    }
}

/// 传输进度信息
///
/// 由后端在每次传输一段数据后提供
#[derive(Debug, Clone, Copy)]
pub struct TransferProgressInfo {
    transferred_bytes: u64,
    total_bytes: Option<u64>,
}

impl TransferProgressInfo {
    #[inline]
    pub fn new(transferred_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            transferred_bytes,
            total_bytes,
        }
    }

    /// 获取已经传输的字节数
    #[inline]
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    /// 获取总字节数
    #[inline]
    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }
}

/// 进度桥接器
///
/// 绑定一个对象名称，将后端的传输进度转换为 [`ObjectStorageProgress`] 回调，
/// 并保证每次操作只会发出一次成功或失败通知
#[derive(Debug)]
pub(crate) struct ProgressBridge<'a> {
    object_name: &'a str,
    sink: &'a dyn ObjectStorageProgress,
}

impl<'a> ProgressBridge<'a> {
    pub(crate) fn new(object_name: &'a str, sink: &'a dyn ObjectStorageProgress) -> Self {
        Self { object_name, sink }
    }

    /// 开始一次数据传输
    ///
    /// 每次后端调用（单次上传下载，或一个分片）都应使用独立的传输监听器，
    /// 以便只根据本次传输的回调结果判断错误类型
    #[inline]
    pub(crate) fn transfer(&self) -> TransferListener<'_> {
        TransferListener {
            bridge: self,
            callback_failed: AtomicBool::new(false),
        }
    }

    fn report(&self, total_bytes: u64, current_written_bytes: u64) -> AnyResult<()> {
        self.sink.progress(
            self.object_name,
            percent(total_bytes, current_written_bytes),
            total_bytes,
            current_written_bytes,
        )
    }

    /// 将后端返回的错误转换为对象存储错误
    ///
    /// 如果错误源自本地数据源或目标文件，则错误类型为 [`ErrorKind::LocalIoError`]
    pub(crate) fn backend_error(&self, err: anyhow::Error) -> ObjectStorageError {
        if err.downcast_ref::<IoError>().is_some() {
            ObjectStorageError::new(ErrorKind::LocalIoError, err)
        } else {
            ObjectStorageError::from_backend(err)
        }
    }

    pub(crate) fn finish<T>(&self, result: ObjectStorageResult<T>) -> ObjectStorageResult<T> {
        match result {
            Ok(value) => {
                self.sink
                    .success(self.object_name)
                    .map_err(ObjectStorageError::from_callback)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(callback_err) = self.sink.failed(self.object_name) {
                    warn!(
                        "Failed callback of {} returned error: {}, original error: {}",
                        self.object_name, callback_err, err
                    );
                }
                Err(err)
            }
        }
    }
}

/// 传输监听器
///
/// 记录本次传输中进度回调是否失败过
#[derive(Debug)]
pub(crate) struct TransferListener<'b> {
    bridge: &'b ProgressBridge<'b>,
    callback_failed: AtomicBool,
}

impl TransferListener<'_> {
    pub(crate) fn on_transfer(&self, info: &TransferProgressInfo) -> AnyResult<()> {
        self.report(info.total_bytes().unwrap_or(0), info.transferred_bytes())
    }

    pub(crate) fn report(&self, total_bytes: u64, current_written_bytes: u64) -> AnyResult<()> {
        self.bridge
            .report(total_bytes, current_written_bytes)
            .map_err(|err| {
                self.callback_failed.store(true, Ordering::SeqCst);
                err
            })
    }

    /// 将本次传输中后端返回的错误转换为对象存储错误
    ///
    /// 如果本次传输的进度回调返回过错误，则错误类型为 [`ErrorKind::CallbackError`]
    pub(crate) fn backend_error(&self, err: anyhow::Error) -> ObjectStorageError {
        if self.callback_failed.load(Ordering::SeqCst) {
            ObjectStorageError::from_callback(err)
        } else {
            self.bridge.backend_error(err)
        }
    }
}

fn percent(total_bytes: u64, current_written_bytes: u64) -> f64 {
    match total_bytes {
        0 => 0.0,
        total => (current_written_bytes as f64 * 100.0 / total as f64).min(100.0),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Event {
        Progress {
            object_name: String,
            percent: f64,
            total_bytes: u64,
            current_written_bytes: u64,
        },
        Success(String),
        Failed(String),
    }

    /// 记录所有回调的进度接口实现
    #[derive(Debug, Default)]
    pub(crate) struct RecordingProgress {
        events: Mutex<Vec<Event>>,
        fail_progress_after: Option<usize>,
        fail_success: bool,
    }

    impl RecordingProgress {
        pub(crate) fn failing_progress_after(calls: usize) -> Self {
            Self {
                fail_progress_after: Some(calls),
                ..Default::default()
            }
        }

        pub(crate) fn failing_success() -> Self {
            Self {
                fail_success: true,
                ..Default::default()
            }
        }

        pub(crate) fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().to_owned()
        }

        pub(crate) fn progresses(&self) -> Vec<(f64, u64, u64)> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    Event::Progress {
                        percent,
                        total_bytes,
                        current_written_bytes,
                        ..
                    } => Some((percent, total_bytes, current_written_bytes)),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn successes(&self) -> usize {
            self.events()
                .iter()
                .filter(|event| matches!(event, Event::Success(_)))
                .count()
        }

        pub(crate) fn failures(&self) -> usize {
            self.events()
                .iter()
                .filter(|event| matches!(event, Event::Failed(_)))
                .count()
        }
    }

    impl ObjectStorageProgress for RecordingProgress {
        fn progress(&self, object_name: &str, percent: f64, total_bytes: u64, current_written_bytes: u64) -> AnyResult<()> {
            let mut events = self.events.lock().unwrap();
            let calls = events.iter().filter(|e| matches!(e, Event::Progress { .. })).count();
            events.push(Event::Progress {
                object_name: object_name.to_owned(),
                percent,
                total_bytes,
                current_written_bytes,
            });
            match self.fail_progress_after {
                Some(limit) if calls + 1 >= limit => Err(anyhow!("progress callback refused")),
                _ => Ok(()),
            }
        }

        fn success(&self, object_name: &str) -> AnyResult<()> {
            self.events.lock().unwrap().push(Event::Success(object_name.to_owned()));
            if self.fail_success {
                Err(anyhow!("success callback refused"))
            } else {
                Ok(())
            }
        }

        fn failed(&self, object_name: &str) -> AnyResult<()> {
            self.events.lock().unwrap().push(Event::Failed(object_name.to_owned()));
            Ok(())
        }
    }

    #[test]
    fn test_bridge_maps_ticks_to_progress() -> anyhow::Result<()> {
        let sink = RecordingProgress::default();
        let bridge = ProgressBridge::new("a/b.txt", &sink);
        let transfer = bridge.transfer();
        transfer.on_transfer(&TransferProgressInfo::new(25, Some(100)))?;
        transfer.on_transfer(&TransferProgressInfo::new(100, Some(100)))?;
        transfer.on_transfer(&TransferProgressInfo::new(10, None))?;
        bridge.finish(Ok(()))?;

        assert_eq!(
            sink.events(),
            vec![
                Event::Progress {
                    object_name: "a/b.txt".to_owned(),
                    percent: 25.0,
                    total_bytes: 100,
                    current_written_bytes: 25,
                },
                Event::Progress {
                    object_name: "a/b.txt".to_owned(),
                    percent: 100.0,
                    total_bytes: 100,
                    current_written_bytes: 100,
                },
                Event::Progress {
                    object_name: "a/b.txt".to_owned(),
                    percent: 0.0,
                    total_bytes: 0,
                    current_written_bytes: 10,
                },
                Event::Success("a/b.txt".to_owned()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_bridge_reports_single_failure() {
        let sink = RecordingProgress::default();
        let bridge = ProgressBridge::new("obj", &sink);
        let err = bridge
            .finish::<()>(Err(ObjectStorageError::from_backend(anyhow!("boom"))))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendError);
        assert_eq!(sink.successes(), 0);
        assert_eq!(sink.failures(), 1);
    }

    #[test]
    fn test_bridge_classifies_callback_errors() {
        let sink = RecordingProgress::failing_progress_after(1);
        let bridge = ProgressBridge::new("obj", &sink);
        let transfer = bridge.transfer();
        let callback_err = transfer
            .on_transfer(&TransferProgressInfo::new(1, Some(2)))
            .unwrap_err();
        assert_eq!(transfer.backend_error(callback_err).kind(), ErrorKind::CallbackError);
    }

    #[test]
    fn test_callback_failure_is_tracked_per_transfer() {
        let sink = RecordingProgress::failing_progress_after(1);
        let bridge = ProgressBridge::new("obj", &sink);
        let refused = bridge.transfer();
        let other = bridge.transfer();

        let callback_err = refused.report(10, 5).unwrap_err();
        assert_eq!(other.backend_error(anyhow!("connection reset")).kind(), ErrorKind::BackendError);
        assert_eq!(
            other
                .backend_error(anyhow::Error::new(IoError::new(std::io::ErrorKind::UnexpectedEof, "short")))
                .kind(),
            ErrorKind::LocalIoError
        );
        assert_eq!(refused.backend_error(callback_err).kind(), ErrorKind::CallbackError);
        assert_eq!(bridge.backend_error(anyhow!("boom")).kind(), ErrorKind::BackendError);
    }

    #[test]
    fn test_bridge_failing_success_callback() {
        let sink = RecordingProgress::failing_success();
        let bridge = ProgressBridge::new("obj", &sink);
        let err = bridge.finish(Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CallbackError);
        assert_eq!(sink.successes(), 1);
        assert_eq!(sink.failures(), 0);
    }
}
