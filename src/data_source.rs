use super::Part;
use std::{
    fmt::Debug,
    fs::File,
    io::{Error as IoError, ErrorKind as IoErrorKind, Read, Result as IoResult, Seek, SeekFrom},
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

/// 分片上传数据源
///
/// 持有一个可寻址的数据源，可以并发地为多个互不重叠的分片创建阅读器
#[derive(Debug, Clone)]
pub(crate) struct PartsSource {
    source: Arc<Mutex<SeekableSourceInner<dyn ReadSeek>>>,
    size: u64,
}

impl PartsSource {
    /// 打开本地文件作为数据源
    pub(crate) fn open(path: impl AsRef<Path>) -> IoResult<Self> {
        Self::from_file(File::open(path)?)
    }

    /// 使用已打开的文件作为数据源
    ///
    /// 数据源大小取自文件元信息
    pub(crate) fn from_file(file: File) -> IoResult<Self> {
        let size = file.metadata()?.len();
        Ok(Self::new(file, size))
    }

    /// 使用可寻址的输入流作为数据源
    #[inline]
    pub(crate) fn new(source: impl Read + Seek + Debug + Send + Sync + 'static, size: u64) -> Self {
        Self {
            source: Arc::new(Mutex::new(SeekableSourceInner::new(source))),
            size,
        }
    }

    /// 获取数据源大小
    #[inline]
    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// 为指定分片创建阅读器
    ///
    /// 阅读器只能读取 `[offset, offset + len)` 区间内的数据
    #[inline]
    pub(crate) fn reader(&self, part: &Part) -> PartReader {
        PartReader {
            source: self.source.to_owned(),
            offset: part.offset(),
            len: part.len(),
            read: 0,
        }
    }
}

/// 分片阅读器
#[derive(Debug)]
pub(crate) struct PartReader {
    source: Arc<Mutex<SeekableSourceInner<dyn ReadSeek>>>,
    offset: u64,
    len: u64,
    read: u64,
}

impl PartReader {
    fn lock(&self) -> IoResult<MutexGuard<'_, SeekableSourceInner<dyn ReadSeek>>> {
        self.source
            .lock()
            .map_err(|_| IoError::new(IoErrorKind::Other, "parts source lock is poisoned"))
    }
}

impl Read for PartReader {
    fn read(&mut self, mut buf: &mut [u8]) -> IoResult<usize> {
        let max_read = self.len - self.read;
        if max_read == 0 {
            return Ok(0);
        } else if max_read < buf.len() as u64 {
            let max_read: usize = max_read.try_into().unwrap_or(usize::MAX);
            buf = &mut buf[..max_read];
        }
        let seek_pos = self.offset + self.read;
        let mut locked = self.lock()?;
        if Some(seek_pos) != locked.pos {
            locked.pos = Some(locked.source.seek(SeekFrom::Start(seek_pos))?);
        }
        let have_read = locked.source.read(buf)?;
        if let Some(ref mut pos) = locked.pos {
            *pos += have_read as u64;
        }
        drop(locked);
        if have_read == 0 && !buf.is_empty() {
            return Err(IoError::new(
                IoErrorKind::UnexpectedEof,
                "source is shorter than the planned part",
            ));
        }
        self.read += have_read as u64;
        Ok(have_read)
    }
}

trait ReadSeek: Read + Seek + Send + Sync + Debug {}
impl<T: Read + Seek + Send + Sync + Debug> ReadSeek for T {}

#[derive(Debug)]
struct SeekableSourceInner<T: Read + Seek + Send + Sync + Debug + ?Sized> {
    pos: Option<u64>,
    source: T,
}

impl<T: Read + Seek + Send + Sync + Debug> SeekableSourceInner<T> {
    fn new(source: T) -> Self {
        Self { source, pos: None }
    }
}
