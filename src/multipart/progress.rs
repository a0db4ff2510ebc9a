use crossbeam_utils::Backoff;
use std::{
    collections::HashMap,
    fmt::{self, Debug},
    num::NonZeroUsize,
    sync::{Arc, RwLock},
};

/// 单个分片在进度累加器中的句柄
#[derive(Clone)]
pub(super) struct PartProgressKey {
    progresses: PartProgresses,
    part_number: NonZeroUsize,
    part_size: u64,
}

impl PartProgressKey {
    pub(super) fn update(&self, transferred: u64) -> bool {
        self.progresses.update(self, transferred)
    }

    pub(super) fn complete(&self) -> bool {
        self.progresses.complete(self)
    }

    pub(super) fn discard(&self) -> bool {
        self.progresses.discard(self)
    }

    pub(super) fn current_uploaded(&self) -> u64 {
        self.progresses.current_uploaded()
    }
}

impl Debug for PartProgressKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.part_number.fmt(f)
    }
}

/// 整个文件的上传进度累加器
///
/// 已完成分片的大小加上所有进行中分片的已传输字节数
#[derive(Clone, Debug, Default)]
pub(super) struct PartProgresses(Arc<RwLock<PartProgressesInner>>);

#[derive(Debug, Default)]
struct PartProgressesInner {
    completed: u64,
    in_flight: HashMap<NonZeroUsize, u64>,
}

impl PartProgresses {
    pub(super) fn start(&self, part_number: NonZeroUsize, part_size: u64) -> PartProgressKey {
        self.try_write(|inner| {
            inner.in_flight.insert(part_number, 0);
        });
        PartProgressKey {
            progresses: self.to_owned(),
            part_number,
            part_size,
        }
    }

    pub(super) fn current_uploaded(&self) -> u64 {
        self.try_read(|inner| inner.completed + inner.in_flight.values().sum::<u64>())
    }

    fn update(&self, key: &PartProgressKey, transferred: u64) -> bool {
        self.try_write(|inner| {
            if let Some(value) = inner.in_flight.get_mut(&key.part_number) {
                *value = transferred.min(key.part_size);
                true
            } else {
                false
            }
        })
    }

    fn complete(&self, key: &PartProgressKey) -> bool {
        self.try_write(|inner| {
            if inner.in_flight.remove(&key.part_number).is_some() {
                inner.completed += key.part_size;
                true
            } else {
                false
            }
        })
    }

    fn discard(&self, key: &PartProgressKey) -> bool {
        self.try_write(|inner| inner.in_flight.remove(&key.part_number).is_some())
    }

    fn try_write<F: FnOnce(&mut PartProgressesInner) -> T, T>(&self, f: F) -> T {
        let backoff = Backoff::new();
        loop {
            if let Ok(mut inner) = self.0.try_write() {
                return f(&mut inner);
            } else {
                backoff.spin();
            }
        }
    }

    fn try_read<F: FnOnce(&PartProgressesInner) -> T, T>(&self, f: F) -> T {
        let backoff = Backoff::new();
        loop {
            if let Ok(inner) = self.0.try_read() {
                return f(&inner);
            } else {
                backoff.spin();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::spawn as thread_spawn;

    const PART_SIZE: u64 = 1 << 16;

    #[test]
    fn test_part_progresses() {
        let progresses = PartProgresses::default();

        let threads: Vec<_> = (1..=3)
            .map(|part_number| {
                let key = progresses.start(NonZeroUsize::new(part_number).unwrap(), PART_SIZE);
                thread_spawn(move || {
                    for uploaded in (0..=PART_SIZE).step_by(64) {
                        assert!(key.update(uploaded));
                    }
                    assert!(key.complete());
                    assert!(!key.complete());
                })
            })
            .collect();

        let mut last_uploaded = 0u64;
        loop {
            let current_uploaded = progresses.current_uploaded();
            assert!(current_uploaded >= last_uploaded);
            assert!(current_uploaded <= 3 * PART_SIZE);
            if current_uploaded >= 3 * PART_SIZE {
                break;
            }
            last_uploaded = current_uploaded;
        }

        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(progresses.current_uploaded(), 3 * PART_SIZE);
    }

    #[test]
    fn test_discarded_part_is_not_counted() {
        let progresses = PartProgresses::default();
        let key = progresses.start(NonZeroUsize::new(1).unwrap(), PART_SIZE);
        assert!(key.update(100));
        assert_eq!(key.current_uploaded(), 100);
        assert!(key.discard());
        assert_eq!(progresses.current_uploaded(), 0);
        assert!(!key.update(200));
    }
}
