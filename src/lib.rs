#![cfg_attr(feature = "docs", feature(doc_cfg))]
#![deny(
    absolute_paths_not_starting_with_crate,
    anonymous_parameters,
    explicit_outlives_requirements,
    keyword_idents,
    macro_use_extern_crate,
    meta_variable_misuse,
    missing_debug_implementations,
    non_ascii_idents,
    trivial_numeric_casts,
    unsafe_code,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications
)]

//! # oss-transfer
//!
//! ## 对象存储传输库
//!
//! 为对象存储提供统一的上传，下载，删除接口，支持将大文件切分为固定大小的分片上传，
//! 并将所有分片的传输进度汇总为整个对象的进度。
//!
//! 实际的网络传输由 [`ObjectStoreBackend`] 的实现完成，本库自带一个 [`MemoryBackend`]。

mod backend;
mod config;
mod credential;
mod data_source;
mod error;
mod multipart;
mod object_url;
mod part_plan;
mod progress;
mod service;

pub use backend::{BackendClient, MemoryBackend, ObjectStoreBackend, OnProgress, PartUploadResult, UploadPartRequest};
pub use config::{ConfigError, ObjectStorageConfig, ObjectStorageConfigBuilder};
pub use credential::Credential;
pub use error::{ErrorKind, ObjectStorageError, ObjectStorageResult};
pub use object_url::ObjectUrlResolver;
pub use part_plan::{Part, PartPlan, PartSize};
pub use progress::{NoopProgress, ObjectStorageProgress, TransferProgressInfo};
pub use service::{ObjectStorageManager, ObjectStorageManagerBuilder, ObjectStorageResponse, ObjectStorageService};

use data_source::PartsSource;
use progress::ProgressBridge;

/// 将所有 Trait 全部重新导出，方便统一导入
pub mod prelude {
    pub use super::{BackendClient, ObjectStorageProgress, ObjectStorageService, ObjectStoreBackend};
}
