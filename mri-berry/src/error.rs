//! 运行时错误.

use std::path::PathBuf;
use thiserror::Error;

/// 数据访问层的统一错误.
#[derive(Debug, Error)]
pub enum DataError {
    /// 摘要尚未加载就请求了采样.
    #[error("summary has not been loaded")]
    NotInitialized,

    /// 未知的 study id, 空队列, 或无法定位的根目录.
    #[error("not found: {0}")]
    NotFound(String),

    /// 参数不合法, 例如 `valid_ratio` 越界或 `n == 0`.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// 该 study 正强度体素的标准差为 0 或未定义.
    #[error("degenerate statistics for study `{study_id}` (mean = {mean}, sd = {sd})")]
    DegenerateStatistics {
        /// study id.
        study_id: String,
        /// 均值.
        mean: f64,
        /// 标准差.
        sd: f64,
    },

    /// 分层采样找不到任何候选切片.
    #[error("no candidate slice in study `{study_id}` (positive stratum: {positive})")]
    EmptyCandidateSet {
        /// study id.
        study_id: String,
        /// 最后一次尝试的分层是否为阳性.
        positive: bool,
    },

    /// 精确查找的切片索引越界.
    #[error("slice {index} is out of range for study `{study_id}` ({len} slices)")]
    SliceOutOfRange {
        /// study id.
        study_id: String,
        /// 请求的索引.
        index: usize,
        /// 实际切片数.
        len: usize,
    },

    /// 体数据文件与约定的形状不符.
    #[error("malformed volume `{path}`: {reason}")]
    MalformedVolume {
        /// 文件路径.
        path: PathBuf,
        /// 具体原因.
        reason: String,
    },

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 以 npy 格式查看数据失败.
    #[error(transparent)]
    ViewNpy(#[from] ndarray_npy::ViewNpyError),

    /// ndarray 形状错误.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// 摘要文件编解码错误.
    #[error(transparent)]
    Summary(#[from] bincode::Error),
}

/// 数据访问层结果.
pub type DataResult<T> = Result<T, DataError>;
