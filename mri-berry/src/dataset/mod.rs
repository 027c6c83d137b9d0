//! 数据集操作: 摘要索引, 分层切片采样, 归一化与统一加载入口.

use std::path::{Path, PathBuf};

mod config;
mod facade;
pub mod normalize;
pub mod sampler;
pub mod summary;

pub use config::DatasetConfig;
pub use facade::{Batch, BratsDataset, LoadRequest};
pub use normalize::{Normalizer, SampledSlice};
pub use sampler::{Drawn, EmptyStratumPolicy, Pick, Selection, SliceSampler, Stratum};
pub use summary::{build_summary, Cohort, SkippedStudy, StudyRecord, Summary, SummaryReport};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}
