//! 对 `mri-berry::dataset` 的更一层封装. 提供更直接的数据集加载器.

use mri_berry::{BratsDataset, DataResult, DatasetConfig};

/// 按默认顺序解析根目录并创建数据集上下文:
/// `$BRATS_NPY_DIR`, `/data/brats/npy`, `$HOME/dataset/brats/npy`, `../data`.
///
/// 给出 `seed` 时随机源可复现. 摘要尚未加载.
pub fn dataset_from_env_or_home(valid_ratio: f64, seed: Option<u64>) -> DataResult<BratsDataset> {
    let config = DatasetConfig::default().valid_ratio(valid_ratio);
    match seed {
        Some(seed) => BratsDataset::seeded(config, seed),
        None => BratsDataset::new(config),
    }
}
