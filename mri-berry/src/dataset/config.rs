//! 数据集配置与根目录解析.

use super::home_dataset_dir_with;
use super::sampler::EmptyStratumPolicy;
use crate::consts::{DEFAULT_VALID_RATIO, FALLBACK_ROOT, ROOT_ENV, WELL_KNOWN_ROOT};
use crate::data::VolumeGeometry;
use crate::error::{DataError, DataResult};
use std::env;
use std::path::{Path, PathBuf};

/// 数据集配置.
#[derive(Clone, Debug)]
pub struct DatasetConfig {
    root: Option<PathBuf>,
    valid_ratio: f64,
    geometry: VolumeGeometry,
    empty_stratum: EmptyStratumPolicy,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: None,
            valid_ratio: DEFAULT_VALID_RATIO,
            geometry: VolumeGeometry::default(),
            empty_stratum: EmptyStratumPolicy::default(),
        }
    }
}

impl DatasetConfig {
    /// 指定数据根目录. 不指定时按 [`DatasetConfig::resolve_root`] 的顺序查找.
    pub fn root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.root = Some(root.as_ref().to_owned());
        self
    }

    /// 构建摘要时划入验证集的概率, 须在 `[0, 1]` 内.
    pub fn valid_ratio(mut self, ratio: f64) -> Self {
        self.valid_ratio = ratio;
        self
    }

    /// 体数据切片几何约定.
    pub fn geometry(mut self, geometry: VolumeGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// 选中的分层为空时的处理策略.
    pub fn empty_stratum(mut self, policy: EmptyStratumPolicy) -> Self {
        self.empty_stratum = policy;
        self
    }

    /// 验证集划分比例.
    #[inline]
    pub fn get_valid_ratio(&self) -> f64 {
        self.valid_ratio
    }

    /// 切片几何约定.
    #[inline]
    pub fn get_geometry(&self) -> VolumeGeometry {
        self.geometry
    }

    /// 空分层处理策略.
    #[inline]
    pub fn get_empty_stratum(&self) -> EmptyStratumPolicy {
        self.empty_stratum
    }

    /// 检查参数合法性.
    pub fn validate(&self) -> DataResult<()> {
        check_valid_ratio(self.valid_ratio)
    }

    /// 解析数据根目录.
    ///
    /// 1. 若显式指定了根目录, 则使用它;
    /// 2. 否则, 若环境变量 `$BRATS_NPY_DIR` 非空, 则使用其值;
    /// 3. 否则, 依次尝试 `/data/brats/npy`, `$HOME/dataset/brats/npy`, `../data`,
    ///   取第一个存在的目录.
    ///
    /// 最终结果不是已存在的目录时, 返回 [`DataError::NotFound`].
    pub fn resolve_root(&self) -> DataResult<PathBuf> {
        let root = match &self.root {
            Some(p) => p.clone(),
            None => match env::var(ROOT_ENV) {
                Ok(d) if !d.is_empty() => PathBuf::from(d),
                _ => default_roots()
                    .into_iter()
                    .find(|p| p.is_dir())
                    .ok_or_else(|| DataError::NotFound("no default data root exists".into()))?,
            },
        };
        if root.is_dir() {
            Ok(root)
        } else {
            Err(DataError::NotFound(format!(
                "data root `{}` is not a directory",
                root.display()
            )))
        }
    }
}

/// 未显式指定根目录时的候选位置, 按优先级排列.
fn default_roots() -> Vec<PathBuf> {
    let mut ans = vec![PathBuf::from(WELL_KNOWN_ROOT)];
    ans.extend(home_dataset_dir_with(["brats", "npy"]));
    ans.push(PathBuf::from(FALLBACK_ROOT));
    ans
}

/// `ratio` 必须是 `[0, 1]` 内的有限数.
pub(crate) fn check_valid_ratio(ratio: f64) -> DataResult<()> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(())
    } else {
        Err(DataError::InvalidConfiguration(format!(
            "valid ratio must be within [0, 1], got {ratio}"
        )))
    }
}
