//! 摘要索引: 每个 study 的强度统计量与队列划分.
//!
//! 摘要通过扫描根目录下所有 study 一次性构建, 以 bincode 持久化到
//! `{root}/summary.bin`, 并在进程启动时重新加载.

use super::config::check_valid_ratio;
use super::normalize::Normalizer;
use crate::consts::{INPUT_FILE, SUMMARY_FILE};
use crate::data::{StudyVolumes, VolumeGeometry};
use crate::error::{DataError, DataResult};
use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// 队列.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Cohort {
    /// 训练集.
    Train,

    /// 验证集.
    Valid,
}

impl Cohort {
    /// 精确查找时的搜索顺序.
    pub const SEARCH_ORDER: [Cohort; 2] = [Cohort::Train, Cohort::Valid];

    /// 名称.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Valid => "valid",
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个 study 的摘要记录.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudyRecord {
    /// 唯一标识, 即磁盘上的目录名.
    pub study_id: String,

    /// 正强度体素的均值.
    pub mean: f64,

    /// 正强度体素的总体标准差.
    pub sd: f64,

    /// 所属队列. 构建时确定, 之后不再改变.
    pub cohort: Cohort,
}

impl StudyRecord {
    /// 统计量是否无法用于归一化. 判定与 [`Normalizer::new`] 一致.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        Normalizer::new(self.mean, self.sd).is_none()
    }
}

/// 完整的摘要索引: 队列到有序 study 记录序列的映射.
///
/// 所有 `study_id` 在两个队列间全局唯一.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    train: Vec<StudyRecord>,
    valid: Vec<StudyRecord>,
}

impl Summary {
    /// 空摘要.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条记录到其所属队列末尾. `study_id` 重复时返回错误.
    pub fn push(&mut self, record: StudyRecord) -> DataResult<()> {
        if self.contains(&record.study_id) {
            return Err(DataError::InvalidConfiguration(format!(
                "duplicate study id `{}`",
                record.study_id
            )));
        }
        self.cohort_mut(record.cohort).push(record);
        Ok(())
    }

    /// 队列 `cohort` 下的全部记录, 按加入顺序排列.
    #[inline]
    pub fn cohort(&self, cohort: Cohort) -> &[StudyRecord] {
        match cohort {
            Cohort::Train => &self.train,
            Cohort::Valid => &self.valid,
        }
    }

    #[inline]
    fn cohort_mut(&mut self, cohort: Cohort) -> &mut Vec<StudyRecord> {
        match cohort {
            Cohort::Train => &mut self.train,
            Cohort::Valid => &mut self.valid,
        }
    }

    /// 按 `train`, `valid` 的顺序查找第一个 `study_id` 匹配的记录.
    pub fn find(&self, study_id: &str) -> Option<&StudyRecord> {
        Cohort::SEARCH_ORDER
            .iter()
            .flat_map(|c| self.cohort(*c))
            .find(|r| r.study_id == study_id)
    }

    /// 是否存在该 study.
    #[inline]
    pub fn contains(&self, study_id: &str) -> bool {
        self.find(study_id).is_some()
    }

    /// 按 `train`, `valid` 的顺序迭代所有记录.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &StudyRecord> {
        self.train.iter().chain(self.valid.iter())
    }

    /// study 总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.train.len() + self.valid.len()
    }

    /// 是否没有任何 study.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 检查不变量: id 全局唯一, 记录的队列与所在序列一致.
    pub fn validate(&self) -> DataResult<()> {
        let mut seen = HashSet::with_capacity(self.len());
        for cohort in Cohort::SEARCH_ORDER {
            for r in self.cohort(cohort) {
                if r.cohort != cohort {
                    return Err(DataError::InvalidConfiguration(format!(
                        "study `{}` is tagged {} but stored under {cohort}",
                        r.study_id, r.cohort
                    )));
                }
                if !seen.insert(r.study_id.as_str()) {
                    return Err(DataError::InvalidConfiguration(format!(
                        "duplicate study id `{}`",
                        r.study_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// 持久化到 `path`.
    ///
    /// 先写入同目录下的临时文件再重命名, 读者不会看到写了一半的摘要.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> DataResult<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        {
            let mut w = BufWriter::new(File::create(&tmp)?);
            bincode::serialize_into(&mut w, self)?;
            w.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// 从 `path` 加载, 并检查不变量.
    pub fn load<P: AsRef<Path>>(path: P) -> DataResult<Self> {
        let r = BufReader::new(File::open(path.as_ref())?);
        let summary: Self = bincode::deserialize_from(r)?;
        summary.validate()?;
        Ok(summary)
    }
}

/// 构建时被跳过的 study 及原因.
#[derive(Debug)]
pub struct SkippedStudy {
    /// study 目录名.
    pub study_id: String,

    /// 跳过原因.
    pub error: DataError,
}

/// 一次摘要构建的结果.
#[derive(Debug)]
pub struct SummaryReport {
    /// 构建出的摘要 (已写盘).
    pub summary: Summary,

    /// 被跳过的 study.
    pub skipped: Vec<SkippedStudy>,
}

/// 摘要文件在根目录下的路径.
#[inline]
pub fn summary_path<P: AsRef<Path>>(root: P) -> PathBuf {
    root.as_ref().join(SUMMARY_FILE)
}

/// 列出 `root` 下所有含有输入体数据文件的 study 目录, 按目录名排序.
pub fn scan_studies<P: AsRef<Path>>(root: P) -> DataResult<Vec<(String, PathBuf)>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(DataError::NotFound(format!(
            "data root `{}` is not a directory",
            root.display()
        )));
    }
    let mut ans = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if !path.join(INPUT_FILE).is_file() {
            continue;
        }
        match path.file_name().and_then(|s| s.to_str()) {
            Some(name) => ans.push((name.to_string(), path.clone())),
            None => warn!("Skipping non UTF-8 study directory {}", path.display()),
        }
    }
    ans.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    Ok(ans)
}

/// 扫描 `root` 下所有 study, 构建摘要并写入 `{root}/summary.bin`.
///
/// 每个 study 以概率 `valid_ratio` 独立地划入验证集, 否则划入训练集.
/// 队列在读取体数据之前抽取, 因此在固定随机源下划分结果与读取失败无关.
///
/// 单个 study 的失败 (文件缺失, 形状不符, 统计量退化) 不会中止构建,
/// 而是记录在 [`SummaryReport::skipped`] 中.
pub fn build_summary<P, R>(
    root: P,
    valid_ratio: f64,
    geometry: VolumeGeometry,
    rng: &mut R,
) -> DataResult<SummaryReport>
where
    P: AsRef<Path>,
    R: Rng + ?Sized,
{
    check_valid_ratio(valid_ratio)?;
    let root = root.as_ref();
    let studies = scan_studies(root)?;

    let mut summary = Summary::new();
    let mut skipped = Vec::new();
    let total = studies.len();
    for (n, (study_id, dir)) in studies.into_iter().enumerate() {
        info!("Summarizing study {:03}/{total:03}: {study_id}", n + 1);
        let cohort = if rng.gen_bool(valid_ratio) {
            Cohort::Valid
        } else {
            Cohort::Train
        };

        match summarize_study(&study_id, &dir, geometry, cohort) {
            Ok(record) => summary.push(record)?,
            Err(error) => {
                warn!("Skipping study `{study_id}`: {error}");
                skipped.push(SkippedStudy { study_id, error });
            }
        }
    }

    summary.save(summary_path(root))?;
    info!(
        "Summary written: {} train, {} valid, {} skipped",
        summary.cohort(Cohort::Train).len(),
        summary.cohort(Cohort::Valid).len(),
        skipped.len()
    );
    Ok(SummaryReport { summary, skipped })
}

/// 统计单个 study. 标签文件会一并打开, 以检查两者形状一致.
fn summarize_study(
    study_id: &str,
    dir: &Path,
    geometry: VolumeGeometry,
    cohort: Cohort,
) -> DataResult<StudyRecord> {
    let volumes = StudyVolumes::open(dir, geometry)?;
    let stats = volumes.positive_stats();
    let record = StudyRecord {
        study_id: study_id.to_string(),
        mean: stats.mean(),
        sd: stats.sd(),
        cohort,
    };
    if record.is_degenerate() {
        return Err(DataError::DegenerateStatistics {
            study_id: record.study_id,
            mean: record.mean,
            sd: record.sd,
        });
    }
    Ok(record)
}
