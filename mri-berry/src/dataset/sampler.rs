//! 切片选取: 按 study id 精确查找, 或按阳/阴性分层随机采样.

use super::summary::{Cohort, StudyRecord, Summary};
use crate::data::{StudyVolumes, VolumeGeometry};
use crate::error::{DataError, DataResult};
use itertools::Itertools;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;

/// 切片分层.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stratum {
    /// 至少含有一个阳性标签体素.
    Positive,

    /// 不含任何阳性标签体素.
    Negative,
}

impl Stratum {
    /// 以 0.5 的概率抽取一个分层.
    #[inline]
    pub fn coin_flip<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            Self::Positive
        } else {
            Self::Negative
        }
    }

    /// 另一个分层.
    #[inline]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Positive => Self::Negative,
            Self::Negative => Self::Positive,
        }
    }

    /// 是否为阳性分层.
    #[inline]
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive)
    }

    /// 阳性标记为 `positive` 的切片是否属于该分层.
    #[inline]
    pub fn matches(&self, positive: bool) -> bool {
        self.is_positive() == positive
    }
}

/// 抽中的分层没有候选切片时的处理策略.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum EmptyStratumPolicy {
    /// 改用同一 study 的另一个分层. 两个分层都为空时才失败.
    #[default]
    Fallback,

    /// 直接返回 [`DataError::EmptyCandidateSet`].
    Fail,
}

/// 一次选取的结果.
#[derive(Clone, Debug, PartialEq)]
pub struct Pick {
    /// 被选中的 study. 其 `cohort` 即实际使用的队列.
    pub record: StudyRecord,

    /// 切片索引.
    pub slice_index: usize,

    /// 随机模式下切片所属的分层; 精确模式下为 `None`.
    pub stratum: Option<Stratum>,
}

/// 选取结果连同已打开的体数据.
#[derive(Debug)]
pub struct Drawn {
    /// 选取结果.
    pub pick: Pick,

    /// 该 study 的体数据.
    pub volumes: StudyVolumes,
}

/// 选取模式. 两种模式互斥.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// 按 study id 和切片索引精确查找. 只产生一个结果.
    Exact {
        /// study id.
        study_id: String,
        /// 切片索引.
        slice_index: usize,
    },

    /// 从队列中有放回地随机抽取 `n` 次.
    Random {
        /// 队列.
        cohort: Cohort,
        /// 抽取次数.
        n: usize,
    },
}

/// 在逐切片阳性标记 `flags` 上做一次分层选取.
///
/// 先以 0.5 的概率选定分层, 再在该分层的候选切片中均匀选取一个.
/// 选中的分层为空时, 按 `policy` 处理. 失败时返回最后尝试的分层.
pub fn choose_slice<R: Rng + ?Sized>(
    flags: &[bool],
    policy: EmptyStratumPolicy,
    rng: &mut R,
) -> Result<(usize, Stratum), Stratum> {
    let first = Stratum::coin_flip(rng);
    let attempts = match policy {
        EmptyStratumPolicy::Fallback => vec![first, first.opposite()],
        EmptyStratumPolicy::Fail => vec![first],
    };

    let mut last = first;
    for stratum in attempts {
        last = stratum;
        let candidates = flags
            .iter()
            .positions(|&p| stratum.matches(p))
            .collect_vec();
        if let Some(&z) = candidates.choose(rng) {
            if stratum != first {
                debug!("Stratum {first:?} is empty, fell back to {stratum:?}");
            }
            return Ok((z, stratum));
        }
    }
    Err(last)
}

/// 切片选取器. 借用摘要与根目录, 不持有任何可变状态.
#[derive(Copy, Clone, Debug)]
pub struct SliceSampler<'a> {
    summary: &'a Summary,
    root: &'a Path,
    geometry: VolumeGeometry,
    policy: EmptyStratumPolicy,
}

impl<'a> SliceSampler<'a> {
    /// 初始化.
    #[inline]
    pub fn new(
        summary: &'a Summary,
        root: &'a Path,
        geometry: VolumeGeometry,
        policy: EmptyStratumPolicy,
    ) -> Self {
        Self {
            summary,
            root,
            geometry,
            policy,
        }
    }

    /// 打开 `record` 对应的体数据.
    #[inline]
    fn open(&self, record: &StudyRecord) -> DataResult<StudyVolumes> {
        StudyVolumes::open(self.root.join(&record.study_id), self.geometry)
    }

    /// 精确查找.
    ///
    /// 按 `train`, `valid` 的顺序查找第一个 id 匹配的记录, 与调用方期望的队列无关;
    /// 实际使用的队列见返回值中的 `record.cohort`.
    pub fn exact(&self, study_id: &str, slice_index: usize) -> DataResult<Drawn> {
        let record = self
            .summary
            .find(study_id)
            .ok_or_else(|| DataError::NotFound(format!("study `{study_id}`")))?;
        let volumes = self.open(record)?;
        if slice_index >= volumes.len_z() {
            return Err(DataError::SliceOutOfRange {
                study_id: study_id.to_string(),
                index: slice_index,
                len: volumes.len_z(),
            });
        }
        Ok(Drawn {
            pick: Pick {
                record: record.clone(),
                slice_index,
                stratum: None,
            },
            volumes,
        })
    }

    /// 从 `cohort` 中随机抽取一个 study, 再在其中做一次分层切片选取.
    pub fn random<R: Rng + ?Sized>(&self, cohort: Cohort, rng: &mut R) -> DataResult<Drawn> {
        let record = self
            .summary
            .cohort(cohort)
            .choose(rng)
            .ok_or_else(|| DataError::NotFound(format!("no study in cohort {cohort}")))?;
        let volumes = self.open(record)?;
        let flags = volumes.label.positive_slices()?;

        match choose_slice(&flags, self.policy, rng) {
            Ok((slice_index, stratum)) => {
                debug!(
                    "Drew slice {slice_index} ({stratum:?}) from study `{}`",
                    record.study_id
                );
                Ok(Drawn {
                    pick: Pick {
                        record: record.clone(),
                        slice_index,
                        stratum: Some(stratum),
                    },
                    volumes,
                })
            }
            Err(stratum) => Err(DataError::EmptyCandidateSet {
                study_id: record.study_id.clone(),
                positive: stratum.is_positive(),
            }),
        }
    }

    /// 按 `selection` 选取, 每次选取的结果立即交给 `visit` 处理.
    ///
    /// `visit` 返回后该次选取打开的体数据即被释放, 因此同时存活的映射与 `n` 无关.
    /// 结果保持抽取顺序. 任一次选取或处理失败则整体失败.
    pub fn sample<R, T, F>(
        &self,
        selection: &Selection,
        rng: &mut R,
        mut visit: F,
    ) -> DataResult<Vec<T>>
    where
        R: Rng + ?Sized,
        F: FnMut(Drawn) -> DataResult<T>,
    {
        match selection {
            Selection::Exact {
                study_id,
                slice_index,
            } => Ok(vec![visit(self.exact(study_id, *slice_index)?)?]),
            Selection::Random { n: 0, .. } => Err(DataError::InvalidConfiguration(
                "sample count must be positive".into(),
            )),
            Selection::Random { cohort, n } => (0..*n)
                .map(|_| {
                    let drawn = self.random(*cohort, rng)?;
                    visit(drawn)
                })
                .collect(),
        }
    }
}
