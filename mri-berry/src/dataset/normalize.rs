//! 单个切片的 z-score 归一化与前景掩膜.

use super::summary::StudyRecord;
use crate::consts::is_foreground;
use crate::error::{DataError, DataResult};
use ndarray::{s, Array3, ArrayView3};

/// 归一化后的单个切片. 由调用方独占.
#[derive(Clone, Debug, PartialEq)]
pub struct SampledSlice {
    /// `(H, W, C)` 归一化输入.
    pub input: Array3<f32>,

    /// `(H, W, 1)` 原始标签.
    pub label: Array3<u8>,

    /// `(H, W, 1)` 前景掩膜, 取值为 0.0 或 1.0.
    pub mask: Option<Array3<f32>>,
}

/// 以 study 级别的单一均值/标准差做 z-score 归一化.
///
/// 同一 study 的所有切片与所有通道共用同一组统计量.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Normalizer {
    mean: f64,
    sd: f64,
}

impl Normalizer {
    /// 构建归一化器. `sd` 必须有限且严格为正, `mean` 必须有限, 否则返回 `None`.
    pub fn new(mean: f64, sd: f64) -> Option<Self> {
        (mean.is_finite() && sd.is_finite() && sd > 0.0).then_some(Self { mean, sd })
    }

    /// 以 `record` 的统计量构建归一化器.
    ///
    /// 统计量退化时返回 [`DataError::DegenerateStatistics`], 而不是产生 `inf`/`NaN`.
    pub fn from_record(record: &StudyRecord) -> DataResult<Self> {
        Self::new(record.mean, record.sd).ok_or_else(|| DataError::DegenerateStatistics {
            study_id: record.study_id.clone(),
            mean: record.mean,
            sd: record.sd,
        })
    }

    /// 均值.
    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// 标准差.
    #[inline]
    pub fn sd(&self) -> f64 {
        self.sd
    }

    /// 逐元素计算 `(v - mean) / sd`.
    pub fn normalize(&self, input: ArrayView3<i16>) -> Array3<f32> {
        input.mapv(|v| ((v as f64 - self.mean) / self.sd) as f32)
    }

    /// 由第一个输入通道得到前景 (大脑组织) 掩膜: `input[.., .., 0] > 0`.
    ///
    /// 与统计量无关. 输入没有通道时 panic.
    pub fn mask(input: ArrayView3<i16>) -> Array3<f32> {
        input
            .slice(s![.., .., 0..1])
            .mapv(|v| if is_foreground(v) { 1.0 } else { 0.0 })
    }

    /// 处理一个已选中的切片.
    pub fn apply(
        &self,
        input: ArrayView3<i16>,
        label: ArrayView3<u8>,
        with_mask: bool,
    ) -> SampledSlice {
        SampledSlice {
            input: self.normalize(input),
            label: label.to_owned(),
            mask: with_mask.then(|| Self::mask(input)),
        }
    }
}
