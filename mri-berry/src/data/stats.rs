//! 正强度体素的统计量.

use crate::consts::is_foreground;

/// 单遍 (Welford) 累计的均值与方差.
///
/// 只统计强度 `> 0` 的体素; `<= 0` 的体素视为背景或填充.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PositiveStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl PositiveStats {
    /// 统计 `it` 中所有正强度体素.
    pub fn from_voxels<I: IntoIterator<Item = i16>>(it: I) -> Self {
        let mut ans = Self::default();
        for v in it.into_iter().filter(|v| is_foreground(*v)) {
            ans.push(v as f64);
        }
        ans
    }

    #[inline]
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// 合并两份独立累计的结果 (Chan 等人的并行公式).
    pub fn merge(self, other: Self) -> Self {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let n = count as f64;
        Self {
            count,
            mean: self.mean + delta * other.count as f64 / n,
            m2: self.m2 + other.m2 + delta * delta * (self.count as f64 * other.count as f64) / n,
        }
    }

    /// 参与统计的体素个数.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值. 没有正强度体素时为 `NaN`.
    #[inline]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// 总体标准差 (除以 `n`). 没有正强度体素时为 `NaN`.
    #[inline]
    pub fn sd(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            (self.m2 / self.count as f64).max(0.0).sqrt()
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;

        /// 并行统计时每个任务处理的体素个数.
        const CHUNK: usize = 1 << 16;

        /// 借助 `rayon`, 分块并行地统计 `voxels` 中的正强度体素.
        pub fn positive_stats(voxels: &[i16]) -> PositiveStats {
            voxels
                .par_chunks(CHUNK)
                .map(|c| PositiveStats::from_voxels(c.iter().copied()))
                .reduce(PositiveStats::default, PositiveStats::merge)
        }
    } else {
        /// 统计 `voxels` 中的正强度体素.
        #[inline]
        pub fn positive_stats(voxels: &[i16]) -> PositiveStats {
            PositiveStats::from_voxels(voxels.iter().copied())
        }
    }
}
