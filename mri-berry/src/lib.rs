#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 为脑肿瘤分割训练循环提供 BraTS 格式 npy 体数据的切片级访问.
//!
//! 数据根目录下每个 study 一个目录, 目录名即 study id, 其中包含:
//!
//! - `dat.npy`: `(z, 240, 240, 4)` 的 `int16` 输入强度;
//! - `lbl.npy`: `(z, 240, 240, 1)` 的 `uint8` 标签.
//!
//! 两个文件可以是无头部的小端序平铺数组 (形状是约定, 文件不自描述),
//! 也可以是标准 npy 文件.
//!
//! # 注意
//!
//! 1. 体数据文件只以只读内存映射方式打开, 从不写入. 多个读者并发访问是安全的.
//! 2. 摘要文件只在构建时写入. 重建摘要与采样并发进行时须由调用方串行化.
//! 3. 所有随机性 (队列划分, study 抽取, 分层硬币, 候选切片选取)
//!   都来自可注入的随机源, 固定种子即可复现.
//!
//! # 开发计划
//!
//! ### 体数据内存映射 ✅
//!
//! 同时支持无头部平铺数组与 npy 文件. 实现位于 `mri-berry/src/data`.
//!
//! ### 摘要索引 ✅
//!
//! 统计每个 study 正强度体素的均值与标准差, 按给定比例随机划分
//! train/valid 队列, 以 bincode 持久化.
//!
//! 实现位于 `mri-berry/src/dataset/summary.rs`.
//!
//! ### 分层切片采样 ✅
//!
//! 以 0.5 的概率在含肿瘤 / 不含肿瘤的切片中选取, 使一批数据中两类切片约各占一半,
//! 与每个 study 内的真实比例无关.
//!
//! 实现位于 `mri-berry/src/dataset/sampler.rs`.
//!
//! ### 归一化与前景掩膜 ✅
//!
//! 实现位于 `mri-berry/src/dataset/normalize.rs`.
//!
//! ### 统一加载入口 ✅
//!
//! 实现位于 `mri-berry/src/dataset/facade.rs`.

/// 三维索引 / 形状.
pub type Idx3d = (usize, usize, usize);

/// 四维索引 / 形状, 按 `(z, H, W, C)` 排列.
pub type Idx4d = (usize, usize, usize, usize);

pub mod consts;

/// 单个 study 的只读体数据.
pub mod data;

pub mod dataset;
pub mod error;
pub mod prelude;

#[cfg(test)]
mod testing;

pub use data::{MappedVolume, PositiveStats, StudyVolumes, VolumeGeometry};
pub use dataset::{
    BratsDataset, Cohort, DatasetConfig, LoadRequest, StudyRecord, Summary, SummaryReport,
};
pub use error::{DataError, DataResult};
