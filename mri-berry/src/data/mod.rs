use crate::consts::{
    INPUT_CHANNELS, INPUT_FILE, LABEL_CHANNELS, LABEL_FILE, SLICE_HEIGHT, SLICE_WIDTH,
};
use crate::error::{DataError, DataResult};
use crate::Idx3d;
use ndarray::ArrayView3;
use std::path::Path;

pub mod stats;
mod volume;

pub use stats::PositiveStats;
pub use volume::{Encoding, MappedVolume, Voxel};

/// 体数据的切片几何约定. 文件本身不携带形状信息.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VolumeGeometry {
    /// 切片高度.
    pub height: usize,

    /// 切片宽度.
    pub width: usize,

    /// 输入体数据通道数. 标签体数据固定为单通道.
    pub channels: usize,
}

impl Default for VolumeGeometry {
    #[inline]
    fn default() -> Self {
        Self {
            height: SLICE_HEIGHT,
            width: SLICE_WIDTH,
            channels: INPUT_CHANNELS,
        }
    }
}

impl VolumeGeometry {
    /// 构建几何约定. 任一维为 0 时返回 `None`.
    pub fn new(height: usize, width: usize, channels: usize) -> Option<Self> {
        (height > 0 && width > 0 && channels > 0).then_some(Self {
            height,
            width,
            channels,
        })
    }

    /// 输入切片形状 `(H, W, C)`.
    #[inline]
    pub fn input_shape(&self) -> Idx3d {
        (self.height, self.width, self.channels)
    }

    /// 标签切片形状 `(H, W, 1)`.
    #[inline]
    pub fn label_shape(&self) -> Idx3d {
        (self.height, self.width, LABEL_CHANNELS)
    }
}

/// 单个 study 的输入与标签体数据.
///
/// 该结构完全透明, 仅包含两个公开的 `input` 和 `label` 子结构.
/// 打开时会检查二者切片个数一致.
#[derive(Debug)]
pub struct StudyVolumes {
    /// `int16` 输入强度, `(z, H, W, C)`.
    pub input: MappedVolume<i16>,

    /// `uint8` 标签, `(z, H, W, 1)`.
    pub label: MappedVolume<u8>,
}

impl StudyVolumes {
    /// 打开 study 目录 `dir` 下的 `dat.npy` 与 `lbl.npy`.
    pub fn open<P: AsRef<Path>>(dir: P, geometry: VolumeGeometry) -> DataResult<Self> {
        let dir = dir.as_ref();
        let input = MappedVolume::open(dir.join(INPUT_FILE), geometry.input_shape())?;
        let label = MappedVolume::open(dir.join(LABEL_FILE), geometry.label_shape())?;
        if input.len_z() != label.len_z() {
            return Err(DataError::MalformedVolume {
                path: dir.to_owned(),
                reason: format!(
                    "input has {} slices but label has {}",
                    input.len_z(),
                    label.len_z()
                ),
            });
        }
        Ok(Self { input, label })
    }

    /// 切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.input.len_z()
    }

    /// 依次获取输入和标签的第 `z_index` 层切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> DataResult<(ArrayView3<'_, i16>, ArrayView3<'_, u8>)> {
        Ok((self.input.slice_at(z_index)?, self.label.slice_at(z_index)?))
    }

    /// 统计输入体数据的正强度体素.
    #[inline]
    pub fn positive_stats(&self) -> PositiveStats {
        stats::positive_stats(self.input.voxels())
    }
}
