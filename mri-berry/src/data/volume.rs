//! 内存映射的只读体数据.

use crate::error::{DataError, DataResult};
use crate::{Idx3d, Idx4d};
use memmap2::Mmap;
use ndarray::{ArrayView3, ArrayView4, ArrayViewD, Axis};
use ndarray_npy::{ViewElement, ViewNpyExt};
use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// npy 文件的魔数.
const NPY_MAGIC: &[u8] = b"\x93NUMPY";

mod private {
    pub trait Sealed {}

    impl Sealed for i16 {}
    impl Sealed for u8 {}
}

/// 可以直接从映射字节上查看的体素类型.
///
/// 仅为无填充字节的定长整数实现 (`i16` 输入强度, `u8` 标签).
pub trait Voxel: ViewElement + Copy + Send + Sync + 'static + private::Sealed {}

impl Voxel for i16 {}
impl Voxel for u8 {}

/// 体数据在磁盘上的编码.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Encoding {
    /// 无头部的小端序平铺数组. 形状依约定而定.
    Raw,

    /// 标准 npy 文件 (C 序).
    Npy,
}

/// 内存映射的 4D 体数据, 形状为 `(z, H, W, C)`.
///
/// 文件在进程生命周期内只读; 该结构从不写入映射区域.
#[derive(Debug)]
pub struct MappedVolume<T: Voxel> {
    path: PathBuf,
    mmap: Mmap,
    encoding: Encoding,

    /// 数据部分在映射中的字节偏移.
    offset: usize,
    shape: Idx4d,
    _marker: PhantomData<T>,
}

impl<T: Voxel> MappedVolume<T> {
    /// 以只读内存映射打开 `path`. `slice_shape` 为单个切片的 `(H, W, C)`.
    ///
    /// 切片个数由数据长度推出; 不能整除时返回 [`DataError::MalformedVolume`].
    #[allow(unsafe_code)]
    pub fn open<P: AsRef<Path>>(path: P, slice_shape: Idx3d) -> DataResult<Self> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path)?;
        if file.metadata()?.len() == 0 {
            return Err(malformed(&path, "empty file"));
        }
        // SAFETY: 映射只读, 且本进程从不写入体数据文件.
        // 若文件被外部修改, 读到的数据可能不一致, 但不会产生 UB.
        let mmap = unsafe { Mmap::map(&file)? };

        let (encoding, offset, elems) = if mmap.starts_with(NPY_MAGIC) {
            let view = ArrayViewD::<T>::view_npy(&mmap)?;
            if !view.is_standard_layout() {
                return Err(malformed(&path, "npy data is not in C order"));
            }
            let offset = view.as_ptr() as usize - mmap.as_ptr() as usize;
            (Encoding::Npy, offset, view.len())
        } else {
            if cfg!(target_endian = "big") {
                return Err(malformed(&path, "raw volumes are little-endian"));
            }
            let size = std::mem::size_of::<T>();
            if mmap.len() % size != 0 {
                return Err(malformed(&path, "byte length is not a multiple of the voxel size"));
            }
            (Encoding::Raw, 0, mmap.len() / size)
        };

        if mmap[offset..].as_ptr().align_offset(std::mem::align_of::<T>()) != 0 {
            return Err(malformed(&path, "misaligned voxel data"));
        }

        let (h, w, c) = slice_shape;
        let per_slice = h * w * c;
        if per_slice == 0 || elems % per_slice != 0 {
            return Err(malformed(
                &path,
                &format!("{elems} voxels cannot be reshaped to (-1, {h}, {w}, {c})"),
            ));
        }

        Ok(Self {
            path,
            mmap,
            encoding,
            offset,
            shape: (elems / per_slice, h, w, c),
            _marker: PhantomData,
        })
    }

    /// 文件路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 磁盘编码.
    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// 形状 `(z, H, W, C)`.
    #[inline]
    pub fn shape(&self) -> Idx4d {
        self.shape
    }

    /// 切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.shape.0
    }

    /// 体素个数.
    #[inline]
    pub fn size(&self) -> usize {
        let (z, h, w, c) = self.shape;
        z * h * w * c
    }

    /// 按行优先序排列的全部体素.
    #[allow(unsafe_code)]
    pub fn voxels(&self) -> &[T] {
        let bytes = &self.mmap[self.offset..];
        // SAFETY: `open` 已检查对齐及 `size()` 个元素的长度;
        // `Voxel` 只为任意位模式都合法的整数类型实现.
        unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast::<T>(), self.size()) }
    }

    /// 获得整个体数据的不可变视图.
    #[inline]
    pub fn view(&self) -> DataResult<ArrayView4<'_, T>> {
        Ok(ArrayView4::from_shape(self.shape, self.voxels())?)
    }

    /// 获取第 `z_index` 层切片视图, 形状为 `(H, W, C)`.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> DataResult<ArrayView3<'_, T>> {
        Ok(self.view()?.index_axis_move(Axis(0), z_index))
    }
}

impl MappedVolume<u8> {
    /// 逐切片判断是否含有任意阳性标签体素 (在空间和通道轴上规约).
    pub fn positive_slices(&self) -> DataResult<Vec<bool>> {
        use crate::consts::label::is_positive;

        Ok(self
            .view()?
            .axis_iter(Axis(0))
            .map(|s| s.iter().copied().any(is_positive))
            .collect())
    }
}

#[inline]
fn malformed(path: &Path, reason: &str) -> DataError {
    DataError::MalformedVolume {
        path: path.to_owned(),
        reason: reason.to_string(),
    }
}
