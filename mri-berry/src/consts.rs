//! 通用常量.

/// 单个 study 目录下输入体数据的文件名.
pub const INPUT_FILE: &str = "dat.npy";

/// 单个 study 目录下标签体数据的文件名.
pub const LABEL_FILE: &str = "lbl.npy";

/// 数据根目录下摘要文件的文件名.
pub const SUMMARY_FILE: &str = "summary.bin";

/// 切片高度 (像素).
pub const SLICE_HEIGHT: usize = 240;

/// 切片宽度 (像素).
pub const SLICE_WIDTH: usize = 240;

/// 输入体数据的通道数 (四个 MRI 序列).
pub const INPUT_CHANNELS: usize = 4;

/// 标签体数据的通道数.
pub const LABEL_CHANNELS: usize = 1;

/// 默认的验证集划分比例.
pub const DEFAULT_VALID_RATIO: f64 = 0.2;

/// 指定数据根目录的环境变量名.
pub const ROOT_ENV: &str = "BRATS_NPY_DIR";

/// 约定俗成的数据根目录.
pub const WELL_KNOWN_ROOT: &str = "/data/brats/npy";

/// 最后的相对路径兜底.
pub const FALLBACK_ROOT: &str = "../data";

/// 标签值.
pub mod label {
    /// 背景像素值.
    pub const BACKGROUND: u8 = 0;

    /// 像素是否属于目标 (肿瘤)?
    ///
    /// 任意非零标签都视为目标.
    #[inline]
    pub const fn is_positive(p: u8) -> bool {
        p != BACKGROUND
    }
}

/// 输入体素是否是前景 (大脑组织)?
///
/// 强度 `<= 0` 的体素视为背景或填充.
#[inline]
pub const fn is_foreground(intensity: i16) -> bool {
    intensity > 0
}
