//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Idx4d};

pub use crate::data::{MappedVolume, PositiveStats, StudyVolumes, VolumeGeometry};
pub use crate::dataset::{
    build_summary, Batch, BratsDataset, Cohort, DatasetConfig, EmptyStratumPolicy, LoadRequest,
    Normalizer, Pick, SampledSlice, Selection, SliceSampler, Stratum, StudyRecord, Summary,
    SummaryReport,
};
pub use crate::error::{DataError, DataResult};

pub use crate::consts::{INPUT_CHANNELS, SLICE_HEIGHT, SLICE_WIDTH};

pub use crate::dataset::home_dataset_dir_with;
