//! 统一加载入口: 摘要 + 切片选取 + 体数据 + 归一化.

use super::config::DatasetConfig;
use super::normalize::{Normalizer, SampledSlice};
use super::sampler::{Pick, Selection, SliceSampler};
use super::summary::{build_summary, summary_path, Cohort, Summary, SummaryReport};
use crate::error::{DataError, DataResult};
use log::info;
use ndarray::{stack, Array4, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

/// 一次 `load` 请求.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadRequest {
    selection: Selection,
    with_mask: bool,
}

impl LoadRequest {
    /// 从 `cohort` 中分层随机抽取 `n` 个切片.
    #[inline]
    pub fn random(cohort: Cohort, n: usize) -> Self {
        Self {
            selection: Selection::Random { cohort, n },
            with_mask: false,
        }
    }

    /// 精确加载 `study_id` 的第 `slice_index` 个切片.
    #[inline]
    pub fn exact<S: Into<String>>(study_id: S, slice_index: usize) -> Self {
        Self {
            selection: Selection::Exact {
                study_id: study_id.into(),
                slice_index,
            },
            with_mask: false,
        }
    }

    /// 按训练循环惯用的参数组合构建请求.
    ///
    /// `study_id` 与 `slice_index` 同时给出时为精确模式, 此时忽略 `cohort` 和 `n`;
    /// 否则为随机模式.
    pub fn from_parts(
        cohort: Cohort,
        n: usize,
        study_id: Option<String>,
        slice_index: Option<usize>,
    ) -> Self {
        match (study_id, slice_index) {
            (Some(id), Some(z)) => Self::exact(id, z),
            _ => Self::random(cohort, n),
        }
    }

    /// 是否同时返回前景掩膜.
    #[inline]
    pub fn with_mask(mut self, with_mask: bool) -> Self {
        self.with_mask = with_mask;
        self
    }

    /// 选取模式.
    #[inline]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }
}

/// 沿新的首轴堆叠后的一批切片.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    /// `(n, H, W, C)` 归一化输入.
    pub input: Array4<f32>,

    /// `(n, H, W, 1)` 标签.
    pub label: Array4<u8>,

    /// `(n, H, W, 1)` 前景掩膜. 仅在请求时存在.
    pub mask: Option<Array4<f32>>,

    /// 每个切片的来源, 与首轴顺序一致.
    pub picks: Vec<Pick>,
}

impl Batch {
    /// 批大小.
    #[inline]
    pub fn len(&self) -> usize {
        self.picks.len()
    }

    /// 是否为空批. 成功的 `load` 从不返回空批.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }
}

/// 数据集上下文: 持有配置, 根目录, 已加载的摘要和随机源.
///
/// 只有两种状态: 摘要已加载 / 未加载. 未加载时任何采样都返回
/// [`DataError::NotInitialized`].
///
/// # 注意
///
/// 重建摘要会改写磁盘上的摘要文件. 多个进程同时读写同一根目录时,
/// 须由调用方自行串行化.
#[derive(Debug)]
pub struct BratsDataset<R = StdRng> {
    config: DatasetConfig,
    root: PathBuf,
    summary: Option<Summary>,
    rng: R,
}

impl BratsDataset<StdRng> {
    /// 以系统熵初始化随机源.
    pub fn new(config: DatasetConfig) -> DataResult<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// 以固定种子初始化随机源, 便于复现.
    pub fn seeded(config: DatasetConfig, seed: u64) -> DataResult<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> BratsDataset<R> {
    /// 使用给定的随机源. 会校验配置并解析根目录, 但不加载摘要.
    pub fn with_rng(config: DatasetConfig, rng: R) -> DataResult<Self> {
        config.validate()?;
        let root = config.resolve_root()?;
        Ok(Self {
            config,
            root,
            summary: None,
            rng,
        })
    }

    /// 已解析的根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// 已加载的摘要.
    #[inline]
    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    /// 摘要是否已加载.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.summary.is_some()
    }

    /// 加载摘要. 根目录下没有摘要文件时, 先同步构建一次.
    pub fn initialize(&mut self) -> DataResult<()> {
        let path = summary_path(&self.root);
        if !path.is_file() {
            info!("No summary at {}, building one", path.display());
            self.build()?;
        }
        self.summary = Some(Summary::load(&path)?);
        Ok(())
    }

    /// 强制重建摘要, 并替换已加载的摘要.
    pub fn rebuild(&mut self) -> DataResult<SummaryReport> {
        let report = self.build()?;
        self.summary = Some(report.summary.clone());
        Ok(report)
    }

    fn build(&mut self) -> DataResult<SummaryReport> {
        build_summary(
            &self.root,
            self.config.get_valid_ratio(),
            self.config.get_geometry(),
            &mut self.rng,
        )
    }

    /// 按 `request` 选取切片, 归一化后沿首轴堆叠.
    ///
    /// 精确模式按 `train`, `valid` 的顺序查找 study, 与请求的队列无关;
    /// 实际使用的队列见 [`Batch::picks`]. 任一切片失败则整体失败, 不返回部分结果.
    pub fn load(&mut self, request: &LoadRequest) -> DataResult<Batch> {
        let summary = self.summary.as_ref().ok_or(DataError::NotInitialized)?;
        let sampler = SliceSampler::new(
            summary,
            &self.root,
            self.config.get_geometry(),
            self.config.get_empty_stratum(),
        );
        let with_mask = request.with_mask;
        let (slices, picks): (Vec<_>, Vec<_>) = sampler
            .sample(&request.selection, &mut self.rng, |d| {
                let normalizer = Normalizer::from_record(&d.pick.record)?;
                let (input, label) = d.volumes.slice_at(d.pick.slice_index)?;
                let slice = normalizer.apply(input, label, with_mask);
                Ok((slice, d.pick))
            })?
            .into_iter()
            .unzip();
        stack_batch(slices, picks)
    }
}

/// 将若干切片沿新的首轴堆叠.
fn stack_batch(slices: Vec<SampledSlice>, picks: Vec<Pick>) -> DataResult<Batch> {
    let inputs: Vec<ArrayView3<f32>> = slices.iter().map(|s| s.input.view()).collect();
    let labels: Vec<ArrayView3<u8>> = slices.iter().map(|s| s.label.view()).collect();
    let input = stack(Axis(0), &inputs)?;
    let label = stack(Axis(0), &labels)?;

    let masks: Option<Vec<ArrayView3<f32>>> =
        slices.iter().map(|s| s.mask.as_ref().map(|m| m.view())).collect();
    let mask = match masks {
        Some(m) => Some(stack(Axis(0), &m)?),
        None => None,
    };

    Ok(Batch {
        input,
        label,
        mask,
        picks,
    })
}

#[cfg(test)]
mod tests {
    use super::{BratsDataset, LoadRequest};
    use crate::consts::LABEL_FILE;
    use crate::data::VolumeGeometry;
    use crate::dataset::config::DatasetConfig;
    use crate::dataset::sampler::{EmptyStratumPolicy, Selection};
    use crate::dataset::summary::{summary_path, Cohort, StudyRecord, Summary};
    use crate::error::DataError;
    use crate::testing::StudyFixture;
    use ndarray::{s, Axis};
    use std::path::Path;

    fn small() -> VolumeGeometry {
        VolumeGeometry::new(8, 8, 4).unwrap()
    }

    fn write_cohort(root: &Path, geometry: VolumeGeometry, studies: usize) -> Vec<StudyFixture> {
        (0..studies)
            .map(|i| {
                let f = StudyFixture::new(geometry, 5).positive_slices(&[i % 5, (i + 2) % 5]);
                f.write(root, &format!("study_{i:02}"));
                f
            })
            .collect()
    }

    #[test]
    fn test_load_before_initialize() {
        let root = tempfile::tempdir().unwrap();
        let mut ds = BratsDataset::seeded(DatasetConfig::default().root(root.path()), 0).unwrap();
        assert!(!ds.is_initialized());
        assert!(matches!(
            ds.load(&LoadRequest::random(Cohort::Train, 1)),
            Err(DataError::NotInitialized)
        ));
    }

    #[test]
    fn test_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let r = BratsDataset::seeded(DatasetConfig::default().root(root.path().join("x")), 0);
        assert!(matches!(r, Err(DataError::NotFound(_))));
    }

    #[test]
    fn test_initialize_builds_missing_summary() {
        let _ = simple_logger::SimpleLogger::new().init();
        let root = tempfile::tempdir().unwrap();
        write_cohort(root.path(), small(), 4);
        let config = DatasetConfig::default().root(root.path()).geometry(small());
        let mut ds = BratsDataset::seeded(config.clone(), 1).unwrap();
        assert!(!summary_path(root.path()).exists());
        ds.initialize().unwrap();
        assert!(summary_path(root.path()).is_file());
        assert_eq!(ds.summary().unwrap().len(), 4);

        // 第二个实例直接读取已有摘要, 不重建.
        let mut other = BratsDataset::seeded(config, 999).unwrap();
        other.initialize().unwrap();
        assert_eq!(other.summary(), ds.summary());
    }

    #[test]
    fn test_batch_shapes_default_geometry() {
        let root = tempfile::tempdir().unwrap();
        let geometry = VolumeGeometry::default();
        StudyFixture::new(geometry, 2)
            .positive_slices(&[1])
            .write(root.path(), "full");
        let config = DatasetConfig::default().root(root.path()).valid_ratio(0.0);
        let mut ds = BratsDataset::seeded(config, 4).unwrap();
        ds.initialize().unwrap();

        let batch = ds
            .load(&LoadRequest::random(Cohort::Train, 3).with_mask(true))
            .unwrap();
        assert_eq!(batch.input.shape(), &[3, 240, 240, 4]);
        assert_eq!(batch.label.shape(), &[3, 240, 240, 1]);
        let mask = batch.mask.as_ref().unwrap();
        assert_eq!(mask.shape(), &[3, 240, 240, 1]);
        assert!(mask.iter().all(|v| *v == 0.0 || *v == 1.0));
        assert_eq!(batch.len(), 3);

        let no_mask = ds.load(&LoadRequest::random(Cohort::Train, 2)).unwrap();
        assert!(no_mask.mask.is_none());
        assert_eq!(no_mask.input.shape(), &[2, 240, 240, 4]);
    }

    #[test]
    fn test_exact_lookup_is_deterministic() {
        let root = tempfile::tempdir().unwrap();
        let fixtures = write_cohort(root.path(), small(), 3);
        let config = DatasetConfig::default().root(root.path()).geometry(small());
        let mut ds = BratsDataset::seeded(config, 2).unwrap();
        ds.initialize().unwrap();

        let req = LoadRequest::exact("study_01", 3).with_mask(true);
        let a = ds.load(&req).unwrap();
        let b = ds.load(&req).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
        assert_eq!(a.picks[0].slice_index, 3);

        // 与原始数据逐元素比对.
        let record = ds.summary().unwrap().find("study_01").unwrap().clone();
        let raw = fixtures[1].input().index_axis(Axis(0), 3);
        let got = a.input.index_axis(Axis(0), 0);
        for (v, o) in raw.iter().zip(got.iter()) {
            let expected = ((*v as f64 - record.mean) / record.sd) as f32;
            assert!((expected - o).abs() < 1e-5);
        }
        assert_eq!(
            a.label.index_axis(Axis(0), 0),
            fixtures[1].label().index_axis(Axis(0), 3)
        );
        let mask = a.mask.as_ref().unwrap().index_axis(Axis(0), 0).to_owned();
        let expected_mask = raw
            .slice(s![.., .., 0..1])
            .mapv(|v| if v > 0 { 1.0f32 } else { 0.0 });
        assert_eq!(mask, expected_mask);
    }

    #[test]
    fn test_exact_ignores_requested_cohort() {
        let root = tempfile::tempdir().unwrap();
        write_cohort(root.path(), small(), 3);
        // 所有 study 都在 valid 队列.
        let config = DatasetConfig::default()
            .root(root.path())
            .geometry(small())
            .valid_ratio(1.0);
        let mut ds = BratsDataset::seeded(config, 3).unwrap();
        ds.initialize().unwrap();

        let req = LoadRequest::from_parts(Cohort::Train, 7, Some("study_02".into()), Some(0));
        assert!(matches!(req.selection(), Selection::Exact { .. }));
        let batch = ds.load(&req).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.picks[0].record.cohort, Cohort::Valid);

        assert!(matches!(
            ds.load(&LoadRequest::exact("nonexistent", 0)),
            Err(DataError::NotFound(_))
        ));
        // 只给出 study id 时退化为随机模式; train 队列为空.
        let req = LoadRequest::from_parts(Cohort::Train, 1, Some("study_02".into()), None);
        assert!(matches!(ds.load(&req), Err(DataError::NotFound(_))));
    }

    #[test]
    fn test_degenerate_statistics_surface_at_load() {
        let root = tempfile::tempdir().unwrap();
        StudyFixture::new(small(), 2).write(root.path(), "flat");
        let mut summary = Summary::new();
        summary
            .push(StudyRecord {
                study_id: "flat".into(),
                mean: 4.0,
                sd: 0.0,
                cohort: Cohort::Train,
            })
            .unwrap();
        summary.save(summary_path(root.path())).unwrap();

        let config = DatasetConfig::default().root(root.path()).geometry(small());
        let mut ds = BratsDataset::seeded(config, 0).unwrap();
        ds.initialize().unwrap();
        assert!(matches!(
            ds.load(&LoadRequest::exact("flat", 0)),
            Err(DataError::DegenerateStatistics { .. })
        ));
    }

    #[test]
    fn test_invalid_count() {
        let root = tempfile::tempdir().unwrap();
        write_cohort(root.path(), small(), 2);
        let config = DatasetConfig::default()
            .root(root.path())
            .geometry(small())
            .valid_ratio(0.0);
        let mut ds = BratsDataset::seeded(config, 0).unwrap();
        ds.initialize().unwrap();
        assert!(matches!(
            ds.load(&LoadRequest::random(Cohort::Train, 0)),
            Err(DataError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_stratification_converges() {
        let root = tempfile::tempdir().unwrap();
        let geometry = VolumeGeometry::new(2, 2, 1).unwrap();
        // 阳性切片比例差异很大的几个 study.
        for (i, positives) in [vec![0], vec![0, 1, 2, 3, 4, 5, 6], vec![3, 9]]
            .into_iter()
            .enumerate()
        {
            StudyFixture::new(geometry, 10)
                .positive_slices(&positives)
                .write(root.path(), &format!("s{i}"));
        }
        let config = DatasetConfig::default()
            .root(root.path())
            .geometry(geometry)
            .valid_ratio(0.0)
            .empty_stratum(EmptyStratumPolicy::Fail);
        let mut ds = BratsDataset::seeded(config, 2024).unwrap();
        ds.initialize().unwrap();

        let draws = 10_000;
        let batch = ds.load(&LoadRequest::random(Cohort::Train, draws)).unwrap();
        let positive = batch
            .label
            .axis_iter(Axis(0))
            .filter(|s| s.iter().any(|&p| p > 0))
            .count();
        let fraction = positive as f64 / draws as f64;
        // 标准误约 0.005.
        assert!((fraction - 0.5).abs() < 0.03, "fraction = {fraction}");
    }

    #[test]
    fn test_large_batch_releases_volumes_per_draw() {
        let root = tempfile::tempdir().unwrap();
        let geometry = VolumeGeometry::new(2, 2, 1).unwrap();
        StudyFixture::new(geometry, 4)
            .positive_slices(&[1])
            .write(root.path(), "tiny");
        let config = DatasetConfig::default()
            .root(root.path())
            .geometry(geometry)
            .valid_ratio(0.0);
        let mut ds = BratsDataset::seeded(config, 8).unwrap();
        ds.initialize().unwrap();

        // 每次抽取打开两个映射; 若全部保留到堆叠之后, 会超出 `vm.max_map_count` (65530).
        let n = 40_000;
        let batch = ds.load(&LoadRequest::random(Cohort::Train, n)).unwrap();
        assert_eq!(batch.len(), n);
        assert_eq!(batch.input.shape(), &[n, 2, 2, 1]);
        assert!(batch.picks.iter().all(|p| p.slice_index < 4));
    }

    #[test]
    fn test_failed_draw_fails_whole_batch() {
        let root = tempfile::tempdir().unwrap();
        write_cohort(root.path(), small(), 2);
        let config = DatasetConfig::default()
            .root(root.path())
            .geometry(small())
            .valid_ratio(0.0);
        let mut ds = BratsDataset::seeded(config, 6).unwrap();
        ds.initialize().unwrap();
        assert_eq!(ds.summary().unwrap().cohort(Cohort::Train).len(), 2);

        std::fs::remove_file(root.path().join("study_01").join(LABEL_FILE)).unwrap();
        let r = ds.load(&LoadRequest::random(Cohort::Train, 64).with_mask(true));
        assert!(matches!(r, Err(DataError::Io(_))));
        assert!(ds.is_initialized());

        // 只剩完好的 study 时可以正常加载.
        let ok = ds.load(&LoadRequest::exact("study_00", 0)).unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn test_rebuild_replaces_summary() {
        let root = tempfile::tempdir().unwrap();
        write_cohort(root.path(), small(), 2);
        let config = DatasetConfig::default().root(root.path()).geometry(small());
        let mut ds = BratsDataset::seeded(config, 5).unwrap();
        ds.initialize().unwrap();
        assert_eq!(ds.summary().unwrap().len(), 2);

        StudyFixture::new(small(), 3).write(root.path(), "late");
        let report = ds.rebuild().unwrap();
        assert!(report.skipped.is_empty());
        assert_eq!(ds.summary().unwrap().len(), 3);
        assert!(ds.summary().unwrap().contains("late"));
    }
}
