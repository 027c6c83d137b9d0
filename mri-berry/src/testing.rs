//! 单元测试使用的合成 study.

use crate::consts::{INPUT_FILE, LABEL_FILE};
use crate::data::VolumeGeometry;
use ndarray::Array4;
use std::path::Path;

/// 合成 study 构造器. 默认输入强度包含负值, 零值和正值, 且所有标签切片为阴性.
#[derive(Clone, Debug)]
pub(crate) struct StudyFixture {
    geometry: VolumeGeometry,
    input: Array4<i16>,
    label: Array4<u8>,
    npy: bool,
}

impl StudyFixture {
    pub(crate) fn new(geometry: VolumeGeometry, slices: usize) -> Self {
        let (h, w, c) = geometry.input_shape();
        let input = Array4::from_shape_fn((slices, h, w, c), |(z, y, x, ch)| {
            ((z * 7 + y * 3 + x + ch * 11) % 50) as i16 - 10
        });
        let label = Array4::zeros((slices, h, w, 1));
        Self {
            geometry,
            input,
            label,
            npy: false,
        }
    }

    /// 把给定切片的一个体素标为肿瘤.
    pub(crate) fn positive_slices(mut self, slices: &[usize]) -> Self {
        let (h, w, _) = self.geometry.label_shape();
        for &z in slices {
            self.label[(z, h / 2, w / 2, 0)] = 2;
        }
        self
    }

    /// 全部输入体素取同一值.
    pub(crate) fn constant_input(mut self, value: i16) -> Self {
        self.input.fill(value);
        self
    }

    /// 以 npy 格式而不是无头部格式写盘.
    pub(crate) fn npy(mut self) -> Self {
        self.npy = true;
        self
    }

    pub(crate) fn input(&self) -> &Array4<i16> {
        &self.input
    }

    pub(crate) fn label(&self) -> &Array4<u8> {
        &self.label
    }

    /// 写到 `root/{study_id}/`.
    pub(crate) fn write(&self, root: &Path, study_id: &str) {
        let dir = root.join(study_id);
        std::fs::create_dir_all(&dir).unwrap();
        self.write_input(&dir);
        self.write_label(&dir);
    }

    pub(crate) fn write_input(&self, dir: &Path) {
        let path = dir.join(INPUT_FILE);
        if self.npy {
            ndarray_npy::write_npy(path, &self.input).unwrap();
        } else {
            let bytes: Vec<u8> = self.input.iter().flat_map(|v| v.to_le_bytes()).collect();
            std::fs::write(path, bytes).unwrap();
        }
    }

    pub(crate) fn write_label(&self, dir: &Path) {
        let path = dir.join(LABEL_FILE);
        if self.npy {
            ndarray_npy::write_npy(path, &self.label).unwrap();
        } else {
            std::fs::write(path, self.label.as_slice().unwrap()).unwrap();
        }
    }
}
