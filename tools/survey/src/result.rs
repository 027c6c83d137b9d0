//! 统计结果.

use mri_berry::Cohort;
use std::io::{self, Write};

/// 单个队列的抽样统计.
#[derive(Clone, Debug)]
pub struct CohortProfile {
    cohort: Cohort,
    studies: usize,
    positive: u64,
    negative: u64,
}

impl CohortProfile {
    /// 初始化.
    #[inline]
    pub fn new(cohort: Cohort, studies: usize) -> Self {
        Self {
            cohort,
            studies,
            positive: 0,
            negative: 0,
        }
    }

    /// 记录一次抽样.
    #[inline]
    pub fn count(&mut self, positive: bool) {
        if positive {
            self.positive += 1;
        } else {
            self.negative += 1;
        }
    }

    /// 阳性切片比例. 没有抽样时返回 `None`.
    pub fn positive_fraction(&self) -> Option<f64> {
        let total = self.positive + self.negative;
        (total > 0).then(|| self.positive as f64 / total as f64)
    }
}

/// 将 `p` 的结果写进 `w` 中.
fn describe_into<W: Write>(p: &CohortProfile, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Cohort `{}`:", p.cohort)?;
    writeln!(w, "{S4}Studies: {}", p.studies)?;
    writeln!(w, "{S4}Positive draws: {}", p.positive)?;
    writeln!(w, "{S4}Negative draws: {}", p.negative)?;
    let fraction = match p.positive_fraction() {
        Some(f) => format!("{f:.4}"),
        None => "/".to_string(),
    };
    write!(w, "{S4}Positive fraction: {fraction}")?;
    Ok(())
}

/// 最终结果.
pub struct SurveyResult {
    cohorts: Vec<CohortProfile>,
    skipped: Vec<(String, String)>,
}

impl SurveyResult {
    pub fn new(cohorts: Vec<CohortProfile>, skipped: Vec<(String, String)>) -> Self {
        Self { cohorts, skipped }
    }

    /// 输出运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);

        for profile in self.cohorts.iter() {
            describe_into(profile, &mut buf).unwrap();
            println!("{}", String::from_utf8_lossy(&buf));
            buf.clear();

            utils::sep();
        }

        if !self.skipped.is_empty() {
            println!("Skipped studies:");
            for (id, why) in self.skipped.iter() {
                println!("    {id}: {why}");
            }
            utils::sep();
        }
    }
}
