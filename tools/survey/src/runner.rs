//! 程序运行函数.

use crate::result::{CohortProfile, SurveyResult};
use mri_berry::consts::DEFAULT_VALID_RATIO;
use mri_berry::prelude::*;
use utils::{env_or, loader};

/// 单次加载的批大小.
const BATCH: usize = 16;

/// 实际运行.
pub fn run() -> DataResult<SurveyResult> {
    let rebuild: bool = env_or("SURVEY_REBUILD", false);
    let valid_ratio: f64 = env_or("SURVEY_VALID_RATIO", DEFAULT_VALID_RATIO);
    let draws: usize = env_or("SURVEY_DRAWS", 1000);
    let seed: Option<u64> = std::env::var("SURVEY_SEED").ok().and_then(|s| s.parse().ok());

    let mut ds = loader::dataset_from_env_or_home(valid_ratio, seed)?;
    println!("Data root: {}", ds.root().display());

    let skipped = if rebuild {
        let report = ds.rebuild()?;
        report
            .skipped
            .into_iter()
            .map(|s| (s.study_id, s.error.to_string()))
            .collect()
    } else {
        ds.initialize()?;
        vec![]
    };

    let mut cohorts = Vec::with_capacity(2);
    for cohort in Cohort::SEARCH_ORDER {
        let studies = ds.summary().map_or(0, |s| s.cohort(cohort).len());
        let mut profile = CohortProfile::new(cohort, studies);
        if studies > 0 {
            let mut left = draws;
            while left > 0 {
                let n = left.min(BATCH);
                let batch = ds.load(&LoadRequest::random(cohort, n))?;
                batch
                    .picks
                    .iter()
                    .for_each(|p| profile.count(p.stratum == Some(Stratum::Positive)));
                left -= n;
            }
        }
        cohorts.push(profile);
    }

    Ok(SurveyResult::new(cohorts, skipped))
}
