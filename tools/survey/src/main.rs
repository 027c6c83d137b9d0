//! 构建 (或读取) 数据摘要, 并统计若干次随机加载的分层比例.
//!
//! 通过环境变量配置:
//!
//! - `$BRATS_NPY_DIR`: 数据根目录, 未设置时依次尝试 `/data/brats/npy`,
//!   `$HOME/dataset/brats/npy`, `../data`;
//! - `$SURVEY_REBUILD`: 为 `true` 时强制重建摘要, 默认 `false`;
//! - `$SURVEY_VALID_RATIO`: 构建摘要时的验证集比例, 默认 `0.2`;
//! - `$SURVEY_DRAWS`: 每个队列的随机加载次数, 默认 `1000`;
//! - `$SURVEY_SEED`: 随机种子, 不设置时使用系统熵.

mod result;
mod runner;

fn main() {
    simple_logger::init_with_level(log::Level::Info).expect("Logger init error");

    match runner::run() {
        Ok(result) => result.analyze(),
        Err(e) => {
            log::error!("Survey failed: {e}");
            std::process::exit(1);
        }
    }
}
