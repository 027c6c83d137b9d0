//! 工具程序依赖的通用组件.

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 读取环境变量 `key` 并解析. 未设置时返回 `default`, 无法解析时 panic.
pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("Cannot parse ${key} = `{v}`")),
        Err(_) => default,
    }
}
