#[cfg(feature = "env")]
use std::io::Write;

/// Install an `env_logger` backend for tests, honoring `RUST_LOG`.
///
/// Safe to call from every test: only the first call installs the logger.
#[cfg(feature = "env")]
pub fn try_init_log() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}:{} - {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                std::thread::current().name().unwrap_or("-"),
                record.module_path().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init();
}

#[cfg(test)]
mod tests {
    #[cfg(feature = "env")]
    #[test]
    fn test_init_log_twice() {
        super::try_init_log();
        super::try_init_log();
        log::debug!("Logger installed once");
        log::info!("Record at info");
    }
}
