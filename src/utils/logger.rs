use log::LevelFilter;

/// Maps a configured level name; anything unknown turns logging off.
pub fn level_filter(level: &str) -> LevelFilter {
    match level {
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Off,
    }
}

/// Initialises `env_logger` at the configured level. `RUST_LOG`, when set,
/// takes precedence.
pub fn setup_logger(config: &super::config::Config) {
    let result = env_logger::Builder::new()
        .filter_level(level_filter(&config.log_level))
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
    if let Err(e) = result {
        log::debug!("Logger already initialised: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter("debug"), LevelFilter::Debug);
        assert_eq!(level_filter("warn"), LevelFilter::Warn);
        assert_eq!(level_filter("verbose"), LevelFilter::Off);
    }
}
