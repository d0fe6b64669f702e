use log::info;

/// Initialize the logging system.
///
/// The level is taken from `HWAV_PLAYER_LOG_LEVEL` (falling back to the
/// standard `RUST_LOG` behavior of env_logger, then to `info`).
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = std::env::var("HWAV_PLAYER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let mut builder = env_logger::Builder::new();

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}:{}] {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    });

    match log_level.to_lowercase().as_str() {
        "trace" => builder.filter_level(log::LevelFilter::Trace),
        "debug" => builder.filter_level(log::LevelFilter::Debug),
        "info" => builder.filter_level(log::LevelFilter::Info),
        "warn" => builder.filter_level(log::LevelFilter::Warn),
        "error" => builder.filter_level(log::LevelFilter::Error),
        _ => builder.filter_level(log::LevelFilter::Info),
    };

    builder.try_init()?;

    info!("hwav-player logging initialized with level: {}", log_level);
    Ok(())
}

/// Log a player error at the level matching its severity.
pub fn log_player_error(err: &crate::error::PlayerError) {
    let severity = err.severity();
    log::log!(severity.log_level(), "[{}] {}", severity.as_str(), err.user_message());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParseError, PlayerError};

    #[test]
    fn test_log_player_error_does_not_panic() {
        let err: PlayerError = ParseError::Format { reason: "test" }.into();
        log_player_error(&err);
    }
}
