use crate::error::LogError;
use crate::parse::LogConfig;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::{MakeWriter, SubscriberBuilder};



/*
    @@@
    @logs_tracing();
    . Creates a daily-rotating log file (<dir>/<file>) or falls back to stderr when no directory is configured.
    . Configures a tracing subscriber at the configured level (with local timestamps, levels, and targets) on that writer.
    . Writes synchronously: a non_blocking writer thread does not survive fork() into the workers.
*/
pub fn logs_tracing(cfg: &LogConfig) -> Result<(), LogError> {
    let level = Level::from_str(&cfg.level).map_err(|_| LogError::Level(cfg.level.clone()))?;

    if cfg.dir.is_empty() {
        return install(std::io::stderr, level);
    }

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(cfg.file.as_str())
        .build(&cfg.dir)?;
    install(file_appender, level)
}

fn install<W>(writer: W, level: Level) -> Result<(), LogError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = SubscriberBuilder::default()
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_writer(writer)
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
