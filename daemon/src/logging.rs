use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber: stdout always, plus `verdict.log` when a
/// log directory is configured. `RUST_LOG` overrides the configured filter.
pub fn init(config: &LoggingConfig) {
	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(&config.filter))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	let file_layer = config.dir.as_ref().map(|dir| {
		std::fs::create_dir_all(dir).ok();
		let appender = tracing_appender::rolling::never(dir, "verdict.log");
		fmt::layer().with_ansi(false).with_writer(appender)
	});

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer())
		.with(file_layer)
		.init();
}
