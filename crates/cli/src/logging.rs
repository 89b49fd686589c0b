use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Default filter directives for a `-v` count. `RUST_LOG` takes precedence.
pub fn default_directives(verbosity: u8) -> &'static str {
	// 0 = warnings only
	// 1 (-v) = session steps and server lifecycle, transport stays quiet
	// 2+ (-vv) = everything, including CDP traffic
	match verbosity {
		0 => "warn",
		1 => "info,codecap_runtime=warn",
		_ => "debug",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(verbosity > 1)
		.compact()
		.init();
}
