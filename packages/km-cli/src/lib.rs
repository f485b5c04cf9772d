//! Shared pieces of the `km` command-line surface.

use std::io::{self, Write};

use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.literal(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
		.error(AnsiColor::Red.on_default() | Effects::BOLD)
}

/// Log filter for `level`, falling back to `info` when the directive does not parse.
pub fn log_filter(level: &str) -> EnvFilter {
	EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Logs go to stderr so stdout carries only command output.
pub fn init_tracing(level: &str) {
	tracing_subscriber::fmt().with_env_filter(log_filter(level)).with_writer(io::stderr).init();
}

/// Pretty JSON with a trailing newline.
pub fn render_json<T>(value: &T) -> serde_json::Result<String>
where
	T: ?Sized + Serialize,
{
	let mut out = serde_json::to_string_pretty(value)?;

	out.push('\n');

	Ok(out)
}

pub fn print_json<T>(value: &T) -> io::Result<()>
where
	T: ?Sized + Serialize,
{
	let rendered = render_json(value).map_err(io::Error::other)?;
	let mut stdout = io::stdout().lock();

	stdout.write_all(rendered.as_bytes())?;
	stdout.flush()
}
