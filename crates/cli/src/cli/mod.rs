
use std::fmt;
use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand};

use crate::config::Overrides;

#[derive(Parser, Debug)]
#[command(name = "codecap")]
#[command(about = "Capture OAuth authorization codes from a remote headless browser")]
#[command(version)]
#[command(styles = help_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// JSON configuration file
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Browser endpoint (ws://, wss://, http:// or https://)
	#[arg(long, global = true, value_name = "URL")]
	pub endpoint: Option<String>,

	/// API token for the browser endpoint
	#[arg(long, global = true, value_name = "TOKEN")]
	pub token: Option<String>,

	/// Provider profile: a built-in name or a JSON file
	#[arg(long, global = true, value_name = "NAME|FILE")]
	pub profile: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

impl Cli {
	/// Flag values that take precedence over the config file and environment.
	pub fn overrides(&self) -> Overrides {
		let listen = match &self.command {
			Commands::Serve(args) => args.listen.clone(),
			Commands::Capture(_) => None,
		};
		Overrides {
			endpoint: self.endpoint.clone(),
			token: self.token.clone(),
			profile: self.profile.clone(),
			listen,
		}
	}
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Serve the capture endpoint over HTTP
	Serve(ServeArgs),
	/// Run one capture session and print the result as JSON
	Capture(CaptureArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
	/// Address to listen on
	#[arg(short, long, value_name = "ADDR")]
	pub listen: Option<String>,
}

#[derive(Args)]
pub struct CaptureArgs {
	/// Login URL of the provider
	#[arg(long, value_name = "URL")]
	pub url: String,

	/// Account identifier typed into the username field
	#[arg(long, value_name = "EMAIL")]
	pub email: String,

	/// Account password
	#[arg(long, env = "CODECAP_PASSWORD", hide_env_values = true, value_name = "PASSWORD")]
	pub password: String,
}

impl fmt::Debug for CaptureArgs {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CaptureArgs")
			.field("url", &self.url)
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Help colours in cargo's palette.
fn help_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.valid(AnsiColor::Cyan.on_default())
}
