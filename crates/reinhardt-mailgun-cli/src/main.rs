//! Reinhardt Mailgun CLI
//!
//! Small operator tool around the Mailgun transport.
//!
//! ## Usage
//!
//! ```bash
//! reinhardt-mailgun check --config mailgun.toml
//! reinhardt-mailgun sendtestemail --from noreply@mg.example.com admin@example.com
//! reinhardt-mailgun -vv sendtestemail --from noreply@mg.example.com a@example.com b@example.com
//! ```
//!
//! Without `--config`, settings come from `MAILGUN_API_KEY`, `MAILGUN_DOMAIN`
//! and the optional `MAILGUN_ENDPOINT`, `MAILGUN_REGION`, `MAILGUN_TIMEOUT`.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use reinhardt_mailgun::events::{SendEvent, TransportChangeEvent, TransportExceptionEvent};
use reinhardt_mailgun::{EmailMessage, EventListener, MailgunSettings, MailgunTransport, Transport};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "reinhardt-mailgun")]
#[command(about = "Mailgun transport utility", long_about = None)]
#[command(version)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	/// Verbosity level (can be repeated)
	#[arg(short, long, action = clap::ArgAction::Count, global = true)]
	verbosity: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Verify the API key and sending domain against Mailgun
	Check {
		/// TOML settings file (defaults to MAILGUN_* environment variables)
		#[arg(short, long, value_name = "FILE")]
		config: Option<PathBuf>,
	},

	/// Send a test email to the given recipients
	Sendtestemail {
		/// Sender address
		#[arg(long, value_name = "ADDRESS")]
		from: String,

		/// TOML settings file (defaults to MAILGUN_* environment variables)
		#[arg(short, long, value_name = "FILE")]
		config: Option<PathBuf>,

		/// Recipient addresses
		#[arg(value_name = "RECIPIENT", required = true)]
		recipients: Vec<String>,
	},
}

/// Prints transport lifecycle events when running verbosely.
struct ConsoleListener;

impl EventListener for ConsoleListener {
	fn transport_started(&self, event: &mut TransportChangeEvent) {
		println!("{} {} transport started", "→".cyan(), event.transport());
	}

	fn transport_stopped(&self, event: &mut TransportChangeEvent) {
		println!("{} {} transport stopped", "→".cyan(), event.transport());
	}

	fn before_send_performed(&self, event: &mut SendEvent<'_>) {
		println!(
			"{} sending {} to {}",
			"→".cyan(),
			event.message().id(),
			event.message().recipients().join(", ")
		);
	}

	fn exception_thrown(&self, event: &mut TransportExceptionEvent<'_>) {
		eprintln!("{} {}", "!".yellow(), event.error());
	}
}

fn filter_for(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	}
}

fn init_tracing(verbosity: u8) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(filter_for(verbosity)));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

fn load_settings(config: Option<PathBuf>) -> anyhow::Result<MailgunSettings> {
	match config {
		Some(path) => MailgunSettings::from_file(&path)
			.with_context(|| format!("failed to load settings from {}", path.display())),
		None => MailgunSettings::from_env().context("failed to load settings from environment"),
	}
}

fn build_transport(settings: MailgunSettings, verbosity: u8) -> MailgunTransport {
	let transport = MailgunTransport::new(settings);
	if verbosity > 0 {
		transport.register_plugin(Arc::new(ConsoleListener));
	}
	transport
}

async fn run_check(config: Option<PathBuf>, verbosity: u8) -> anyhow::Result<()> {
	let settings = load_settings(config)?;
	let domain = settings.domain.clone();
	let endpoint = settings.endpoint.clone();
	let mut transport = build_transport(settings, verbosity);

	transport
		.start()
		.await
		.with_context(|| format!("connection check failed for {}", domain))?;
	let alive = transport.ping().await?;
	transport.stop().await?;

	if !alive {
		anyhow::bail!("transport did not respond to ping");
	}

	println!(
		"{} domain {} is reachable via {}",
		"OK".green().bold(),
		domain.bold(),
		endpoint
	);
	Ok(())
}

fn test_message(from: &str, recipients: &[String]) -> anyhow::Result<EmailMessage> {
	EmailMessage::builder()
		.from(from)
		.to_all(recipients.iter().cloned())
		.subject("Test email from Reinhardt Mailgun")
		.body("This is a test email sent from the sendtestemail command.")
		.build()
		.context("failed to build test message")
}

async fn run_sendtestemail(
	from: String,
	config: Option<PathBuf>,
	recipients: Vec<String>,
	verbosity: u8,
) -> anyhow::Result<()> {
	let settings = load_settings(config)?;
	let mut transport = build_transport(settings, verbosity);
	let mut message = test_message(&from, &recipients)?;

	let report = transport.send(&mut message).await?;
	transport.stop().await?;

	if report.is_success() {
		println!(
			"{} sent {} message(s), id {}",
			"OK".green().bold(),
			report.sent,
			message.id()
		);
		Ok(())
	} else {
		anyhow::bail!(
			"Mailgun did not accept the message for {}",
			report.failed_recipients.join(", ")
		)
	}
}

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	init_tracing(cli.verbosity);

	let result = match cli.command {
		Commands::Check { config } => run_check(config, cli.verbosity).await,
		Commands::Sendtestemail {
			from,
			config,
			recipients,
		} => run_sendtestemail(from, config, recipients, cli.verbosity).await,
	};

	if let Err(e) = result {
		eprintln!("{}: {:#}", "Error".red(), e);
		process::exit(1);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(0, "warn")]
	#[case(1, "info")]
	#[case(2, "debug")]
	#[case(5, "trace")]
	fn test_filter_for_verbosity(#[case] verbosity: u8, #[case] expected: &str) {
		assert_eq!(filter_for(verbosity), expected);
	}

	#[rstest]
	fn test_parse_sendtestemail() {
		// Act
		let cli = Cli::try_parse_from([
			"reinhardt-mailgun",
			"-vv",
			"sendtestemail",
			"--from",
			"noreply@mg.example.com",
			"a@example.com",
			"b@example.com",
		])
		.unwrap();

		// Assert
		assert_eq!(cli.verbosity, 2);
		match cli.command {
			Commands::Sendtestemail {
				from,
				config,
				recipients,
			} => {
				assert_eq!(from, "noreply@mg.example.com");
				assert!(config.is_none());
				assert_eq!(recipients, vec!["a@example.com", "b@example.com"]);
			}
			other => panic!("unexpected command: {:?}", other),
		}
	}

	#[rstest]
	fn test_sendtestemail_requires_recipient() {
		// Act
		let result = Cli::try_parse_from([
			"reinhardt-mailgun",
			"sendtestemail",
			"--from",
			"noreply@mg.example.com",
		]);

		// Assert
		assert!(result.is_err());
	}

	#[rstest]
	fn test_parse_check_with_config() {
		// Act
		let cli = Cli::try_parse_from(["reinhardt-mailgun", "check", "--config", "mailgun.toml"])
			.unwrap();

		// Assert
		match cli.command {
			Commands::Check { config } => {
				assert_eq!(config, Some(PathBuf::from("mailgun.toml")));
			}
			other => panic!("unexpected command: {:?}", other),
		}
	}

	#[rstest]
	fn test_test_message_addresses_every_recipient() {
		// Arrange
		let recipients = vec!["a@example.com".to_string(), "b@example.com".to_string()];

		// Act
		let message = test_message("noreply@mg.example.com", &recipients).unwrap();

		// Assert
		assert_eq!(message.recipients(), recipients);
		assert_eq!(message.subject(), "Test email from Reinhardt Mailgun");
	}

	#[rstest]
	fn test_test_message_rejects_invalid_sender() {
		// Act
		let result = test_message("not-an-address", &["a@example.com".to_string()]);

		// Assert
		assert!(result.is_err());
	}
}
