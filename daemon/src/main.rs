use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use clap::{Parser, Subcommand};
use daemon::api::{self, AppState};
use daemon::auth::{self, SessionResolver};
use daemon::classifier::HttpClassifier;
use daemon::config::{Config, ConfigError};
use daemon::gateway::Gateway;
use daemon::history::HistoryStore;
use daemon::{db, logging};
use tracing::info;

#[derive(Parser)]
#[command(name = "verdict-daemon", version, about = "AI image detection gateway and history service")]
struct Cli {
	/// TOML config file. Every section is optional.
	#[arg(long, global = true, env = "VERDICT_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
	/// Run the HTTP server (default).
	Serve,
	/// Create the user if needed and print a new bearer token for them.
	IssueSession {
		#[arg(long)]
		email: String,
		#[arg(long, default_value = "")]
		name: String,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let cli = Cli::parse();
	let config = Config::load(cli.config.as_deref())?;
	logging::init(&config.logging);

	match cli.command.unwrap_or(Command::Serve) {
		Command::Serve => serve(config).await,
		Command::IssueSession { email, name } => {
			let db = db::init(&config.storage).await?;
			let (identity, token) = auth::issue_session(&db, &email, &name, config.auth.session_ttl_hours).await?;
			eprintln!("session for {} <{}> (user {})", identity.display_name, identity.email, identity.id);
			println!("{token}");
			Ok(())
		}
	}
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
	let bearer = config.classifier.bearer().ok_or(ConfigError::MissingToken)?;
	let db = db::init(&config.storage).await?;

	let classifier = Arc::new(HttpClassifier::new(&config.classifier, bearer)?);
	let state = web::Data::new(AppState {
		gateway: Gateway::new(
			classifier,
			config.classifier.max_in_flight,
			Duration::from_secs(config.classifier.timeout_secs),
		),
		history: HistoryStore::new(db.clone()),
		identities: Arc::new(SessionResolver::new(db)),
	});

	let mut server = HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure));
	if config.server.workers > 0 {
		server = server.workers(config.server.workers);
	}

	info!(host = %config.server.host, port = config.server.port, "verdict-daemon listening");
	server.bind((config.server.host.as_str(), config.server.port))?.run().await?;
	info!("verdict-daemon stopped");
	Ok(())
}
