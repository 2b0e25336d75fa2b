use crate::configuration::Configuration;
use crate::configuration_handler::EnvConfiguration;
use crate::database_store::DatabaseStore;
use crate::engine::BookingEngine;
use crate::http::start_server;
use crate::local_store::LocalStore;
use crate::notify::smtp::SmtpNotifier;
use crate::notify::{Dispatcher, LogTransport, NotificationTransport};
use crate::onboarding::{AssumeOnboarded, OnboardingGate};
use crate::store::{BookingStore, SlotStore};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod configuration;
mod configuration_handler;
mod database_store;
mod engine;
mod error;
mod http;
mod ics;
mod local_store;
mod notify;
mod onboarding;
mod schema;
mod store;
#[cfg(test)]
mod testutils;
mod types;

pub struct AppState<S, G> {
    pub engine: BookingEngine<S, G>,
    pub dispatcher: Dispatcher,
}

impl<S: Clone, G> Clone for AppState<S, G> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

#[derive(Parser)]
#[command(about = "Advising slot booking service")]
struct Args {
    /// Port to listen on (overrides the PORT environment variable)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = EnvConfiguration::new(args.port);

    let transport: Arc<dyn NotificationTransport> = match config.smtp() {
        Some(settings) => match SmtpNotifier::new(&settings) {
            Ok(notifier) => Arc::new(notifier),
            Err(err) => {
                tracing::warn!(error = %err, "invalid SMTP settings, falling back to log-only");
                Arc::new(LogTransport)
            }
        },
        None => Arc::new(LogTransport),
    };
    let dispatcher = Dispatcher::new(transport, config.admin_recipients(), config.site_name());

    match config.database_url() {
        Some(url) => {
            let store = match DatabaseStore::new(&url) {
                Ok(store) => store,
                Err(err) => {
                    tracing::error!(error = %err, "failed to connect to the database");
                    std::process::exit(1);
                }
            };
            tracing::info!("using the PostgreSQL store");
            run(store, AssumeOnboarded, dispatcher, &config).await;
        }
        None => {
            tracing::info!("no DATABASE_URL set, using the in-memory store");
            run(LocalStore::default(), AssumeOnboarded, dispatcher, &config).await;
        }
    }
}

async fn run<S, G, C>(store: S, gate: G, dispatcher: Dispatcher, config: &C)
where
    S: SlotStore + BookingStore,
    G: OnboardingGate,
    C: Configuration,
{
    let state = AppState {
        engine: BookingEngine::new(store, gate),
        dispatcher,
    };
    start_server(state, &config.bind_address()).await;
}
