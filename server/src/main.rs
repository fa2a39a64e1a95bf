//! Klangraum Server – Einstiegspunkt
//!
//! Konfiguration laden, Logging aufsetzen, Server bis Ctrl-C laufen lassen.
//! Der Pfad kommt aus `KLANGRAUM_CONFIG` (Standard: `config.toml`).

use anyhow::Result;
use klangraum_server::config::{ConfigQuelle, LoggingEinstellungen, ServerConfig};
use klangraum_server::Server;

const CONFIG_UMGEBUNGSVARIABLE: &str = "KLANGRAUM_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad =
        std::env::var(CONFIG_UMGEBUNGSVARIABLE).unwrap_or_else(|_| "config.toml".into());

    let (config, quelle) = ServerConfig::laden(&config_pfad)?;
    logging_initialisieren(&config.logging)?;

    if quelle == ConfigQuelle::Standardwerte {
        tracing::warn!(
            pfad = %config_pfad,
            "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
        );
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        kanaele = config.server.max_kanaele,
        kompression = ?config.audio.kompression,
        "Klangraum Server wird initialisiert"
    );

    Server::neu(config).starten().await
}

/// Text- oder JSON-Ausgabe; `RUST_LOG` hat Vorrang vor dem konfigurierten Level
fn logging_initialisieren(logging: &LoggingEinstellungen) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;

    let ergebnis = if logging.format == "json" {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };

    ergebnis.map_err(|e| anyhow::anyhow!("Logging konnte nicht initialisiert werden: {e}"))
}
