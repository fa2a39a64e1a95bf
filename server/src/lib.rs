//! klangraum-server – Bibliotheks-Root
//!
//! Setzt Kanal-Tabelle, UDP-Empfang und Audio-Takt zu einem laufenden
//! Server zusammen und stellt den Einstiegspunkt fuer Tests bereit.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use klangraum_core::{KlangraumError, TracingStatusSink};
use klangraum_voice::{ChannelSet, SystemClock, VoiceServer, VoiceServerConfig};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Abstand der periodischen Client-Uebersicht im Log
const UEBERSICHT_INTERVALL: Duration = Duration::from_secs(10);

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Legt die Kanal-Tabelle mit fester Kapazitaet an
    pub fn kanaele_anlegen(&self) -> klangraum_core::Result<Arc<ChannelSet>> {
        let kanaele = ChannelSet::neu(
            self.config.server.max_kanaele,
            &self.config.channel_config(),
            Arc::new(SystemClock::neu()),
            Arc::new(TracingStatusSink),
        )
        .map_err(|e| KlangraumError::Audio(e.to_string()))?;
        Ok(Arc::new(kanaele))
    }

    /// Bindet den UDP-Socket fuer die Kanal-Tabelle
    pub async fn voice_server_binden(
        &self,
        kanaele: Arc<ChannelSet>,
    ) -> klangraum_core::Result<VoiceServer> {
        let bind_addr: SocketAddr = self.config.udp_bind_adresse().parse().map_err(|e| {
            KlangraumError::konfiguration(format!(
                "Ungueltige UDP-Adresse '{}': {e}",
                self.config.udp_bind_adresse()
            ))
        })?;

        VoiceServer::binden(VoiceServerConfig::neu(bind_addr), kanaele)
            .await
            .map_err(|e| KlangraumError::Netzwerk(e.to_string()))
    }

    /// Startet alle Server-Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        self.laufen(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht installiert werden");
            }
        })
        .await
    }

    /// Laeuft bis `shutdown` abgeschlossen ist
    ///
    /// Reihenfolge:
    /// 1. Konfiguration pruefen
    /// 2. Kanal-Tabelle anlegen
    /// 3. UDP-Socket binden, Empfangs-Loop starten
    /// 4. Audio-Takt: lesen, mischen, senden
    pub async fn laufen<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.config.validieren()?;

        let kanaele = self.kanaele_anlegen()?;
        let voice = Arc::new(self.voice_server_binden(Arc::clone(&kanaele)).await?);
        let block_dauer = self.config.block_dauer();
        let udp_adresse = voice.lokale_adresse()?;

        tracing::info!(
            server_name = %self.config.server.name,
            udp = %udp_adresse,
            kanaele = kanaele.kapazitaet(),
            frame_bytes = kanaele.frame_bytes(),
            block_us = block_dauer.as_micros() as u64,
            "Server startet"
        );

        let (empfang_stop_tx, empfang_stop_rx) = tokio::sync::oneshot::channel::<()>();
        let empfang = {
            let voice = Arc::clone(&voice);
            tokio::spawn(async move { voice.empfangs_loop_starten(empfang_stop_rx).await })
        };

        let mut takt = tokio::time::interval(block_dauer);
        let mut uebersicht = tokio::time::interval(UEBERSICHT_INTERVALL);
        tokio::pin!(shutdown);

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");

        loop {
            tokio::select! {
                _ = takt.tick() => {
                    if let Err(e) = voice.block_senden().await {
                        tracing::warn!(fehler = %e, "Audio-Takt fehlgeschlagen");
                    }
                }

                _ = uebersicht.tick() => {
                    client_uebersicht_loggen(&kanaele);
                }

                _ = &mut shutdown => {
                    tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                    break;
                }
            }
        }

        let _ = empfang_stop_tx.send(());
        empfang.await?;

        Ok(())
    }
}

/// Schreibt Adresse und Drift-Schaetzung aller verbundenen Clients ins Log
fn client_uebersicht_loggen(kanaele: &ChannelSet) {
    let parameter = kanaele.get_con_cli_param();
    let verbunden = parameter.iter().flatten().count();
    tracing::debug!(verbunden, "Client-Uebersicht");

    for (index, p) in parameter.iter().enumerate() {
        if let Some(p) = p {
            tracing::debug!(
                kanal = index,
                adresse = %p.adresse,
                rate_hz = p.geschaetzte_rate,
                abweichung_hz = p.abweichung_hz,
                "Client-Parameter"
            );
        }
    }
}
