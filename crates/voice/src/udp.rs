//! UDP Voice Server – Empfangs-Loop und Versand an verbundene Clients
//!
//! Bindet einen UDP-Socket und speist jedes empfangene Datagramm in die
//! `ChannelSet` ein. Der Versand (gemischte Frames, Zeitstempel) laeuft ueber
//! `block_senden`, das vom Audio-Takt des Servers aufgerufen wird.
//!
//! ## Architektur
//!
//! ```text
//! UDP Socket (recv_from)
//!     |
//!     v
//! ChannelSet::put_data(daten, absender)   <- Laenge, Slot-Zuordnung
//!
//! Audio-Takt
//!     |
//!     v
//! ChannelSet::get_block_all_connected()
//!     |-- mixer::mischen()
//!     +-- pro Kanal: prep_send_packet / get_time_stamp_idx --> send_to
//! ```

use crate::channel_set::ChannelSet;
use crate::error::VoiceResult;
use crate::mixer;
use klangraum_core::HostAddress;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Mindestgroesse des Empfangspuffers
const UDP_BUFFER_SIZE: usize = 2048;

/// Groesste Nutzlast eines UDP-Datagramms (IPv4)
pub const MAX_UDP_NUTZDATEN: usize = 65_507;

/// Empfangspuffer fuer Frames aus `frame_bytes` Bytes
///
/// Ein Byte Reserve, damit zu lange Datagramme nach dem Abschneiden nicht
/// die Frame-Groesse treffen.
fn empfangs_puffer_groesse(frame_bytes: usize) -> usize {
    (frame_bytes + 1).clamp(UDP_BUFFER_SIZE, MAX_UDP_NUTZDATEN + 1)
}

// ---------------------------------------------------------------------------
// VoiceServer-Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration fuer den UDP Voice Server
#[derive(Debug, Clone)]
pub struct VoiceServerConfig {
    /// Bind-Adresse (z.B. "0.0.0.0:22122")
    pub bind_addr: SocketAddr,
}

impl VoiceServerConfig {
    pub fn neu(bind_addr: SocketAddr) -> Self {
        Self { bind_addr }
    }
}

/// Ergebnis eines Audio-Takts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaktErgebnis {
    /// Anzahl verbundener Kanaele in diesem Takt
    pub verbunden: usize,
    /// Versendete Audio-Pakete
    pub audio_pakete: usize,
    /// Versendete Zeitstempel-Pakete
    pub zeitstempel: usize,
}

// ---------------------------------------------------------------------------
// VoiceServer
// ---------------------------------------------------------------------------

/// UDP Voice Server
pub struct VoiceServer {
    socket: Arc<UdpSocket>,
    kanaele: Arc<ChannelSet>,
    puffer_groesse: usize,
}

impl std::fmt::Debug for VoiceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceServer")
            .field("lokale_adresse", &self.socket.local_addr().ok())
            .field("kanaele", &self.kanaele)
            .field("puffer_groesse", &self.puffer_groesse)
            .finish()
    }
}

impl VoiceServer {
    /// Bindet den UDP-Socket
    pub async fn binden(config: VoiceServerConfig, kanaele: Arc<ChannelSet>) -> VoiceResult<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        let puffer_groesse = empfangs_puffer_groesse(kanaele.frame_bytes());
        tracing::info!(
            addr = %config.bind_addr,
            puffer_groesse,
            "UDP Voice Server gebunden"
        );

        Ok(Self {
            socket: Arc::new(socket),
            kanaele,
            puffer_groesse,
        })
    }

    /// Gibt die lokale Bind-Adresse zurueck
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn kanaele(&self) -> &Arc<ChannelSet> {
        &self.kanaele
    }

    /// Startet die Empfangs-Loop (laeuft bis `shutdown_rx` ein Signal sendet)
    pub async fn empfangs_loop_starten(&self, mut shutdown_rx: tokio::sync::oneshot::Receiver<()>) {
        let mut buf = vec![0u8; self.puffer_groesse];

        tracing::info!("Voice-Empfangs-Loop gestartet");

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, absender_addr)) => {
                            self.paket_verarbeiten(&buf[..len], absender_addr);
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "UDP-Empfangsfehler");
                            // Busy-Loop bei dauerhaftem Fehler vermeiden
                            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                        }
                    }
                }

                _ = &mut shutdown_rx => {
                    tracing::info!("Voice-Server: Shutdown-Signal empfangen");
                    break;
                }
            }
        }

        tracing::info!("Voice-Empfangs-Loop beendet");
    }

    /// Speist ein empfangenes Datagramm in die Kanal-Tabelle ein
    ///
    /// Fehler (ungueltige Laenge, Tabelle voll, Puffer voll) werden nur
    /// protokolliert; an den Absender geht nichts zurueck.
    pub fn paket_verarbeiten(&self, daten: &[u8], absender_addr: SocketAddr) {
        let absender = HostAddress::from(absender_addr);
        if let Err(e) = self.kanaele.put_data(daten, &absender) {
            tracing::debug!(fehler = %e, absender = %absender, "Paket nicht angenommen");
        }
    }

    /// Ein Audio-Takt: Frames aller Kanaele lesen, mischen und an jeden
    /// verbundenen Client senden
    pub async fn block_senden(&self) -> VoiceResult<TaktErgebnis> {
        let bloecke = self.kanaele.get_block_all_connected();
        let mut ergebnis = TaktErgebnis {
            verbunden: bloecke.len(),
            ..TaktErgebnis::default()
        };
        if bloecke.is_empty() {
            return Ok(ergebnis);
        }

        let frame_len = bloecke[0].samples.len();
        let mix = mixer::mischen(&bloecke, frame_len);

        for block in &bloecke {
            let Some(kanal) = self.kanaele.kanal(block.index) else {
                continue;
            };
            let Some(ziel) = kanal.adresse() else {
                continue;
            };

            let paket = kanal.prep_send_packet(&mix)?;
            if !paket.is_empty() {
                self.senden(&paket, ziel).await;
                ergebnis.audio_pakete += 1;
            }

            if let Some(idx) = kanal.get_time_stamp_idx() {
                self.senden(&[idx], ziel).await;
                ergebnis.zeitstempel += 1;
            }
        }

        Ok(ergebnis)
    }

    async fn senden(&self, daten: &[u8], ziel: HostAddress) {
        match self.socket.send_to(daten, ziel.inner()).await {
            Ok(_) => {
                tracing::trace!(bytes = daten.len(), ziel = %ziel, "UDP-Paket gesendet");
            }
            Err(e) => {
                tracing::warn!(fehler = %e, ziel = %ziel, "UDP-Sendefehler");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelConfig;
    use crate::drift::ManualClock;
    use klangraum_audio::CompressionMode;
    use klangraum_core::NullStatusSink;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn localhost(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn kanal_tabelle(kapazitaet: usize) -> Arc<ChannelSet> {
        kanal_tabelle_mit(kapazitaet, ChannelConfig::default())
    }

    fn kanal_tabelle_mit(kapazitaet: usize, config: ChannelConfig) -> Arc<ChannelSet> {
        Arc::new(
            ChannelSet::neu(
                kapazitaet,
                &config,
                Arc::new(ManualClock::neu()),
                Arc::new(NullStatusSink),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn voice_server_binden() {
        let config = VoiceServerConfig::neu(localhost(0)); // Port 0 = OS waehlt
        let server = VoiceServer::binden(config, kanal_tabelle(2))
            .await
            .expect("Server muss binden koennen");

        let addr = server.lokale_adresse().expect("Adresse muss verfuegbar sein");
        assert_ne!(addr.port(), 0, "OS muss einen Port zuweisen");
    }

    #[tokio::test]
    async fn empfangs_loop_verbindet_client() {
        let kanaele = kanal_tabelle(2);
        let server = VoiceServer::binden(VoiceServerConfig::neu(localhost(0)), Arc::clone(&kanaele))
            .await
            .unwrap();
        let server_addr = server.lokale_adresse().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = Arc::new(server);
        let server_clone = Arc::clone(&server);
        let recv_task = tokio::spawn(async move {
            server_clone.empfangs_loop_starten(shutdown_rx).await;
        });

        let client = UdpSocket::bind(localhost(0)).await.unwrap();
        let client_addr = HostAddress::from(client.local_addr().unwrap());
        client
            .send_to(&vec![0u8; kanaele.frame_bytes()], server_addr)
            .await
            .unwrap();

        // Auf Verarbeitung warten
        let mut verbunden = false;
        for _ in 0..100 {
            if kanaele.check_addr(&client_addr).is_some() {
                verbunden = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(verbunden, "Client muss einen Kanal erhalten");
        assert_eq!(kanaele.check_addr(&client_addr), Some(0));

        let _ = shutdown_tx.send(());
        recv_task.await.unwrap();
    }

    #[tokio::test]
    async fn block_senden_liefert_audio_an_client() {
        let kanaele = kanal_tabelle(2);
        let server = VoiceServer::binden(VoiceServerConfig::neu(localhost(0)), Arc::clone(&kanaele))
            .await
            .unwrap();

        let client = UdpSocket::bind(localhost(0)).await.unwrap();
        let client_addr = client.local_addr().unwrap();

        server.paket_verarbeiten(&vec![0u8; kanaele.frame_bytes()], client_addr);

        let ergebnis = server.block_senden().await.unwrap();
        assert_eq!(ergebnis.verbunden, 1);
        assert_eq!(ergebnis.audio_pakete, 1);
        assert_eq!(ergebnis.zeitstempel, 0);

        let mut buf = [0u8; UDP_BUFFER_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .expect("Paket muss ankommen")
            .unwrap();
        assert_eq!(len, kanaele.frame_bytes());
    }

    #[tokio::test]
    async fn block_senden_ohne_clients() {
        let server = VoiceServer::binden(VoiceServerConfig::neu(localhost(0)), kanal_tabelle(3))
            .await
            .unwrap();
        let ergebnis = server.block_senden().await.unwrap();
        assert_eq!(ergebnis, TaktErgebnis::default());
    }

    #[test]
    fn udp_buffer_groesse_ausreichend() {
        let unkomprimiert = 2 * crate::channel::BLOCK_GROESSE_SAMPLES;
        assert!(empfangs_puffer_groesse(unkomprimiert) > unkomprimiert);
        assert_eq!(empfangs_puffer_groesse(72), UDP_BUFFER_SIZE);
        assert_eq!(empfangs_puffer_groesse(3000), 3001);
        assert_eq!(empfangs_puffer_groesse(100_000), MAX_UDP_NUTZDATEN + 1);
    }

    #[tokio::test]
    async fn grosse_unkomprimierte_frames_werden_angenommen() {
        // 1500 Samples unkomprimiert = 3000 Bytes pro Paket
        let config = ChannelConfig {
            frame_len: 1500,
            kompression: CompressionMode::None,
            ..ChannelConfig::default()
        };
        let kanaele = kanal_tabelle_mit(2, config);
        assert_eq!(kanaele.frame_bytes(), 3000);

        let server = VoiceServer::binden(VoiceServerConfig::neu(localhost(0)), Arc::clone(&kanaele))
            .await
            .unwrap();
        let server_addr = server.lokale_adresse().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = Arc::new(server);
        let server_clone = Arc::clone(&server);
        let recv_task = tokio::spawn(async move {
            server_clone.empfangs_loop_starten(shutdown_rx).await;
        });

        let client = UdpSocket::bind(localhost(0)).await.unwrap();
        let client_addr = HostAddress::from(client.local_addr().unwrap());
        client.send_to(&vec![0u8; 3000], server_addr).await.unwrap();

        let mut verbunden = false;
        for _ in 0..100 {
            if kanaele.check_addr(&client_addr).is_some() {
                verbunden = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(verbunden, "3000-Byte-Frame muss den Client verbinden");

        let _ = shutdown_tx.send(());
        recv_task.await.unwrap();
    }
}
