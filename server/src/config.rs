//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use klangraum_audio::{AudioCompression, CompressionMode};
use klangraum_core::KlangraumError;
use klangraum_voice::channel::{
    ChannelConfig, BLOCK_GROESSE_SAMPLES, DRIFT_FENSTER, JITTER_PUFFER_BLOECKE, SAMPLE_RATE,
    VERBINDUNGS_TIMEOUT_MAX, ZEITSTEMPEL_INTERVALL_BLOECKE,
};
use klangraum_voice::MAX_UDP_NUTZDATEN;
use serde::{Deserialize, Serialize};

/// Herkunft einer geladenen Konfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigQuelle {
    /// Aus der angegebenen Datei gelesen
    Datei,
    /// Datei fehlte, Standardwerte verwendet
    Standardwerte,
}

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Audio-Einstellungen
    pub audio: AudioEinstellungen,
    /// Verbindungs- und Drift-Einstellungen
    pub verbindung: VerbindungsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Anzahl der Kanal-Slots (feste Kapazitaet)
    pub max_kanaele: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Klangraum Server".into(),
            max_kanaele: 10,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer den UDP-Socket
    pub bind_adresse: String,
    /// Port fuer UDP (Audio-Daten und Zeitstempel)
    pub udp_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            udp_port: 22122,
        }
    }
}

/// Audio-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Samples pro Netzwerk-Block
    pub block_groesse: usize,
    /// Kompression: "ima_adpcm" oder "none"
    pub kompression: CompressionMode,
    /// Jitter-Buffer-Groesse in Bloecken
    pub jitter_bloecke: usize,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            block_groesse: BLOCK_GROESSE_SAMPLES,
            kompression: CompressionMode::ImaAdpcm,
            jitter_bloecke: JITTER_PUFFER_BLOECKE,
        }
    }
}

/// Verbindungs-Einstellungen (Timeout, Zeitstempel, Drift)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    /// Verpasste Audio-Takte bis zur Trennung
    pub timeout_takte: u32,
    /// Bloecke zwischen zwei Zeitstempeln
    pub zeitstempel_intervall: u32,
    /// Laenge des Regressionsfensters
    pub drift_fenster: usize,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        Self {
            timeout_takte: VERBINDUNGS_TIMEOUT_MAX,
            zeitstempel_intervall: ZEITSTEMPEL_INTERVALL_BLOECKE,
            drift_fenster: DRIFT_FENSTER,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    ///
    /// Laeuft vor der Logging-Initialisierung, deshalb meldet der Aufrufer
    /// die Quelle selbst.
    pub fn laden(pfad: &str) -> anyhow::Result<(Self, ConfigQuelle)> {
        let (config, quelle) = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => (
                toml::from_str::<Self>(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
                ConfigQuelle::Datei,
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Self::default(), ConfigQuelle::Standardwerte)
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };

        config.validieren()?;
        Ok((config, quelle))
    }

    /// Prueft Werte, die sich nicht ueber Typen ausschliessen lassen
    pub fn validieren(&self) -> klangraum_core::Result<()> {
        if self.server.max_kanaele == 0 {
            return Err(KlangraumError::konfiguration("max_kanaele darf nicht 0 sein"));
        }
        if self.audio.sample_rate == 0 {
            return Err(KlangraumError::konfiguration("sample_rate darf nicht 0 sein"));
        }
        if self.verbindung.timeout_takte == 0 {
            return Err(KlangraumError::konfiguration("timeout_takte darf nicht 0 sein"));
        }
        if self.verbindung.drift_fenster == 0 {
            return Err(KlangraumError::konfiguration("drift_fenster darf nicht 0 sein"));
        }
        if self.verbindung.zeitstempel_intervall == 0 {
            return Err(KlangraumError::konfiguration(
                "zeitstempel_intervall darf nicht 0 sein",
            ));
        }
        if self.audio.jitter_bloecke == 0 {
            return Err(KlangraumError::konfiguration("jitter_bloecke darf nicht 0 sein"));
        }

        let format = AudioCompression::new(self.audio.block_groesse, self.audio.kompression)
            .map_err(|e| KlangraumError::konfiguration(e.to_string()))?;
        // 1 Byte ist fuer Zeitstempel reserviert
        if format.frame_bytes() == 1 {
            return Err(KlangraumError::konfiguration(format!(
                "block_groesse {} ergibt 1-Byte-Frames, nicht von Zeitstempeln unterscheidbar",
                self.audio.block_groesse
            )));
        }
        if format.frame_bytes() > MAX_UDP_NUTZDATEN {
            return Err(KlangraumError::konfiguration(format!(
                "block_groesse {} ergibt {} Bytes pro Frame, mehr als ein UDP-Datagramm fasst ({MAX_UDP_NUTZDATEN})",
                self.audio.block_groesse,
                format.frame_bytes()
            )));
        }

        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer UDP zurueck
    pub fn udp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.udp_port)
    }

    /// Dauer eines Audio-Takts (ein Block)
    pub fn block_dauer(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(
            self.audio.block_groesse as f64 / f64::from(self.audio.sample_rate.max(1)),
        )
    }

    /// Konfiguration fuer die Kanal-Tabelle
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            frame_len: self.audio.block_groesse,
            kompression: self.audio.kompression,
            jitter_bloecke: self.audio.jitter_bloecke,
            timeout_max: self.verbindung.timeout_takte,
            zeitstempel_intervall: self.verbindung.zeitstempel_intervall,
            drift_fenster: self.verbindung.drift_fenster,
            sample_rate: self.audio.sample_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_kanaele, 10);
        assert_eq!(cfg.netzwerk.udp_port, 22122);
        assert_eq!(cfg.audio.block_groesse, 144);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn bind_adresse() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.udp_bind_adresse(), "0.0.0.0:22122");
    }

    #[test]
    fn block_dauer_sechs_ms() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.block_dauer(), std::time::Duration::from_millis(6));
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Probenraum"
            max_kanaele = 4

            [audio]
            kompression = "none"

            [verbindung]
            timeout_takte = 20
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Probenraum");
        assert_eq!(cfg.server.max_kanaele, 4);
        assert_eq!(cfg.audio.kompression, CompressionMode::None);
        assert_eq!(cfg.verbindung.timeout_takte, 20);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.udp_port, 22122);
        assert_eq!(cfg.verbindung.drift_fenster, 500);
    }

    #[test]
    fn channel_config_uebernimmt_werte() {
        let mut cfg = ServerConfig::default();
        cfg.audio.jitter_bloecke = 9;
        cfg.verbindung.timeout_takte = 33;

        let kanal = cfg.channel_config();
        assert_eq!(kanal.jitter_bloecke, 9);
        assert_eq!(kanal.timeout_max, 33);
        assert_eq!(kanal.frame_len, 144);
        assert_eq!(kanal, ChannelConfig {
            jitter_bloecke: 9,
            timeout_max: 33,
            ..ChannelConfig::default()
        });
    }

    #[test]
    fn null_kanaele_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.server.max_kanaele = 0;
        assert!(matches!(cfg.validieren(), Err(KlangraumError::Konfiguration(_))));
    }

    #[test]
    fn ein_byte_frame_abgelehnt() {
        let mut cfg = ServerConfig::default();
        // 2 Samples ADPCM -> 1 Byte
        cfg.audio.block_groesse = 2;
        assert!(cfg.validieren().is_err());

        cfg.audio.block_groesse = 1;
        assert!(cfg.validieren().is_err());

        cfg.audio.kompression = CompressionMode::None;
        cfg.audio.block_groesse = 1;
        assert!(cfg.validieren().is_ok(), "1 Sample unkomprimiert sind 2 Bytes");
    }

    #[test]
    fn null_zeitstempel_intervall_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.verbindung.zeitstempel_intervall = 0;
        assert!(matches!(cfg.validieren(), Err(KlangraumError::Konfiguration(_))));
    }

    #[test]
    fn null_jitter_bloecke_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.audio.jitter_bloecke = 0;
        assert!(matches!(cfg.validieren(), Err(KlangraumError::Konfiguration(_))));
    }

    #[test]
    fn frame_groesser_als_datagramm_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.audio.kompression = CompressionMode::None;

        // 1500 Samples unkomprimiert = 3000 Bytes, passt
        cfg.audio.block_groesse = 1500;
        assert!(cfg.validieren().is_ok());

        // 40000 Samples unkomprimiert = 80000 Bytes
        cfg.audio.block_groesse = 40_000;
        assert!(matches!(cfg.validieren(), Err(KlangraumError::Konfiguration(_))));
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let (cfg, quelle) = ServerConfig::laden("/nicht/vorhanden/klangraum.toml").unwrap();
        assert_eq!(cfg.server.max_kanaele, 10);
        assert_eq!(quelle, ConfigQuelle::Standardwerte);
    }

    #[test]
    fn vorhandene_datei_wird_gelesen() {
        let pfad = std::env::temp_dir().join(format!(
            "klangraum-config-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(&pfad, "[server]\nmax_kanaele = 4\n").unwrap();

        let ergebnis = ServerConfig::laden(pfad.to_str().unwrap());
        let _ = std::fs::remove_file(&pfad);

        let (cfg, quelle) = ergebnis.unwrap();
        assert_eq!(cfg.server.max_kanaele, 4);
        assert_eq!(quelle, ConfigQuelle::Datei);
    }
}
