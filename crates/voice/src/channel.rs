//! Kanal – ein Client-Slot mit Verbindungs-Zustandsautomat
//!
//! Zwei Zustaende, ausschliesslich ueber den Timeout-Zaehler bestimmt:
//!
//! ```text
//!               Audio-Paket (Timeout = max)
//!   Getrennt ---------------------------------> Verbunden
//!      ^                                           |
//!      |   Underrun beim Lesen: Timeout - 1        |
//!      +------------- Timeout == 0 <---------------+
//! ```
//!
//! Der Zerfall laeuft im Lese-Pfad der Audio-Seite, es gibt keinen
//! eigenen Timer. Beim Erreichen von 0 wird die Drift-Schaetzung
//! zurueckgesetzt.
//!
//! ## Locks
//! - `empfang`: Jitter Buffer, Decoder, Timeout, Drift-Schaetzer, Adresse
//! - `senden`: Wandlungspuffer, Encoder, Zeitstempel-Zaehler
//!
//! Werden beide benoetigt, gilt die Reihenfolge `empfang` vor `senden`.

use crate::drift::{Clock, ClockDriftEstimator, DriftConfig};
use crate::error::{VoiceError, VoiceResult};
use crate::jitter_buffer::BlockJitterBuffer;
use klangraum_audio::{AudioCompression, AudioDecoder, AudioEncoder, CompressionMode, ConversionBuffer};
use klangraum_core::{ChannelIndex, HostAddress};
use parking_lot::Mutex;
use std::sync::Arc;

/// Abtastrate des Systems in Hz
pub const SAMPLE_RATE: u32 = 24_000;

/// Samples pro Netzwerk-Block (6 ms bei 24 kHz)
pub const BLOCK_GROESSE_SAMPLES: usize = 144;

/// Verpasste Lese-Zyklen bis zur Trennung
pub const VERBINDUNGS_TIMEOUT_MAX: u32 = 50;

/// Bloecke zwischen zwei Zeitstempeln
pub const ZEITSTEMPEL_INTERVALL_BLOECKE: u32 = 2;

/// Laenge des Regressionsfensters der Drift-Schaetzung
pub const DRIFT_FENSTER: usize = 500;

/// Standard-Groesse des Jitter Buffers in Bloecken
pub const JITTER_PUFFER_BLOECKE: usize = 6;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Gemeinsame Konfiguration aller Kanaele
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Samples pro Netzwerk-Frame
    pub frame_len: usize,
    pub kompression: CompressionMode,
    /// Kapazitaet des Jitter Buffers in Frames
    pub jitter_bloecke: usize,
    /// Startwert des Timeout-Zaehlers bei jedem Audio-Paket
    pub timeout_max: u32,
    pub zeitstempel_intervall: u32,
    pub drift_fenster: usize,
    pub sample_rate: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            frame_len: BLOCK_GROESSE_SAMPLES,
            kompression: CompressionMode::ImaAdpcm,
            jitter_bloecke: JITTER_PUFFER_BLOECKE,
            timeout_max: VERBINDUNGS_TIMEOUT_MAX,
            zeitstempel_intervall: ZEITSTEMPEL_INTERVALL_BLOECKE,
            drift_fenster: DRIFT_FENSTER,
            sample_rate: SAMPLE_RATE,
        }
    }
}

impl ChannelConfig {
    fn drift_config(&self) -> DriftConfig {
        DriftConfig {
            fenster: self.drift_fenster,
            zeitstempel_intervall: self.zeitstempel_intervall,
            block_len: self.frame_len,
            nominal_rate: f64::from(self.sample_rate),
        }
    }
}

// ---------------------------------------------------------------------------
// Paket-Klassifikation
// ---------------------------------------------------------------------------

/// Art eines eingehenden Pakets, allein anhand der Laenge bestimmt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaketArt {
    /// Genau ein komprimierter Audio-Frame
    Audio,
    /// Ein einzelnes Byte: Echo eines Zeitstempel-Index
    Zeitstempel,
}

impl PaketArt {
    /// `None` fuer jede Laenge ausser Frame-Groesse und 1
    pub fn klassifizieren(laenge: usize, frame_bytes: usize) -> Option<Self> {
        if laenge == frame_bytes {
            Some(Self::Audio)
        } else if laenge == 1 {
            Some(Self::Zeitstempel)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot-Typen
// ---------------------------------------------------------------------------

/// Adresse und Drift-Schaetzung eines verbundenen Clients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientParameter {
    pub adresse: HostAddress,
    /// Geschaetzte Abtastrate des Clients in Hz
    pub geschaetzte_rate: f64,
    /// Abweichung von der Nominalrate in Hz
    pub abweichung_hz: f64,
}

/// Momentaufnahme eines Kanals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub index: ChannelIndex,
    pub verbunden: bool,
    pub adresse: Option<HostAddress>,
    pub timeout: u32,
    pub jitter_fuellstand: usize,
    pub jitter_kapazitaet: usize,
    pub ueberlaeufe: u64,
    pub underruns: u64,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

struct EmpfangsZustand {
    adresse: Option<HostAddress>,
    /// 0 = getrennt, > 0 = verbunden
    timeout: u32,
    jitter: BlockJitterBuffer,
    decoder: AudioDecoder,
    drift: ClockDriftEstimator,
}

struct SendeZustand {
    wandler: ConversionBuffer,
    encoder: AudioEncoder,
    zeitstempel_countdown: u32,
    zeitstempel_index: u8,
}

/// Ein vorab angelegter Client-Slot
///
/// Von aussen nur lesbar; Pakete und Lesezugriffe laufen ueber die
/// `ChannelSet`, damit Adresse und Verbindung unter dem Tabellen-Lock
/// zusammenpassen.
///
/// ```compile_fail
/// # use klangraum_core::NullStatusSink;
/// # use klangraum_voice::{ChannelConfig, ChannelSet, ManualClock};
/// # use std::sync::Arc;
/// let set = ChannelSet::neu(
///     1,
///     &ChannelConfig::default(),
///     Arc::new(ManualClock::neu()),
///     Arc::new(NullStatusSink),
/// )
/// .unwrap();
/// set.kanal(0).unwrap().put_data(&[0u8; 72]);
/// ```
pub struct Channel {
    index: ChannelIndex,
    config: ChannelConfig,
    format: AudioCompression,
    empfang: Mutex<EmpfangsZustand>,
    senden: Mutex<SendeZustand>,
}

impl Channel {
    /// Legt einen getrennten Kanal an
    pub fn neu(index: ChannelIndex, config: &ChannelConfig, uhr: Arc<dyn Clock>) -> VoiceResult<Self> {
        let format = AudioCompression::new(config.frame_len, config.kompression)?;

        let empfang = EmpfangsZustand {
            adresse: None,
            timeout: 0,
            jitter: BlockJitterBuffer::neu(config.frame_len, config.jitter_bloecke),
            decoder: format.decoder(),
            drift: ClockDriftEstimator::neu(config.drift_config(), uhr),
        };

        let senden = SendeZustand {
            wandler: ConversionBuffer::new(config.frame_len),
            encoder: format.encoder(),
            zeitstempel_countdown: config.zeitstempel_intervall,
            zeitstempel_index: 0,
        };

        Ok(Self {
            index,
            config: config.clone(),
            format,
            empfang: Mutex::new(empfang),
            senden: Mutex::new(senden),
        })
    }

    pub fn index(&self) -> ChannelIndex {
        self.index
    }

    /// Groesse eines komprimierten Frames in Bytes
    pub fn frame_bytes(&self) -> usize {
        self.format.frame_bytes()
    }

    pub fn frame_len(&self) -> usize {
        self.format.audio_len()
    }

    pub fn ist_verbunden(&self) -> bool {
        self.empfang.lock().timeout > 0
    }

    /// Gebundene Adresse, nur solange der Kanal verbunden ist
    pub fn adresse(&self) -> Option<HostAddress> {
        let empfang = self.empfang.lock();
        if empfang.timeout > 0 {
            empfang.adresse
        } else {
            None
        }
    }

    /// Bindet eine Adresse; verbunden wird erst mit dem ersten Audio-Paket
    pub(crate) fn set_address(&self, adresse: HostAddress) {
        self.empfang.lock().adresse = Some(adresse);
    }

    pub fn timeout(&self) -> u32 {
        self.empfang.lock().timeout
    }

    /// Verarbeitet ein Paket vom Client
    ///
    /// Audio-Frames werden dekodiert, in den Jitter Buffer gelegt und setzen
    /// den Timeout auf das Maximum. Ein 1-Byte-Paket geht an die
    /// Drift-Schaetzung. Alles andere wird ohne Zustandsaenderung abgelehnt.
    pub(crate) fn put_data(&self, daten: &[u8]) -> VoiceResult<PaketArt> {
        let art = PaketArt::klassifizieren(daten.len(), self.frame_bytes()).ok_or(
            VoiceError::UngueltigeLaenge {
                laenge: daten.len(),
                frame_bytes: self.frame_bytes(),
            },
        )?;

        let mut empfang = self.empfang.lock();

        match art {
            PaketArt::Audio => {
                if empfang.timeout == 0 {
                    // Neue Verbindung: beide Codec-Seiten starten bei (0, 0)
                    empfang.decoder.reset();
                    self.senden.lock().encoder.reset();
                    tracing::info!(
                        kanal = self.index,
                        adresse = ?empfang.adresse,
                        "Kanal verbunden"
                    );
                }

                let samples = empfang.decoder.decode(daten)?;
                let eingefuegt = empfang.jitter.put(&samples);
                empfang.timeout = self.config.timeout_max;

                if !eingefuegt {
                    return Err(VoiceError::JitterBufferVoll(self.index));
                }
            }
            PaketArt::Zeitstempel => {
                empfang.drift.add_time_stamp_idx(daten[0]);
            }
        }

        Ok(art)
    }

    /// Holt einen Frame aus dem Jitter Buffer nach `ziel`
    ///
    /// Bei einem Underrun enthaelt `ziel` Stille, der Timeout sinkt um 1.
    /// Erreicht er 0, gilt der Kanal als getrennt.
    pub(crate) fn get_data(&self, ziel: &mut Vec<i16>) -> bool {
        let mut empfang = self.empfang.lock();
        let ok = empfang.jitter.get(ziel);

        if !ok && empfang.timeout > 0 {
            empfang.timeout -= 1;
            if empfang.timeout == 0 {
                empfang.drift.reset();
                tracing::info!(
                    kanal = self.index,
                    adresse = ?empfang.adresse,
                    "Kanal getrennt (Timeout)"
                );
            }
        }

        ok
    }

    /// Sammelt Samples und liefert einen komprimierten Frame, sobald ein
    /// Netzwerk-Block voll ist. Ein leerer Vektor heisst "nichts zu senden".
    pub fn prep_send_packet(&self, samples: &[i16]) -> VoiceResult<Vec<u8>> {
        let mut senden = self.senden.lock();
        let SendeZustand {
            wandler, encoder, ..
        } = &mut *senden;

        if wandler.put(samples) {
            Ok(encoder.encode(wandler.get())?)
        } else {
            Ok(Vec::new())
        }
    }

    /// Liefert alle `zeitstempel_intervall` Aufrufe den naechsten 8-Bit-Index
    pub fn get_time_stamp_idx(&self) -> Option<u8> {
        let mut senden = self.senden.lock();

        if senden.zeitstempel_countdown > 0 {
            senden.zeitstempel_countdown -= 1;
            return None;
        }

        senden.zeitstempel_countdown = self.config.zeitstempel_intervall.saturating_sub(1);
        senden.zeitstempel_index = senden.zeitstempel_index.wrapping_add(1);
        Some(senden.zeitstempel_index)
    }

    /// Initialisiert den Jitter Buffer mit neuer Groesse
    ///
    /// `frame_len` muss der Frame-Laenge des Codecs entsprechen, sonst
    /// koennte kein dekodierter Frame mehr eingefuegt werden.
    pub(crate) fn set_sock_buf_size(&self, frame_len: usize, bloecke: usize) -> VoiceResult<()> {
        if frame_len != self.frame_len() {
            return Err(VoiceError::FrameLaengeAbweichend {
                erwartet: self.frame_len(),
                erhalten: frame_len,
            });
        }
        self.empfang.lock().jitter.set_size(frame_len, bloecke);
        Ok(())
    }

    /// Aktuelle Schaetzung der Client-Abtastrate in Hz
    pub fn estimated_sample_rate(&self) -> f64 {
        self.empfang.lock().drift.geschaetzte_rate()
    }

    /// Adresse und Drift-Schaetzung, `None` wenn getrennt
    pub fn client_parameter(&self) -> Option<ClientParameter> {
        let empfang = self.empfang.lock();
        if empfang.timeout == 0 {
            return None;
        }
        empfang.adresse.map(|adresse| ClientParameter {
            adresse,
            geschaetzte_rate: empfang.drift.geschaetzte_rate(),
            abweichung_hz: empfang.drift.abweichung_hz(),
        })
    }

    pub fn status(&self) -> ChannelStatus {
        let empfang = self.empfang.lock();
        let verbunden = empfang.timeout > 0;
        ChannelStatus {
            index: self.index,
            verbunden,
            adresse: if verbunden { empfang.adresse } else { None },
            timeout: empfang.timeout,
            jitter_fuellstand: empfang.jitter.fuellstand(),
            jitter_kapazitaet: empfang.jitter.kapazitaet(),
            ueberlaeufe: empfang.jitter.statistik().ueberlaeufe,
            underruns: empfang.jitter.statistik().underruns,
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("index", &self.index)
            .field("format", &self.format)
            .field("timeout", &self.timeout())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::ManualClock;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn test_config() -> ChannelConfig {
        ChannelConfig {
            timeout_max: 5,
            drift_fenster: 8,
            ..ChannelConfig::default()
        }
    }

    fn kanal() -> Channel {
        Channel::neu(0, &test_config(), Arc::new(ManualClock::neu())).unwrap()
    }

    fn adresse(port: u16) -> HostAddress {
        HostAddress::neu(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
    }

    fn audio_paket(kanal: &Channel) -> Vec<u8> {
        vec![0u8; kanal.frame_bytes()]
    }

    #[test]
    fn neuer_kanal_ist_getrennt() {
        let k = kanal();
        assert!(!k.ist_verbunden());
        assert_eq!(k.timeout(), 0);
        assert_eq!(k.frame_bytes(), 72);
        assert!(k.client_parameter().is_none());
    }

    #[test]
    fn klassifikation_nach_laenge() {
        assert_eq!(PaketArt::klassifizieren(72, 72), Some(PaketArt::Audio));
        assert_eq!(PaketArt::klassifizieren(1, 72), Some(PaketArt::Zeitstempel));
        assert_eq!(PaketArt::klassifizieren(0, 72), None);
        assert_eq!(PaketArt::klassifizieren(71, 72), None);
        assert_eq!(PaketArt::klassifizieren(73, 72), None);
    }

    #[test]
    fn audio_paket_verbindet() {
        let k = kanal();
        k.set_address(adresse(4000));
        assert_eq!(k.adresse(), None, "Ohne Audio-Paket keine Adresse");

        assert_eq!(k.put_data(&audio_paket(&k)).unwrap(), PaketArt::Audio);
        assert!(k.ist_verbunden());
        assert_eq!(k.timeout(), 5);
        assert_eq!(k.adresse(), Some(adresse(4000)));
    }

    #[test]
    fn zeitstempel_beruehrt_timeout_nicht() {
        let k = kanal();
        assert_eq!(k.put_data(&[7]).unwrap(), PaketArt::Zeitstempel);
        assert!(!k.ist_verbunden());
    }

    #[test]
    fn falsche_laenge_ohne_zustandsaenderung() {
        let k = kanal();
        let err = k.put_data(&[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            VoiceError::UngueltigeLaenge {
                laenge: 10,
                frame_bytes: 72
            }
        ));
        assert!(!k.ist_verbunden());
        assert_eq!(k.status().jitter_fuellstand, 0);
    }

    #[test]
    fn timeout_zerfaellt_bei_underrun() {
        let k = kanal();
        k.put_data(&audio_paket(&k)).unwrap();

        let mut frame = Vec::new();
        // Erster Lesezugriff liefert den gepufferten Frame
        assert!(k.get_data(&mut frame));
        assert_eq!(k.timeout(), 5);

        for erwartet in (0..5).rev() {
            assert!(!k.get_data(&mut frame));
            assert_eq!(k.timeout(), erwartet);
            assert_eq!(frame, vec![0i16; BLOCK_GROESSE_SAMPLES]);
        }
        assert!(!k.ist_verbunden());

        // Weitere Underruns lassen den Zaehler bei 0
        assert!(!k.get_data(&mut frame));
        assert_eq!(k.timeout(), 0);
    }

    #[test]
    fn volle_jitter_buffer_liefert_fehler_und_frischt_timeout_auf() {
        let config = ChannelConfig {
            jitter_bloecke: 1,
            ..test_config()
        };
        let k = Channel::neu(3, &config, Arc::new(ManualClock::neu())).unwrap();
        k.put_data(&audio_paket(&k)).unwrap();

        let mut frame = Vec::new();
        k.get_data(&mut frame);
        k.get_data(&mut frame);
        k.put_data(&audio_paket(&k)).unwrap();
        assert_eq!(k.timeout(), 5);

        let err = k.put_data(&audio_paket(&k)).unwrap_err();
        assert!(matches!(err, VoiceError::JitterBufferVoll(3)));
        assert_eq!(k.timeout(), 5);
        assert_eq!(k.status().ueberlaeufe, 1);
    }

    #[test]
    fn prep_send_packet_nur_bei_vollem_block() {
        let k = kanal();
        let halb = vec![100i16; BLOCK_GROESSE_SAMPLES / 2];

        assert!(k.prep_send_packet(&halb).unwrap().is_empty());
        let paket = k.prep_send_packet(&halb).unwrap();
        assert_eq!(paket.len(), 72);
    }

    #[test]
    fn zeitstempel_index_alle_zwei_aufrufe() {
        let k = kanal();
        let folge: Vec<Option<u8>> = (0..7).map(|_| k.get_time_stamp_idx()).collect();
        assert_eq!(
            folge,
            vec![None, None, Some(1), None, Some(2), None, Some(3)]
        );
    }

    #[test]
    fn zeitstempel_index_wrappt() {
        let k = kanal();
        let indizes: Vec<u8> = (0..600).filter_map(|_| k.get_time_stamp_idx()).collect();
        assert_eq!(indizes[254], 255);
        assert_eq!(indizes[255], 0);
        assert_eq!(indizes[256], 1);
    }

    #[test]
    fn set_sock_buf_size_verwirft_gepufferte_frames() {
        let k = kanal();
        k.put_data(&audio_paket(&k)).unwrap();
        assert_eq!(k.status().jitter_fuellstand, 1);

        k.set_sock_buf_size(BLOCK_GROESSE_SAMPLES, 10).unwrap();
        let status = k.status();
        assert_eq!(status.jitter_fuellstand, 0);
        assert_eq!(status.jitter_kapazitaet, 10);
        assert!(status.verbunden);
    }

    #[test]
    fn set_sock_buf_size_mit_fremder_frame_laenge_abgelehnt() {
        let k = kanal();
        let err = k.set_sock_buf_size(128, 6).unwrap_err();
        assert!(matches!(
            err,
            VoiceError::FrameLaengeAbweichend {
                erwartet: BLOCK_GROESSE_SAMPLES,
                erhalten: 128
            }
        ));

        // Puffer unveraendert, Audio kommt weiterhin an
        k.put_data(&audio_paket(&k)).unwrap();
        let status = k.status();
        assert_eq!(status.jitter_fuellstand, 1);
        assert_eq!(status.jitter_kapazitaet, JITTER_PUFFER_BLOECKE);
        let mut frame = Vec::new();
        assert!(k.get_data(&mut frame));
    }

    #[test]
    fn decoder_startet_bei_neuverbindung_neu() {
        let k = kanal();
        let mut sender = AudioCompression::new(BLOCK_GROESSE_SAMPLES, CompressionMode::ImaAdpcm)
            .unwrap()
            .encoder();
        let signal: Vec<i16> = (0..BLOCK_GROESSE_SAMPLES).map(|i| (i as i16) * 50).collect();

        let paket = sender.encode(&signal).unwrap();
        k.put_data(&paket).unwrap();
        let mut erster = Vec::new();
        k.get_data(&mut erster);

        // Trennen
        let mut frame = Vec::new();
        while k.ist_verbunden() {
            k.get_data(&mut frame);
        }

        // Client startet ebenfalls neu
        sender.reset();
        let paket = sender.encode(&signal).unwrap();
        k.put_data(&paket).unwrap();
        let mut zweiter = Vec::new();
        k.get_data(&mut zweiter);

        assert_eq!(erster, zweiter);
    }

    #[test]
    fn geschaetzte_rate_nach_reset_nominal() {
        let k = kanal();
        assert_eq!(k.estimated_sample_rate(), 24000.0);
    }

    #[test]
    fn keine_kompression_nutzt_doppelte_laenge() {
        let config = ChannelConfig {
            kompression: CompressionMode::None,
            ..test_config()
        };
        let k = Channel::neu(0, &config, Arc::new(ManualClock::neu())).unwrap();
        assert_eq!(k.frame_bytes(), 2 * BLOCK_GROESSE_SAMPLES);
    }
}
