//! klangraum-voice – Kanal-Multiplexer fuer Echtzeit-Audio
//!
//! Ordnet eingehende UDP-Pakete festen Client-Slots zu, puffert die
//! dekodierten Frames und verfolgt Verbindungszustand und Clock-Drift
//! jedes Clients.
//!
//! ## Module
//! - [`channel_set`] – Feste Kanal-Tabelle mit Adress-Zuordnung
//! - [`channel`] – Client-Slot mit Timeout-Zustandsautomat
//! - [`drift`] – Schaetzung der Client-Abtastrate per linearer Regression
//! - [`jitter_buffer`] – Block-FIFO zwischen Netzwerk und Audio-Takt
//! - [`mixer`] – Summen-Mischer
//! - [`udp`] – UDP-Empfang und Versand

pub mod channel;
pub mod channel_set;
pub mod drift;
pub mod error;
pub mod jitter_buffer;
pub mod mixer;
pub mod udp;

pub use channel::{Channel, ChannelConfig, ChannelStatus, ClientParameter, PaketArt};
pub use channel_set::{ChannelSet, KanalBlock};
pub use drift::{Clock, ClockDriftEstimator, DriftConfig, ManualClock, SystemClock};
pub use error::{VoiceError, VoiceResult};
pub use jitter_buffer::{BlockJitterBuffer, JitterBufferStatistik};
pub use udp::{TaktErgebnis, VoiceServer, VoiceServerConfig, MAX_UDP_NUTZDATEN};
