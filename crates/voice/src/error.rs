//! Fehlertypen fuer den Kanal-Multiplexer
//!
//! Alle Fehler sind lokal und synchron: ein verworfenes Paket oder ein
//! voller Puffer, nie ein Abbruch.

use klangraum_audio::AudioError;
use klangraum_core::ChannelIndex;
use thiserror::Error;

/// Fehler beim Einspeisen oder Versenden von Paketen
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Ungueltige Paket-Laenge: {laenge} Bytes (erwartet {frame_bytes} oder 1)")]
    UngueltigeLaenge { laenge: usize, frame_bytes: usize },

    #[error("Kein freier Kanal verfuegbar")]
    KeinFreierKanal,

    #[error("Frame-Laenge {erhalten} passt nicht zum Codec (erwartet {erwartet} Samples)")]
    FrameLaengeAbweichend { erwartet: usize, erhalten: usize },

    #[error("Jitter Buffer von Kanal {0} ist voll")]
    JitterBufferVoll(ChannelIndex),

    #[error("Audiofehler: {0}")]
    Audio(#[from] AudioError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type VoiceResult<T> = Result<T, VoiceError>;
