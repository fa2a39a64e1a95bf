//! Fehlertypen fuer die Audio-Kompression

use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Kompression
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AudioError {
    #[error("Ungueltige Frame-Laenge: erwartet {erwartet} Samples, erhalten {erhalten}")]
    UngueltigeFrameLaenge { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Paket-Laenge: erwartet {erwartet} Bytes, erhalten {erhalten}")]
    UngueltigePaketLaenge { erwartet: usize, erhalten: usize },

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
