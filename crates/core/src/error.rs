//! Fehlertypen fuer Klangraum
//!
//! Zentraler Fehler-Enum fuer Fehler, die Crate-Grenzen ueberschreiten
//! (Konfiguration, Start). Die Hot-Path-Crates definieren eigene Fehler.

use thiserror::Error;

/// Globaler Result-Alias fuer Klangraum
pub type Result<T> = std::result::Result<T, KlangraumError>;

/// Fehler beim Aufbau und Start des Systems
#[derive(Debug, Error)]
pub enum KlangraumError {
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Netzwerkfehler: {0}")]
    Netzwerk(String),

    #[error("Audiofehler: {0}")]
    Audio(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl KlangraumError {
    /// Erstellt einen Konfigurationsfehler aus einer beliebigen Nachricht
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = KlangraumError::konfiguration("max_kanaele darf nicht 0 sein");
        assert_eq!(
            e.to_string(),
            "Konfigurationsfehler: max_kanaele darf nicht 0 sein"
        );
    }

    #[test]
    fn io_fehler_konvertierung() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "belegt");
        let e: KlangraumError = io.into();
        assert!(matches!(e, KlangraumError::Io(_)));
    }
}
