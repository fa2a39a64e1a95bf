//! Status-Ereignisse fuer Jitter-Buffer-Zugriffe
//!
//! Jeder Put/Get auf einen Jitter Buffer meldet ein Ereignis mit Farbe
//! (gruen = Erfolg, rot = Fehler) und Kanal-Index. Die Meldung ist rein
//! beobachtend und beeinflusst den Kontrollfluss nie.

use crate::types::ChannelIndex;
use serde::{Deserialize, Serialize};

/// Art des Status-Ereignisses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusArt {
    /// Ergebnis eines Schreibzugriffs auf den Jitter Buffer (Netzwerk-Seite)
    JitterBufferPut,
    /// Ergebnis eines Lesezugriffs auf den Jitter Buffer (Audio-Seite)
    JitterBufferGet,
}

/// Signalfarbe einer Status-Meldung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusFarbe {
    Gruen,
    Rot,
}

impl StatusFarbe {
    /// Gruen bei Erfolg, Rot bei Fehler
    pub fn aus_erfolg(ok: bool) -> Self {
        if ok {
            Self::Gruen
        } else {
            Self::Rot
        }
    }
}

/// Ein einzelnes Status-Ereignis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub art: StatusArt,
    pub farbe: StatusFarbe,
    pub kanal: ChannelIndex,
}

impl StatusEvent {
    pub fn neu(art: StatusArt, farbe: StatusFarbe, kanal: ChannelIndex) -> Self {
        Self { art, farbe, kanal }
    }
}

/// Empfaenger fuer Status-Ereignisse (fire-and-forget)
///
/// Implementierungen duerfen nicht blockieren: `melden` wird unter dem
/// Tabellen-Lock des `ChannelSet` aufgerufen.
pub trait StatusSink: Send + Sync + 'static {
    fn melden(&self, event: StatusEvent);
}

/// Verwirft alle Ereignisse
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn melden(&self, _event: StatusEvent) {}
}

/// Schreibt alle Ereignisse als Trace-Log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn melden(&self, event: StatusEvent) {
        tracing::trace!(
            art = ?event.art,
            farbe = ?event.farbe,
            kanal = event.kanal,
            "Jitter-Buffer-Status"
        );
    }
}
