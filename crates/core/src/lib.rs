//! klangraum-core – Gemeinsame Typen, Traits und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Klangraum-Crates gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{KlangraumError, Result};
pub use event::{NullStatusSink, StatusArt, StatusEvent, StatusFarbe, StatusSink, TracingStatusSink};
pub use types::{ChannelIndex, HostAddress};
