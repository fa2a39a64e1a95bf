//! Gemeinsame Identifikationstypen fuer Klangraum
//!
//! Die Host-Adresse ist der einzige Schluessel, ueber den eingehende Pakete
//! einem Kanal-Slot zugeordnet werden. Sie wird als Newtype gefuehrt, damit
//! sie nicht versehentlich mit anderen `SocketAddr`-Werten verwechselt wird.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Index eines Kanal-Slots in der festen Kanal-Tabelle
pub type ChannelIndex = usize;

/// Netzwerk-Adresse eines Clients (IP + UDP-Port)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddress(pub SocketAddr);

impl HostAddress {
    /// Erstellt eine neue Host-Adresse
    pub fn neu(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// Gibt die innere Socket-Adresse zurueck
    pub fn inner(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for HostAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl std::fmt::Display for HostAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "udp:{}", self.0)
    }
}
