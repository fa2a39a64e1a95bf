//! Kanal-Tabelle – fester Satz von Client-Slots
//!
//! Ordnet eingehende Pakete anhand der Absender-Adresse einem Slot zu und
//! vergibt freie Slots an neue Clients. Alle tabellenweiten Lese- und
//! Schreibfolgen laufen unter einem gemeinsamen Lock, damit zwischen Suche
//! und Bindung kein zweiter Client denselben Slot oder dieselbe Adresse
//! belegen kann.
//!
//! ## Ablauf Empfang
//! ```text
//! put_data(paket, adresse)
//!     |-- Laenge pruefen (ungueltig -> Fehler, kein Slot beruehrt)
//!     |-- check_addr(adresse) -> Slot?
//!     |-- sonst get_free_chan() -> Slot binden (keiner frei -> verworfen)
//!     +-- Channel::put_data
//! ```

use crate::channel::{Channel, ChannelConfig, ChannelStatus, ClientParameter, PaketArt};
use crate::drift::Clock;
use crate::error::{VoiceError, VoiceResult};
use klangraum_core::{ChannelIndex, HostAddress, StatusArt, StatusEvent, StatusFarbe, StatusSink};
use parking_lot::Mutex;
use std::sync::Arc;

/// Ein gelesener Frame eines verbundenen Kanals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KanalBlock {
    pub index: ChannelIndex,
    pub samples: Vec<i16>,
}

/// Feste Tabelle aller Kanaele
pub struct ChannelSet {
    kanaele: Vec<Channel>,
    /// Serialisiert Suche, Vergabe und Bindung
    tabelle: Mutex<()>,
    status: Arc<dyn StatusSink>,
    frame_bytes: usize,
}

impl ChannelSet {
    /// Legt `kapazitaet` getrennte Kanaele an
    pub fn neu(
        kapazitaet: usize,
        config: &ChannelConfig,
        uhr: Arc<dyn Clock>,
        status: Arc<dyn StatusSink>,
    ) -> VoiceResult<Self> {
        let kanaele = (0..kapazitaet)
            .map(|index| Channel::neu(index, config, Arc::clone(&uhr)))
            .collect::<VoiceResult<Vec<_>>>()?;

        let frame_bytes = kanaele
            .first()
            .map(Channel::frame_bytes)
            .unwrap_or_default();

        tracing::debug!(kapazitaet, frame_bytes, "Kanal-Tabelle angelegt");

        Ok(Self {
            kanaele,
            tabelle: Mutex::new(()),
            status,
            frame_bytes,
        })
    }

    pub fn kapazitaet(&self) -> usize {
        self.kanaele.len()
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    pub fn kanal(&self, index: ChannelIndex) -> Option<&Channel> {
        self.kanaele.get(index)
    }

    pub fn kanaele(&self) -> &[Channel] {
        &self.kanaele
    }

    // -----------------------------------------------------------------------
    // Slot-Suche
    // -----------------------------------------------------------------------

    /// Erster nicht verbundener Slot in aufsteigender Reihenfolge
    pub fn get_free_chan(&self) -> Option<ChannelIndex> {
        let _tabelle = self.tabelle.lock();
        self.freier_kanal()
    }

    /// Erster verbundener Slot, der an `adresse` gebunden ist
    pub fn check_addr(&self, adresse: &HostAddress) -> Option<ChannelIndex> {
        let _tabelle = self.tabelle.lock();
        self.kanal_zu_adresse(adresse)
    }

    fn freier_kanal(&self) -> Option<ChannelIndex> {
        self.kanaele.iter().position(|k| !k.ist_verbunden())
    }

    fn kanal_zu_adresse(&self, adresse: &HostAddress) -> Option<ChannelIndex> {
        self.kanaele
            .iter()
            .position(|k| k.adresse().as_ref() == Some(adresse))
    }

    // -----------------------------------------------------------------------
    // Empfang
    // -----------------------------------------------------------------------

    /// Leitet ein Paket an den Kanal des Absenders weiter
    ///
    /// Unbekannte Absender bekommen den ersten freien Slot. Ist keiner frei,
    /// wird das Paket ohne Nebenwirkung verworfen.
    pub fn put_data(&self, daten: &[u8], adresse: &HostAddress) -> VoiceResult<ChannelIndex> {
        if PaketArt::klassifizieren(daten.len(), self.frame_bytes).is_none() {
            tracing::debug!(
                laenge = daten.len(),
                absender = %adresse,
                "Paket mit ungueltiger Laenge verworfen"
            );
            return Err(VoiceError::UngueltigeLaenge {
                laenge: daten.len(),
                frame_bytes: self.frame_bytes,
            });
        }

        let _tabelle = self.tabelle.lock();

        let index = match self.kanal_zu_adresse(adresse) {
            Some(index) => index,
            None => {
                let Some(index) = self.freier_kanal() else {
                    tracing::warn!(absender = %adresse, "Kein freier Kanal, Paket verworfen");
                    return Err(VoiceError::KeinFreierKanal);
                };
                self.kanaele[index].set_address(*adresse);
                tracing::debug!(kanal = index, absender = %adresse, "Adresse an Kanal gebunden");
                index
            }
        };

        let ergebnis = self.kanaele[index].put_data(daten);
        self.status.melden(StatusEvent::neu(
            StatusArt::JitterBufferPut,
            StatusFarbe::aus_erfolg(ergebnis.is_ok()),
            index,
        ));

        tracing::trace!(kanal = index, bytes = daten.len(), "Paket eingespeist");
        ergebnis.map(|_| index)
    }

    // -----------------------------------------------------------------------
    // Audio-Seite
    // -----------------------------------------------------------------------

    /// Liest aus jedem Slot einen Frame und liefert die verbundenen
    ///
    /// Auch getrennte Slots werden gelesen, damit der Timeout weiterlaeuft.
    pub fn get_block_all_connected(&self) -> Vec<KanalBlock> {
        let _tabelle = self.tabelle.lock();
        let mut bloecke = Vec::new();

        for kanal in &self.kanaele {
            let mut samples = Vec::with_capacity(kanal.frame_len());
            let ok = kanal.get_data(&mut samples);

            if kanal.ist_verbunden() {
                self.status.melden(StatusEvent::neu(
                    StatusArt::JitterBufferGet,
                    StatusFarbe::aus_erfolg(ok),
                    kanal.index(),
                ));
                bloecke.push(KanalBlock {
                    index: kanal.index(),
                    samples,
                });
            }
        }

        bloecke
    }

    /// Adresse und Drift-Schaetzung pro Slot, `None` fuer getrennte
    pub fn get_con_cli_param(&self) -> Vec<Option<ClientParameter>> {
        let _tabelle = self.tabelle.lock();
        self.kanaele.iter().map(Channel::client_parameter).collect()
    }

    /// Initialisiert die Jitter Buffer aller Slots neu
    ///
    /// Eine von der Codec-Frame-Laenge abweichende `frame_len` wird
    /// abgelehnt, bevor ein Slot veraendert wird.
    pub fn set_sock_buf_size(&self, frame_len: usize, bloecke: usize) -> VoiceResult<()> {
        let _tabelle = self.tabelle.lock();

        if let Some(erwartet) = self.kanaele.first().map(Channel::frame_len) {
            if frame_len != erwartet {
                tracing::warn!(frame_len, erwartet, "Jitter-Buffer-Groesse abgelehnt");
                return Err(VoiceError::FrameLaengeAbweichend {
                    erwartet,
                    erhalten: frame_len,
                });
            }
        }

        for kanal in &self.kanaele {
            kanal.set_sock_buf_size(frame_len, bloecke)?;
        }
        tracing::info!(frame_len, bloecke, "Jitter Buffer aller Kanaele neu dimensioniert");
        Ok(())
    }

    pub fn verbundene_anzahl(&self) -> usize {
        let _tabelle = self.tabelle.lock();
        self.kanaele.iter().filter(|k| k.ist_verbunden()).count()
    }

    /// Momentaufnahme aller Slots
    pub fn status(&self) -> Vec<ChannelStatus> {
        let _tabelle = self.tabelle.lock();
        self.kanaele.iter().map(Channel::status).collect()
    }
}

impl std::fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSet")
            .field("kapazitaet", &self.kanaele.len())
            .field("frame_bytes", &self.frame_bytes)
            .finish()
    }
}
