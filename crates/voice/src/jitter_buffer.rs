//! Block-Jitter-Buffer fuer dekodierte Audio-Frames
//!
//! Entkoppelt die Ankunftszeit der Netzwerk-Pakete vom festen Takt der
//! Audio-Seite. Reiner FIFO mit fester Kapazitaet in Bloecken:
//! - `put` lehnt bei vollem Puffer ab (kein Ueberschreiben)
//! - `get` meldet bei leerem Puffer einen Underrun und liefert Stille
//!
//! Nicht thread-safe; die Synchronisation erfolgt im `Channel`.

use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// Statistiken des Jitter Buffers (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterBufferStatistik {
    /// Erfolgreich eingefuegte Frames
    pub eingefuegt: u64,
    /// Erfolgreich entnommene Frames
    pub entnommen: u64,
    /// Wegen vollem Puffer verworfene Frames
    pub ueberlaeufe: u64,
    /// Lesezugriffe auf einen leeren Puffer
    pub underruns: u64,
}

// ---------------------------------------------------------------------------
// BlockJitterBuffer
// ---------------------------------------------------------------------------

/// FIFO aus Frames fester Laenge
#[derive(Debug)]
pub struct BlockJitterBuffer {
    frame_len: usize,
    kapazitaet: usize,
    frames: VecDeque<Vec<i16>>,
    statistik: JitterBufferStatistik,
}

impl BlockJitterBuffer {
    /// Erstellt einen Puffer fuer `bloecke` Frames aus je `frame_len` Samples
    pub fn neu(frame_len: usize, bloecke: usize) -> Self {
        Self {
            frame_len,
            kapazitaet: bloecke,
            frames: VecDeque::with_capacity(bloecke),
            statistik: JitterBufferStatistik::default(),
        }
    }

    /// Initialisiert den Puffer neu; gepufferte Frames gehen verloren
    pub fn init(&mut self, frame_len: usize, bloecke: usize) {
        *self = Self::neu(frame_len, bloecke);
    }

    /// Aendert die Groesse. Entspricht `init`, Statistiken bleiben erhalten.
    pub fn set_size(&mut self, frame_len: usize, bloecke: usize) {
        let statistik = std::mem::take(&mut self.statistik);
        self.init(frame_len, bloecke);
        self.statistik = statistik;
    }

    /// Fuegt einen Frame ein. `false` bei vollem Puffer oder falscher Laenge.
    pub fn put(&mut self, frame: &[i16]) -> bool {
        if frame.len() != self.frame_len {
            tracing::debug!(
                erwartet = self.frame_len,
                erhalten = frame.len(),
                "Frame mit falscher Laenge verworfen"
            );
            return false;
        }

        if self.frames.len() >= self.kapazitaet {
            self.statistik.ueberlaeufe += 1;
            tracing::warn!(
                kapazitaet = self.kapazitaet,
                "Jitter-Buffer-Ueberlauf: Frame verworfen"
            );
            return false;
        }

        self.frames.push_back(frame.to_vec());
        self.statistik.eingefuegt += 1;
        true
    }

    /// Entnimmt den aeltesten Frame nach `ziel`
    ///
    /// Bei leerem Puffer wird `ziel` mit Stille gefuellt und `false`
    /// zurueckgegeben.
    pub fn get(&mut self, ziel: &mut Vec<i16>) -> bool {
        match self.frames.pop_front() {
            Some(frame) => {
                *ziel = frame;
                self.statistik.entnommen += 1;
                true
            }
            None => {
                ziel.clear();
                ziel.resize(self.frame_len, 0);
                self.statistik.underruns += 1;
                false
            }
        }
    }

    /// Aktueller Fuellstand in Frames
    pub fn fuellstand(&self) -> usize {
        self.frames.len()
    }

    pub fn kapazitaet(&self) -> usize {
        self.kapazitaet
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn statistik(&self) -> &JitterBufferStatistik {
        &self.statistik
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_buffer_reihenfolge_fifo() {
        let mut buf = BlockJitterBuffer::neu(2, 4);
        assert!(buf.put(&[1, 1]));
        assert!(buf.put(&[2, 2]));
        assert!(buf.put(&[3, 3]));

        let mut frame = Vec::new();
        for erwartet in 1..=3i16 {
            assert!(buf.get(&mut frame));
            assert_eq!(frame, vec![erwartet, erwartet]);
        }
    }

    #[test]
    fn jitter_buffer_underrun_liefert_stille() {
        let mut buf = BlockJitterBuffer::neu(3, 2);
        let mut frame = vec![7, 7];

        assert!(!buf.get(&mut frame));
        assert_eq!(frame, vec![0, 0, 0]);
        assert_eq!(buf.statistik().underruns, 1);
    }

    #[test]
    fn jitter_buffer_ueberlauf_lehnt_ab() {
        let mut buf = BlockJitterBuffer::neu(1, 2);
        assert!(buf.put(&[1]));
        assert!(buf.put(&[2]));
        assert!(!buf.put(&[3]), "Voller Puffer muss ablehnen");

        assert_eq!(buf.fuellstand(), 2);
        assert_eq!(buf.statistik().ueberlaeufe, 1);

        // Aeltester Frame bleibt erhalten
        let mut frame = Vec::new();
        buf.get(&mut frame);
        assert_eq!(frame, vec![1]);
    }

    #[test]
    fn jitter_buffer_falsche_laenge() {
        let mut buf = BlockJitterBuffer::neu(4, 2);
        assert!(!buf.put(&[1, 2, 3]));
        assert_eq!(buf.fuellstand(), 0);
    }

    #[test]
    fn jitter_buffer_set_size_leert_und_behaelt_statistik() {
        let mut buf = BlockJitterBuffer::neu(2, 4);
        buf.put(&[1, 2]);
        buf.put(&[3, 4]);

        buf.set_size(4, 8);
        assert_eq!(buf.fuellstand(), 0);
        assert_eq!(buf.kapazitaet(), 8);
        assert_eq!(buf.frame_len(), 4);
        assert_eq!(buf.statistik().eingefuegt, 2);
    }
}
