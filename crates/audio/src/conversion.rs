//! Block-Wandlung: Soundkarten-Bloecke -> Netzwerk-Bloecke
//!
//! Sammelt beliebig grosse Sample-Bloecke, bis ein vollstaendiger
//! Netzwerk-Frame vorliegt. `put` meldet `true`, sobald ein Frame bereitsteht;
//! der Frame ist dann ueber `get` lesbar, bis zum naechsten `put`.

/// Sammelpuffer fuer einen Netzwerk-Frame
#[derive(Debug, Clone)]
pub struct ConversionBuffer {
    frame_len: usize,
    /// Noch nicht zu einem Frame zusammengefasste Samples
    ausstehend: Vec<i16>,
    /// Zuletzt fertiggestellter Frame
    bereit: Vec<i16>,
}

impl ConversionBuffer {
    /// Erstellt einen Puffer fuer Frames aus `frame_len` Samples
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            ausstehend: Vec::with_capacity(frame_len * 2),
            bereit: Vec::with_capacity(frame_len),
        }
    }

    /// Initialisiert den Puffer neu und verwirft alle Samples
    pub fn init(&mut self, frame_len: usize) {
        *self = Self::new(frame_len);
    }

    /// Haengt Samples an. Gibt `true` zurueck, wenn ein Frame fertig ist.
    ///
    /// Entstehen durch einen grossen Block mehrere Frames, wird pro Aufruf
    /// nur einer gemeldet; der Rest bleibt fuer den naechsten Aufruf stehen.
    pub fn put(&mut self, samples: &[i16]) -> bool {
        self.ausstehend.extend_from_slice(samples);

        if self.frame_len == 0 || self.ausstehend.len() < self.frame_len {
            return false;
        }

        self.bereit.clear();
        self.bereit.extend(self.ausstehend.drain(..self.frame_len));
        true
    }

    /// Der zuletzt fertiggestellte Frame
    pub fn get(&self) -> &[i16] {
        &self.bereit
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Anzahl der wartenden Samples
    pub fn ausstehend(&self) -> usize {
        self.ausstehend.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gleiche_blockgroesse_sofort_bereit() {
        let mut puffer = ConversionBuffer::new(4);
        assert!(puffer.put(&[1, 2, 3, 4]));
        assert_eq!(puffer.get(), &[1, 2, 3, 4]);
        assert_eq!(puffer.ausstehend(), 0);
    }

    #[test]
    fn kleine_bloecke_werden_gesammelt() {
        let mut puffer = ConversionBuffer::new(6);
        assert!(!puffer.put(&[1, 2]));
        assert!(!puffer.put(&[3, 4]));
        assert!(puffer.put(&[5, 6]));
        assert_eq!(puffer.get(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn ueberhang_bleibt_fuer_naechsten_frame() {
        let mut puffer = ConversionBuffer::new(4);
        assert!(puffer.put(&[1, 2, 3, 4, 5, 6]));
        assert_eq!(puffer.get(), &[1, 2, 3, 4]);
        assert_eq!(puffer.ausstehend(), 2);

        assert!(puffer.put(&[7, 8]));
        assert_eq!(puffer.get(), &[5, 6, 7, 8]);
    }

    #[test]
    fn init_verwirft_alles() {
        let mut puffer = ConversionBuffer::new(4);
        puffer.put(&[1, 2, 3]);
        puffer.init(8);
        assert_eq!(puffer.ausstehend(), 0);
        assert_eq!(puffer.frame_len(), 8);
        assert!(puffer.get().is_empty());
    }
}
