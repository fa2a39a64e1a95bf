//! IMA-ADPCM Encoder/Decoder und Kompressions-Auswahl
//!
//! Komprimiert einen Frame aus N 16-Bit-Samples auf N 4-Bit-Codes, zwei Codes
//! pro Byte (niedriges Nibble zuerst). Encoder und Decoder fuehren denselben
//! Zustand (Praediktor + Step-Index) und verwenden dieselbe Dequantisierung,
//! deshalb laufen beide Seiten nie auseinander, solange sie vom gleichen
//! Startzustand ausgehen.
//!
//! Die `AudioCompression` legt Modus und Paketgroesse einmalig fest und
//! liefert passende Encoder-/Decoder-Haelften.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AudioError, AudioResult};

// ---------------------------------------------------------------------------
// Tabellen
// ---------------------------------------------------------------------------

/// Aenderung des Step-Index pro 4-Bit-Code
const IMA_INDEX_ANPASSUNG: [i32; 16] = [
    -1, -1, -1, -1, 2, 4, 6, 8, // +0 .. +7
    -1, -1, -1, -1, 2, 4, 6, 8, // -0 .. -7
];

/// Anzahl der Eintraege in der Step-Tabelle
pub const IMA_STEP_TABELLE_LAENGE: usize = 89;

/// Maximaler Step-Index
pub const IMA_STEP_INDEX_MAX: u8 = (IMA_STEP_TABELLE_LAENGE - 1) as u8;

const IMA_STEP_GROESSE: [i32; IMA_STEP_TABELLE_LAENGE] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

// ---------------------------------------------------------------------------
// AdpcmZustand
// ---------------------------------------------------------------------------

/// Adaptiver Zustand eines ADPCM-Streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdpcmZustand {
    /// Zuletzt rekonstruiertes Sample
    pub praediktor: i16,
    /// Index in die Step-Tabelle, immer in `0..=88`
    pub step_index: u8,
}

impl AdpcmZustand {
    /// Quantisiert ein Sample zu einem 4-Bit-Code und fuehrt den Zustand nach
    pub fn encode_sample(&mut self, sample: i16) -> u8 {
        let step = IMA_STEP_GROESSE[self.step_index as usize];
        let mut diff = i32::from(sample) - i32::from(self.praediktor);

        let mut code = 0u8;
        if diff < 0 {
            code = 8;
            diff = -diff;
        }

        // Betrag in drei Stufen gegen step, step/2, step/4 pruefen
        let mut stufe = step;
        let mut maske = 4u8;
        while maske != 0 {
            if diff >= stufe {
                code |= maske;
                diff -= stufe;
            }
            stufe >>= 1;
            maske >>= 1;
        }

        // Praediktor exakt so nachfuehren, wie der Decoder es tut
        self.anwenden(code, step);
        code
    }

    /// Rekonstruiert ein Sample aus einem 4-Bit-Code
    pub fn decode_sample(&mut self, code: u8) -> i16 {
        let step = IMA_STEP_GROESSE[self.step_index as usize];
        self.anwenden(code & 0x0F, step);
        self.praediktor
    }

    fn anwenden(&mut self, code: u8, step: i32) {
        let mut diff = step >> 3;
        if code & 4 != 0 {
            diff += step;
        }
        if code & 2 != 0 {
            diff += step >> 1;
        }
        if code & 1 != 0 {
            diff += step >> 2;
        }
        if code & 8 != 0 {
            diff = -diff;
        }

        let neu = i32::from(self.praediktor) + diff;
        self.praediktor = neu.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;

        let index = i32::from(self.step_index) + IMA_INDEX_ANPASSUNG[code as usize];
        self.step_index = index.clamp(0, i32::from(IMA_STEP_INDEX_MAX)) as u8;
    }
}

// ---------------------------------------------------------------------------
// Kompressions-Auswahl
// ---------------------------------------------------------------------------

/// Verfuegbare Kompressionsmodi
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
    /// Keine Kompression: 16-Bit-Samples big-endian
    None,
    /// IMA-ADPCM, 4 Bit pro Sample
    #[default]
    ImaAdpcm,
}

/// Kompressions-Format eines Streams (Modus + feste Groessen)
///
/// Die Paketgroesse wird einmalig bei der Erstellung berechnet und aendert
/// sich fuer die Lebensdauer einer Verbindung nicht.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioCompression {
    mode: CompressionMode,
    audio_len: usize,
    frame_bytes: usize,
}

impl AudioCompression {
    /// Erstellt ein Format fuer Frames aus `audio_len` Samples
    pub fn new(audio_len: usize, mode: CompressionMode) -> AudioResult<Self> {
        if audio_len == 0 {
            return Err(AudioError::Konfiguration(
                "Frame-Laenge muss groesser als 0 sein".into(),
            ));
        }

        let frame_bytes = match mode {
            CompressionMode::None => 2 * audio_len,
            CompressionMode::ImaAdpcm => audio_len.div_ceil(2),
        };

        debug!(?mode, audio_len, frame_bytes, "Audio-Kompression initialisiert");

        Ok(Self {
            mode,
            audio_len,
            frame_bytes,
        })
    }

    /// Groesse eines komprimierten Frames in Bytes
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Anzahl der Samples pro Frame
    pub fn audio_len(&self) -> usize {
        self.audio_len
    }

    pub fn mode(&self) -> CompressionMode {
        self.mode
    }

    /// Neuer Encoder im Startzustand
    pub fn encoder(&self) -> AudioEncoder {
        AudioEncoder {
            format: *self,
            zustand: AdpcmZustand::default(),
        }
    }

    /// Neuer Decoder im Startzustand
    pub fn decoder(&self) -> AudioDecoder {
        AudioDecoder {
            format: *self,
            zustand: AdpcmZustand::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder / Decoder
// ---------------------------------------------------------------------------

/// Encoder-Seite eines Streams
#[derive(Debug, Clone)]
pub struct AudioEncoder {
    format: AudioCompression,
    zustand: AdpcmZustand,
}

impl AudioEncoder {
    /// Komprimiert einen Frame aus genau `audio_len()` Samples
    pub fn encode(&mut self, samples: &[i16]) -> AudioResult<Vec<u8>> {
        if samples.len() != self.format.audio_len {
            return Err(AudioError::UngueltigeFrameLaenge {
                erwartet: self.format.audio_len,
                erhalten: samples.len(),
            });
        }

        let mut ausgabe = vec![0u8; self.format.frame_bytes];
        match self.format.mode {
            CompressionMode::None => {
                for (ziel, sample) in ausgabe.chunks_exact_mut(2).zip(samples) {
                    ziel.copy_from_slice(&sample.to_be_bytes());
                }
            }
            CompressionMode::ImaAdpcm => {
                for (i, &sample) in samples.iter().enumerate() {
                    let code = self.zustand.encode_sample(sample);
                    ausgabe[i / 2] |= if i % 2 == 0 { code } else { code << 4 };
                }
            }
        }
        Ok(ausgabe)
    }

    /// Setzt den Zustand auf Praediktor 0 / Index 0 zurueck
    pub fn reset(&mut self) {
        self.zustand = AdpcmZustand::default();
    }

    pub fn zustand(&self) -> AdpcmZustand {
        self.zustand
    }

    pub fn format(&self) -> &AudioCompression {
        &self.format
    }
}

/// Decoder-Seite eines Streams
#[derive(Debug, Clone)]
pub struct AudioDecoder {
    format: AudioCompression,
    zustand: AdpcmZustand,
}

impl AudioDecoder {
    /// Dekomprimiert ein Paket aus genau `frame_bytes()` Bytes
    pub fn decode(&mut self, daten: &[u8]) -> AudioResult<Vec<i16>> {
        if daten.len() != self.format.frame_bytes {
            return Err(AudioError::UngueltigePaketLaenge {
                erwartet: self.format.frame_bytes,
                erhalten: daten.len(),
            });
        }

        let samples = match self.format.mode {
            CompressionMode::None => daten
                .chunks_exact(2)
                .map(|paar| i16::from_be_bytes([paar[0], paar[1]]))
                .collect(),
            CompressionMode::ImaAdpcm => (0..self.format.audio_len)
                .map(|i| {
                    let byte = daten[i / 2];
                    let code = if i % 2 == 0 { byte & 0x0F } else { byte >> 4 };
                    self.zustand.decode_sample(code)
                })
                .collect(),
        };
        Ok(samples)
    }

    pub fn reset(&mut self) {
        self.zustand = AdpcmZustand::default();
    }

    pub fn zustand(&self) -> AdpcmZustand {
        self.zustand
    }

    pub fn format(&self) -> &AudioCompression {
        &self.format
    }
}
