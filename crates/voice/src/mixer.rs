//! Summen-Mischer fuer die Frames aller verbundenen Kanaele
//!
//! Additives Mischen in i32 mit anschliessender Saettigung auf den
//! i16-Wertebereich. Keine Normalisierung: ein einzelner Sprecher kommt
//! unveraendert an.

use crate::channel_set::KanalBlock;

/// Mischt alle Bloecke zu einem Frame aus `frame_len` Samples
///
/// Kuerzere Bloecke werden mit Stille aufgefuellt, laengere abgeschnitten.
pub fn mischen(bloecke: &[KanalBlock], frame_len: usize) -> Vec<i16> {
    let mut summe = vec![0i32; frame_len];

    for block in bloecke {
        for (ziel, &sample) in summe.iter_mut().zip(&block.samples) {
            *ziel += i32::from(sample);
        }
    }

    summe
        .into_iter()
        .map(|s| s.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16)
        .collect()
}
