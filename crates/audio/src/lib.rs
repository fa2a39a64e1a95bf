//! klangraum-audio – Audio-Kompression
//!
//! - IMA-ADPCM (4:1, tabellengesteuert) mit persistentem Zustand pro Stream
//! - Kompressions-Auswahl (keine / IMA-ADPCM) mit fester Paketgroesse
//! - Block-Wandlung von Soundkarten-Bloecken auf Netzwerk-Bloecke

pub mod codec;
pub mod conversion;
pub mod error;

pub use codec::{AdpcmZustand, AudioCompression, AudioDecoder, AudioEncoder, CompressionMode};
pub use conversion::ConversionBuffer;
pub use error::{AudioError, AudioResult};
