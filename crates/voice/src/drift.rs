//! Clock-Drift-Schaetzung aus Zeitstempel-Echos
//!
//! Der Server sendet alle `zeitstempel_intervall` Bloecke einen 8-Bit-Index,
//! den der Client zurueckschickt. Aus den Paaren (vergangene Zeit, Index)
//! ueber ein gleitendes Fenster wird per linearer Regression die tatsaechliche
//! Abtastrate des Clients geschaetzt.
//!
//! ## Ablauf pro Zeitstempel
//! 1. Wrap-Around des 8-Bit-Index ueber einen Akkumulator ausgleichen
//! 2. Paar in den FIFO schieben, aeltestes verwerfen
//! 3. Steigung = Σ(Δt·Δi) / Σ(Δt²)
//! 4. Rate = Steigung × Intervall × Blockgroesse × 1000 (ms -> s)
//!
//! Die ersten `fenster + 1` Aktualisierungen sind Aufwaermphase; waehrenddessen
//! bleibt die vorherige Schaetzung (nach Reset: Nominalrate) gueltig.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wertebereich des Zeitstempel-Index auf der Leitung
const INDEX_WRAP: i64 = u8::MAX as i64 + 1;

// ---------------------------------------------------------------------------
// Uhren
// ---------------------------------------------------------------------------

/// Monotone Zeitquelle
pub trait Clock: Send + Sync {
    /// Zeit seit einem beliebigen, festen Ursprung
    fn jetzt(&self) -> Duration;
}

/// Echte monotone Uhr (`Instant`)
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn neu() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::neu()
    }
}

impl Clock for SystemClock {
    fn jetzt(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Manuell gesteuerte Uhr fuer deterministische Tests
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Stellt die Uhr um `dauer` vor
    pub fn vorstellen(&self, dauer: Duration) {
        self.nanos
            .fetch_add(dauer.as_nanos() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn jetzt(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Parameter der Drift-Schaetzung
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftConfig {
    /// Laenge des Regressionsfensters (Anzahl Zeitstempel)
    pub fenster: usize,
    /// Bloecke zwischen zwei Zeitstempeln
    pub zeitstempel_intervall: u32,
    /// Samples pro Block
    pub block_len: usize,
    /// Nominale Abtastrate in Hz
    pub nominal_rate: f64,
}

// ---------------------------------------------------------------------------
// ClockDriftEstimator
// ---------------------------------------------------------------------------

/// Gleitende Regression ueber (Zeit in ms, akkumulierter Index)
pub struct ClockDriftEstimator {
    config: DriftConfig,
    uhr: Arc<dyn Clock>,
    /// Referenzzeitpunkt des letzten Resets
    referenz: Duration,
    zeiten_ms: VecDeque<f64>,
    indizes: VecDeque<i64>,
    /// Summe aller bisherigen Wrap-Arounds (Vielfache von 256)
    akkumulator: i64,
    /// Verbleibende Aktualisierungen bis zur ersten Veroeffentlichung
    aufwaermen: usize,
    geschaetzte_rate: f64,
}

impl ClockDriftEstimator {
    pub fn neu(config: DriftConfig, uhr: Arc<dyn Clock>) -> Self {
        let mut schaetzer = Self {
            config,
            referenz: uhr.jetzt(),
            uhr,
            zeiten_ms: VecDeque::with_capacity(config.fenster),
            indizes: VecDeque::with_capacity(config.fenster),
            akkumulator: 0,
            aufwaermen: 0,
            geschaetzte_rate: config.nominal_rate,
        };
        schaetzer.reset();
        schaetzer
    }

    /// Leert das Fenster, startet die Referenzzeit neu und beginnt die
    /// Aufwaermphase von vorn
    pub fn reset(&mut self) {
        let fenster = self.config.fenster.max(1);
        self.zeiten_ms.clear();
        self.zeiten_ms.resize(fenster, 0.0);
        self.indizes.clear();
        self.indizes.resize(fenster, 0);
        self.referenz = self.uhr.jetzt();
        self.akkumulator = 0;
        self.aufwaermen = fenster + 1;
        self.geschaetzte_rate = self.config.nominal_rate;
    }

    /// Verarbeitet einen empfangenen Zeitstempel-Index
    pub fn add_time_stamp_idx(&mut self, roh: u8) {
        let roh = i64::from(roh);

        // Byte-Wrap: neuer Rohwert kleiner als der vorherige Rohwert
        let letzter_roh = self.indizes.back().copied().unwrap_or(0) - self.akkumulator;
        if roh < letzter_roh {
            self.akkumulator += INDEX_WRAP;
        }

        let vergangen = self.uhr.jetzt().saturating_sub(self.referenz);
        self.zeiten_ms.pop_front();
        self.indizes.pop_front();
        self.zeiten_ms.push_back(vergangen.as_secs_f64() * 1000.0);
        self.indizes.push_back(self.akkumulator + roh);

        let steigung = self.regression();

        if self.aufwaermen > 0 {
            self.aufwaermen -= 1;
            return;
        }

        match steigung {
            Some(steigung) => {
                self.geschaetzte_rate = steigung
                    * f64::from(self.config.zeitstempel_intervall)
                    * self.config.block_len as f64
                    * 1000.0;
                tracing::trace!(rate = self.geschaetzte_rate, "Abtastrate geschaetzt");
            }
            None => {
                tracing::debug!("Regression entartet, vorherige Schaetzung bleibt");
            }
        }
    }

    /// Steigung Index/ms ueber das Fenster; `None` wenn der Nenner 0 ist
    fn regression(&self) -> Option<f64> {
        let n = self.zeiten_ms.len() as f64;
        let zeit_mittel = self.zeiten_ms.iter().sum::<f64>() / n;
        let index_mittel = self.indizes.iter().map(|&i| i as f64).sum::<f64>() / n;

        let (zaehler, nenner) = self
            .zeiten_ms
            .iter()
            .zip(&self.indizes)
            .fold((0.0, 0.0), |(z, q), (&t, &i)| {
                let dt = t - zeit_mittel;
                (z + dt * (i as f64 - index_mittel), q + dt * dt)
            });

        if nenner == 0.0 {
            return None;
        }
        let steigung = zaehler / nenner;
        steigung.is_finite().then_some(steigung)
    }

    /// Aktuell gueltige Schaetzung der Client-Abtastrate in Hz
    pub fn geschaetzte_rate(&self) -> f64 {
        self.geschaetzte_rate
    }

    /// Abweichung der Schaetzung von der Nominalrate in Hz
    pub fn abweichung_hz(&self) -> f64 {
        self.geschaetzte_rate - self.config.nominal_rate
    }

    /// `true` sobald die Aufwaermphase abgeschlossen ist
    pub fn aufgewaermt(&self) -> bool {
        self.aufwaermen == 0
    }

    /// Akkumulierte Indizes im Fenster, aelteste zuerst
    pub fn akkumulierte_indizes(&self) -> impl Iterator<Item = i64> + '_ {
        self.indizes.iter().copied()
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }
}

impl std::fmt::Debug for ClockDriftEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockDriftEstimator")
            .field("config", &self.config)
            .field("akkumulator", &self.akkumulator)
            .field("aufwaermen", &self.aufwaermen)
            .field("geschaetzte_rate", &self.geschaetzte_rate)
            .finish()
    }
}
