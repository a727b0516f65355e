//! Stochastic dwell-time sampling for containers at a terminal.
//!
//! A single process-wide generator backs every draw so that concurrent
//! terminals never share distribution state incorrectly; customs delays get
//! a per-call generator seeded from the global one.

use std::sync::{LazyLock, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Gamma, LogNormal, Normal};
use tracing::warn;

use termsim_core::{SimError, SimResult};

const DAY_SECONDS: f64 = 24.0 * 3600.0;

/// Process-global generator, seeded from the wall clock at first use.
static GENERATOR: LazyLock<Mutex<StdRng>> = LazyLock::new(|| {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    Mutex::new(StdRng::seed_from_u64(nanos))
});

fn generator() -> MutexGuard<'static, StdRng> {
    GENERATOR.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Uniform draw in [0, 1) from the global generator. Used for the customs
/// inspection coin flip.
pub fn global_f64() -> f64 {
    generator().gen::<f64>()
}

/// Dwell-time distribution with validated parameters.
///
/// All four sample non-negative durations in seconds; Normal is
/// rejection-truncated at zero.
#[derive(Debug, Clone, PartialEq)]
pub enum DwellDistribution {
    Gamma { shape: f64, scale: f64 },
    Exponential { scale: f64 },
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mean: f64, sigma: f64 },
}

impl DwellDistribution {
    pub fn gamma(shape: f64, scale: f64) -> SimResult<Self> {
        if shape <= 0.0 || scale <= 0.0 {
            return Err(SimError::InvalidArgs(format!(
                "Shape and scale parameters must be positive for gamma distribution \
                 (shape = {shape}, scale = {scale})"
            )));
        }
        Ok(DwellDistribution::Gamma { shape, scale })
    }

    pub fn exponential(scale: f64) -> SimResult<Self> {
        if scale <= 0.0 {
            return Err(SimError::InvalidArgs(format!(
                "Scale parameter must be positive for exponential distribution (scale = {scale})"
            )));
        }
        Ok(DwellDistribution::Exponential { scale })
    }

    pub fn normal(mean: f64, std_dev: f64) -> SimResult<Self> {
        if std_dev <= 0.0 {
            return Err(SimError::InvalidArgs(format!(
                "Standard deviation must be positive for normal distribution (std_dev = {std_dev})"
            )));
        }
        Ok(DwellDistribution::Normal { mean, std_dev })
    }

    pub fn log_normal(mean: f64, sigma: f64) -> SimResult<Self> {
        if sigma <= 0.0 {
            return Err(SimError::InvalidArgs(format!(
                "Sigma parameter must be positive for lognormal distribution (sigma = {sigma})"
            )));
        }
        Ok(DwellDistribution::LogNormal { mean, sigma })
    }

    /// Resolves a distribution from a method name (case-insensitive) and a
    /// parameter map, filling missing parameters with the stock defaults
    /// (roughly two days of dwell). An unknown method falls back to gamma
    /// defaults.
    pub fn from_method(method: &str, params: &IndexMap<String, f64>) -> SimResult<Self> {
        let get = |key: &str, default: f64| params.get(key).copied().unwrap_or(default);

        match method.to_ascii_lowercase().as_str() {
            "gamma" => Self::gamma(get("shape", 2.0), get("scale", DAY_SECONDS)),
            "exponential" => Self::exponential(get("scale", 2.0 * DAY_SECONDS)),
            "normal" => Self::normal(
                get("mean", 2.0 * DAY_SECONDS),
                get("std_dev", 0.5 * DAY_SECONDS),
            ),
            "lognormal" => Self::log_normal(get("mean", (2.0 * DAY_SECONDS).ln()), get("sigma", 0.25)),
            other => {
                warn!(method = other, "Invalid distribution method, defaulting to gamma");
                Self::gamma(2.0, DAY_SECONDS)
            }
        }
    }

    /// Draws one dwell duration in seconds.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            DwellDistribution::Gamma { shape, scale } => {
                // Parameters were validated at construction.
                Gamma::new(shape, scale).expect("validated gamma parameters").sample(rng)
            }
            DwellDistribution::Exponential { scale } => {
                Exp::new(1.0 / scale).expect("validated exponential rate").sample(rng)
            }
            DwellDistribution::Normal { mean, std_dev } => {
                let dist = Normal::new(mean, std_dev).expect("validated normal parameters");
                loop {
                    let value = dist.sample(rng);
                    if value >= 0.0 {
                        return value;
                    }
                }
            }
            DwellDistribution::LogNormal { mean, sigma } => {
                LogNormal::new(mean, sigma).expect("validated lognormal parameters").sample(rng)
            }
        }
    }
}

/// Departure-time composer: `arrival + dwell`, with the dwell drawn from the
/// named distribution.
pub fn get_departure_time(
    arrival_time: f64,
    method: &str,
    params: &IndexMap<String, f64>,
) -> SimResult<f64> {
    let distribution = DwellDistribution::from_method(method, params)?;
    let dwell = distribution.sample(&mut *generator());
    Ok(arrival_time + dwell)
}

/// Customs delay in hours: `Normal(mean, sqrt(variance))` truncated at zero,
/// drawn from a one-shot generator seeded off the global one.
pub fn sample_customs_delay(delay_mean: f64, delay_variance: f64) -> f64 {
    let std_dev = if delay_variance > 0.0 {
        delay_variance.sqrt()
    } else {
        1.0
    };
    let seed = generator().gen::<u64>();
    let mut rng = StdRng::seed_from_u64(seed);
    match Normal::new(delay_mean, std_dev) {
        Ok(dist) => dist.sample(&mut rng).max(0.0),
        Err(_) => delay_mean.max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: &[(&str, f64)]) -> IndexMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn gamma_mean_tracks_shape_times_scale() {
        let dist = DwellDistribution::gamma(2.0, DAY_SECONDS).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 2000;
        let mean: f64 = (0..n).map(|_| dist.sample(&mut rng)).sum::<f64>() / n as f64;
        let expected = 2.0 * DAY_SECONDS;
        assert!((mean - expected).abs() < 0.2 * expected, "mean = {mean}");
    }

    #[test]
    fn exponential_mean_tracks_scale() {
        let scale = 2.0 * DAY_SECONDS;
        let dist = DwellDistribution::exponential(scale).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let n = 2000;
        let mean: f64 = (0..n).map(|_| dist.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - scale).abs() < 0.2 * scale, "mean = {mean}");
    }

    #[test]
    fn normal_never_goes_negative() {
        // Mean close to zero so the untruncated distribution would produce
        // plenty of negatives.
        let dist = DwellDistribution::normal(10.0, 100.0).unwrap();
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..500 {
            assert!(dist.sample(&mut rng) >= 0.0);
        }
    }

    #[test]
    fn lognormal_stays_positive() {
        let dist = DwellDistribution::log_normal((2.0 * DAY_SECONDS).ln(), 0.25).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..500 {
            assert!(dist.sample(&mut rng) > 0.0);
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(DwellDistribution::gamma(0.0, 1.0).is_err());
        assert!(DwellDistribution::gamma(1.0, -5.0).is_err());
        assert!(DwellDistribution::exponential(0.0).is_err());
        assert!(DwellDistribution::normal(1.0, 0.0).is_err());
        assert!(DwellDistribution::log_normal(1.0, -0.1).is_err());
    }

    #[test]
    fn method_resolution_is_case_insensitive() {
        let dist = DwellDistribution::from_method("GAMMA", &params(&[("shape", 3.0)])).unwrap();
        assert_eq!(
            dist,
            DwellDistribution::Gamma {
                shape: 3.0,
                scale: DAY_SECONDS
            }
        );
    }

    #[test]
    fn unknown_method_falls_back_to_gamma_defaults() {
        let dist = DwellDistribution::from_method("weibull", &params(&[("scale", 1.0)])).unwrap();
        assert_eq!(
            dist,
            DwellDistribution::Gamma {
                shape: 2.0,
                scale: DAY_SECONDS
            }
        );
    }

    #[test]
    fn departure_time_adds_dwell_to_arrival() {
        let arrival = 1000.0;
        let departure =
            get_departure_time(arrival, "gamma", &params(&[("shape", 2.0), ("scale", 3600.0)]))
                .unwrap();
        assert!(departure > arrival);
    }

    #[test]
    fn customs_delay_is_non_negative() {
        for _ in 0..200 {
            assert!(sample_customs_delay(0.5, 4.0) >= 0.0);
        }
        // Zero variance falls back to unit standard deviation.
        assert!(sample_customs_delay(24.0, 0.0) >= 0.0);
    }
}
