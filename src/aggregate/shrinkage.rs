//! Bayesian shrinkage of small-sample rates toward a population prior.
//!
//! ```text
//! regressed = n/(n+C) · raw + C/(n+C) · prior
//! ```
//!
//! `C` is a pseudo-sample size chosen once per entity type. The prior is
//! the pooled rate of the whole population, so the sample-weighted residuals
//! `Σ n·(raw − prior)` cancel exactly; anything else means the prior was
//! computed over a different population than the one being regressed.

use crate::error::{RinkError, Result};

/// Raw counts for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct RateInput {
    pub entity_id: i64,
    /// Events counted (goals, goals allowed)
    pub numerator: f64,
    /// Opportunities (attempts, shots faced); the sample size `n`
    pub denominator: f64,
}

impl RateInput {
    pub fn new(entity_id: i64, numerator: f64, denominator: f64) -> Self {
        Self {
            entity_id,
            numerator,
            denominator,
        }
    }

    pub fn raw_rate(&self) -> Option<f64> {
        (self.denominator > 0.0).then(|| self.numerator / self.denominator)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShrunkRate {
    pub entity_id: i64,
    pub sample_size: f64,
    pub raw_rate: f64,
    pub regressed_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopulationRates {
    pub prior: f64,
    pub prior_strength: f64,
    pub rates: Vec<ShrunkRate>,
}

pub fn regress(raw: f64, n: f64, prior: f64, prior_strength: f64) -> f64 {
    let total = n + prior_strength;
    if total <= 0.0 {
        return prior;
    }
    (n / total) * raw + (prior_strength / total) * prior
}

/// Pooled rate `Σ numerator / Σ denominator`; `None` for an empty population.
pub fn prior_rate(inputs: &[RateInput]) -> Option<f64> {
    let (num, den) = inputs
        .iter()
        .filter(|i| i.denominator > 0.0)
        .fold((0.0, 0.0), |(num, den), i| (num + i.numerator, den + i.denominator));
    (den > 0.0).then(|| num / den)
}

/// Regress every entity with a non-zero sample toward the pooled prior.
pub fn shrink_population(inputs: &[RateInput], prior_strength: f64) -> Option<PopulationRates> {
    let prior = prior_rate(inputs)?;
    let rates = inputs
        .iter()
        .filter_map(|input| {
            let raw = input.raw_rate()?;
            Some(ShrunkRate {
                entity_id: input.entity_id,
                sample_size: input.denominator,
                raw_rate: raw,
                regressed_rate: regress(raw, input.denominator, prior, prior_strength),
            })
        })
        .collect();
    Some(PopulationRates {
        prior,
        prior_strength,
        rates,
    })
}

/// Normalised weighted residual `Σ n·(raw − prior) / Σ n`.
pub fn weighted_residual(inputs: &[RateInput], prior: f64) -> f64 {
    let (sum, weight) = inputs
        .iter()
        .filter_map(|i| i.raw_rate().map(|raw| (i.denominator, raw)))
        .fold((0.0, 0.0), |(sum, weight), (n, raw)| (sum + n * (raw - prior), weight + n));
    if weight > 0.0 {
        sum / weight
    } else {
        0.0
    }
}

/// Fails when the prior does not balance the population it came from.
pub fn consistency_check(inputs: &[RateInput], prior: f64, tolerance: f64) -> Result<f64> {
    let residual = weighted_residual(inputs, prior);
    if residual.abs() > tolerance {
        return Err(RinkError::Validation(format!(
            "prior {prior:.6} leaves weighted residual {residual:.6} (tolerance {tolerance})"
        )));
    }
    Ok(residual)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn population() -> Vec<RateInput> {
        vec![
            RateInput::new(1, 30.0, 1000.0),
            RateInput::new(2, 9.0, 100.0),
            RateInput::new(3, 0.0, 20.0),
            RateInput::new(4, 12.0, 400.0),
        ]
    }

    #[test]
    fn regress_blends_by_sample_size() {
        assert!((regress(0.2, 100.0, 0.1, 100.0) - 0.15).abs() < 1e-12);
        assert_eq!(regress(0.2, 0.0, 0.1, 100.0), 0.1);
        assert_eq!(regress(0.2, 50.0, 0.1, 0.0), 0.2);
        assert_eq!(regress(0.2, 0.0, 0.1, 0.0), 0.1);
    }

    #[test]
    fn prior_is_pooled_rate() {
        let prior = prior_rate(&population()).unwrap();
        assert!((prior - 51.0 / 1520.0).abs() < 1e-12);
        assert_eq!(prior_rate(&[]), None);
        assert_eq!(prior_rate(&[RateInput::new(1, 0.0, 0.0)]), None);
    }

    #[test]
    fn regressed_rate_lies_between_raw_and_prior() {
        let out = shrink_population(&population(), 150.0).unwrap();
        assert_eq!(out.rates.len(), 4);
        for r in &out.rates {
            let lo = r.raw_rate.min(out.prior);
            let hi = r.raw_rate.max(out.prior);
            assert!(r.regressed_rate >= lo && r.regressed_rate <= hi, "{r:?}");
        }
    }

    #[test]
    fn smaller_sample_is_pulled_closer_to_prior() {
        let prior = 0.1;
        let raw = 0.25;
        let small = regress(raw, 20.0, prior, 100.0);
        let large = regress(raw, 500.0, prior, 100.0);
        assert!((small - prior).abs() < (large - prior).abs());

        let same_small = regress(prior, 20.0, prior, 100.0);
        let same_large = regress(prior, 500.0, prior, 100.0);
        assert!((same_small - same_large).abs() < 1e-12);
    }

    #[test]
    fn zero_sample_entities_are_omitted() {
        let mut inputs = population();
        inputs.push(RateInput::new(99, 0.0, 0.0));
        let out = shrink_population(&inputs, 150.0).unwrap();
        assert!(out.rates.iter().all(|r| r.entity_id != 99));
    }

    #[test]
    fn pooled_prior_passes_consistency() {
        let inputs = population();
        let prior = prior_rate(&inputs).unwrap();
        let residual = consistency_check(&inputs, prior, 1e-9).unwrap();
        assert!(residual.abs() < 1e-12);
    }

    #[test]
    fn wrong_prior_is_flagged() {
        let inputs = population();
        let err = consistency_check(&inputs, 0.2, 1e-6).unwrap_err();
        assert!(matches!(err, RinkError::Validation(_)));
    }
}
