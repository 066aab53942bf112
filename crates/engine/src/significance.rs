//! Two-variant significance testing for A/B experiment results.
//!
//! Builds the 2x2 contingency table (conversions vs non-conversions per
//! variant) and runs a chi-square test with one degree of freedom. Results
//! below the minimum-sample gate are reported as insufficient data before
//! any statistic is computed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantStats {
    pub label: String,
    pub visits: u64,
    pub conversions: u64,
}

impl VariantStats {
    pub fn new(label: impl Into<String>, visits: u64, conversions: u64) -> Self {
        Self {
            label: label.into(),
            visits,
            conversions,
        }
    }

    fn conversion_rate(&self) -> f64 {
        self.conversions as f64 / self.visits as f64
    }
}

#[derive(Debug, Error)]
pub enum SignificanceError {
    #[error("variant {label} has zero visits")]
    ZeroVisits { label: String },
    #[error("variant {label} reports more conversions than visits")]
    ConversionsExceedVisits { label: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SignificanceOutcome {
    /// Combined conversions fell below the minimum-sample gate; no
    /// statistic was computed.
    InsufficientData {
        combined_conversions: u64,
        required: u64,
    },
    Tested(SignificanceReport),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceReport {
    pub chi_square: f64,
    pub p_value: f64,
    pub is_significant: bool,
    /// Label of the higher-converting variant, only when the result is
    /// significant and the rates actually differ. A tie never has a winner.
    pub winner: Option<String>,
    pub confidence_pct: f64,
}

pub fn evaluate(
    a: &VariantStats,
    b: &VariantStats,
    min_sample_conversions: u64,
    alpha: f64,
) -> Result<SignificanceOutcome, SignificanceError> {
    for variant in [a, b] {
        if variant.visits == 0 {
            return Err(SignificanceError::ZeroVisits {
                label: variant.label.clone(),
            });
        }
        if variant.conversions > variant.visits {
            return Err(SignificanceError::ConversionsExceedVisits {
                label: variant.label.clone(),
            });
        }
    }

    let combined_conversions = a.conversions + b.conversions;
    if combined_conversions < min_sample_conversions {
        return Ok(SignificanceOutcome::InsufficientData {
            combined_conversions,
            required: min_sample_conversions,
        });
    }

    let chi_square = chi_square_2x2(a, b);
    let p_value = chi_square_p_value_1df(chi_square);
    let is_significant = p_value < alpha;

    // Exact-rate comparison on integers: a tie must not surface a winner
    // regardless of sample-size imbalance.
    let rates_tied = a.conversions * b.visits == b.conversions * a.visits;
    let winner = if is_significant && !rates_tied {
        if a.conversion_rate() > b.conversion_rate() {
            Some(a.label.clone())
        } else {
            Some(b.label.clone())
        }
    } else {
        None
    };

    Ok(SignificanceOutcome::Tested(SignificanceReport {
        chi_square,
        p_value,
        is_significant,
        winner,
        confidence_pct: (1.0 - p_value) * 100.0,
    }))
}

fn chi_square_2x2(a: &VariantStats, b: &VariantStats) -> f64 {
    let total = (a.visits + b.visits) as f64;
    let converted = (a.conversions + b.conversions) as f64;
    let not_converted = total - converted;

    // Degenerate tables (everyone converted, or no one did) carry no signal.
    if converted == 0.0 || not_converted == 0.0 {
        return 0.0;
    }

    let a_miss = (a.visits - a.conversions) as f64;
    let b_miss = (b.visits - b.conversions) as f64;
    let cross = a.conversions as f64 * b_miss - b.conversions as f64 * a_miss;

    total * cross * cross
        / (converted * not_converted * a.visits as f64 * b.visits as f64)
}

/// Survival function of the chi-square distribution with 1 degree of
/// freedom: P(X^2 > x) = erfc(sqrt(x / 2)).
fn chi_square_p_value_1df(chi_square: f64) -> f64 {
    erfc((chi_square / 2.0).sqrt()).clamp(0.0, 1.0)
}

/// Complementary error function, Abramowitz & Stegun 7.1.26 rational
/// approximation (max absolute error 1.5e-7).
fn erfc(x: f64) -> f64 {
    const P: f64 = 0.3275911;
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;

    let t = 1.0 / (1.0 + P * x.abs());
    let poly = t * (A1 + t * (A2 + t * (A3 + t * (A4 + t * A5))));
    let tail = poly * (-x * x).exp();

    if x >= 0.0 { tail } else { 2.0 - tail }
}
