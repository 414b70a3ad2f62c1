//! Two-sample statistics for experiment analysis.
//!
//! The p-value uses a normal approximation to the t distribution, with the
//! Abramowitz & Stegun 7.1.26 polynomial for `erf`. Results therefore differ
//! slightly from an exact Student-t test at small sample sizes.

use llm_guardian_core::stats::{mean, sample_variance};

const A1: f64 = 0.254829592;
const A2: f64 = -0.284496736;
const A3: f64 = 1.421413741;
const A4: f64 = -1.453152027;
const A5: f64 = 1.061405429;
const P: f64 = 0.3275911;

/// Abramowitz & Stegun approximation of the error function
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// Standard normal CDF
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Two-sided p-value for a test statistic, clamped to `[0, 1]`
pub fn two_sided_p_value(t: f64) -> f64 {
    if t.is_nan() {
        return 1.0;
    }
    (2.0 * normal_cdf(-t.abs())).clamp(0.0, 1.0)
}

/// Welch's t statistic for `treatment - control`.
///
/// Zero when both sample variances vanish.
pub fn welch_t(control: &[f64], treatment: &[f64]) -> f64 {
    let n1 = control.len() as f64;
    let n2 = treatment.len() as f64;
    let se = (sample_variance(control) / n1 + sample_variance(treatment) / n2).sqrt();
    if se == 0.0 || !se.is_finite() {
        return 0.0;
    }
    (mean(treatment) - mean(control)) / se
}

/// Pooled standard deviation; 1.0 when there are not enough samples
pub fn pooled_std(control: &[f64], treatment: &[f64]) -> f64 {
    let n1 = control.len();
    let n2 = treatment.len();
    if n1 + n2 <= 2 {
        return 1.0;
    }
    let pooled_var = ((n1.saturating_sub(1)) as f64 * sample_variance(control)
        + (n2.saturating_sub(1)) as f64 * sample_variance(treatment))
        / (n1 + n2 - 2) as f64;
    pooled_var.sqrt()
}

/// Cohen's d for `treatment - control`; zero when the pooled std vanishes
pub fn cohens_d(control: &[f64], treatment: &[f64]) -> f64 {
    let pooled = pooled_std(control, treatment);
    if pooled == 0.0 {
        return 0.0;
    }
    (mean(treatment) - mean(control)) / pooled
}

/// Relative lift over control in percent; zero unless control mean is positive
pub fn improvement_pct(control_mean: f64, treatment_mean: f64) -> f64 {
    if control_mean <= 0.0 {
        return 0.0;
    }
    (treatment_mean - control_mean) / control_mean * 100.0
}
