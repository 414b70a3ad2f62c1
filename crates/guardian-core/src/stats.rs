//! Small numeric helpers shared by the detectors and the experiment engine.

/// Arithmetic mean (0.0 for an empty slice)
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance with divisor `n - 1` (0.0 for fewer than 2 values)
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Sample standard deviation (0.0 for fewer than 2 values)
pub fn std_dev(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Round to a fixed number of decimal places. Non-finite values pass through.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
