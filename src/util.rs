/// How many times smaller a corpus became, given its encoded size before and
/// after compression.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compression_factor(initial_size: usize, final_size: usize) -> f64 {
    initial_size as f64 / final_size as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_is_a_ratio_of_sizes() {
        assert!((compression_factor(54, 37) - 54.0 / 37.0).abs() < f64::EPSILON);
        assert!((compression_factor(10, 10) - 1.0).abs() < f64::EPSILON);
        assert!(compression_factor(3, 0).is_infinite());
    }
}
