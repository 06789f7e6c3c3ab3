//! Dimension normalization: every embedding provider declares a native
//! width; the adapter pads or truncates to a fixed target width so the
//! vector table has one uniform schema regardless of which provider
//! produced a given vector.

pub fn normalize_dimension(mut vector: Vec<f32>, target_dim: usize) -> Vec<f32> {
    match vector.len().cmp(&target_dim) {
        std::cmp::Ordering::Less => {
            vector.resize(target_dim, 0.0);
            vector
        }
        std::cmp::Ordering::Greater => {
            vector.truncate(target_dim);
            vector
        }
        std::cmp::Ordering::Equal => vector,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_short_vectors_with_zeros() {
        let v = normalize_dimension(vec![1.0, 2.0], 5);
        assert_eq!(v, vec![1.0, 2.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn truncates_long_vectors() {
        let v = normalize_dimension(vec![1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(v, vec![1.0, 2.0]);
    }

    #[test]
    fn leaves_matching_width_untouched() {
        let v = normalize_dimension(vec![1.0, 2.0, 3.0], 3);
        assert_eq!(v, vec![1.0, 2.0, 3.0]);
    }
}
