use crate::math::Matrix;

/// Sparse categorical cross-entropy for a Softmax output layer: targets are
/// class indices rather than one-hot rows.
pub struct SparseCrossEntropy;

/// Probabilities are clipped to `[EPS, 1 - EPS]` before the log.
const EPS: f32 = 1e-7;

impl SparseCrossEntropy {
    /// Mean over the batch of `-ln(p[label])`.
    ///
    /// `probs`: softmax output, shape `batch × n_classes`
    /// `labels`: one class index per row
    pub fn loss(probs: &Matrix, labels: &[usize]) -> f32 {
        assert_eq!(probs.rows, labels.len(), "one label per row");
        let total: f32 = labels.iter().enumerate()
            .map(|(r, &label)| -probs.row(r)[label].clamp(EPS, 1.0 - EPS).ln())
            .sum();
        total / labels.len() as f32
    }

    /// Gradient of the mean loss w.r.t. the pre-softmax logits:
    ///   ∂L/∂z = (p - onehot(label)) / batch
    ///
    /// The Softmax activation's own backward step is the identity, so the
    /// Jacobian is not applied twice.
    pub fn derivative(probs: &Matrix, labels: &[usize]) -> Matrix {
        let inv_batch = 1.0 / labels.len() as f32;
        let mut grad = probs.map(|p| p * inv_batch);
        for (r, &label) in labels.iter().enumerate() {
            grad.row_mut(r)[label] -= inv_batch;
        }
        grad
    }

    /// Number of rows whose argmax equals the label.
    pub fn correct(probs: &Matrix, labels: &[usize]) -> usize {
        labels.iter().enumerate()
            .filter(|&(r, &label)| argmax(probs.row(r)) == label)
            .count()
    }
}

/// Index of the maximum element in a slice.
pub fn argmax(v: &[f32]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn probs() -> Matrix {
        Matrix::from_rows(&[vec![0.7, 0.2, 0.1], vec![0.1, 0.3, 0.6]])
    }

    #[test]
    fn loss_is_mean_negative_log_likelihood() {
        let expected = -(0.7f32.ln() + 0.3f32.ln()) / 2.0;
        assert_abs_diff_eq!(SparseCrossEntropy::loss(&probs(), &[0, 1]), expected, epsilon = 1e-6);
    }

    #[test]
    fn zero_probability_is_clipped_not_infinite() {
        let p = Matrix::from_rows(&[vec![1.0, 0.0, 0.0]]);
        let loss = SparseCrossEntropy::loss(&p, &[1]);
        assert!(loss.is_finite());
        assert_abs_diff_eq!(loss, -(1e-7f32).ln(), epsilon = 1e-3);
    }

    #[test]
    fn derivative_is_scaled_prediction_minus_target() {
        let g = SparseCrossEntropy::derivative(&probs(), &[0, 2]);
        assert_abs_diff_eq!(g.row(0)[0], (0.7 - 1.0) / 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(g.row(0)[1], 0.2 / 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(g.row(1)[2], (0.6 - 1.0) / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn counts_correct_rows() {
        assert_eq!(SparseCrossEntropy::correct(&probs(), &[0, 2]), 2);
        assert_eq!(SparseCrossEntropy::correct(&probs(), &[1, 2]), 1);
    }
}
