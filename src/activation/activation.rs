use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    Identity,
    /// Softmax is a vector-valued activation; `apply` normalises the whole
    /// slice it is given, so callers pass one output row at a time.
    Softmax,
}

impl ActivationFunction {
    /// Applies the activation in place. For `ReLU` and `Identity` the slice
    /// may be any run of values; for `Softmax` it must be exactly one row.
    pub fn apply(&self, values: &mut [f32]) {
        match self {
            ActivationFunction::ReLU => {
                for v in values.iter_mut() {
                    if *v < 0.0 {
                        *v = 0.0;
                    }
                }
            }
            ActivationFunction::Identity => {}
            ActivationFunction::Softmax => {
                let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0;
                for v in values.iter_mut() {
                    *v = (*v - max).exp();
                    sum += *v;
                }
                for v in values.iter_mut() {
                    *v /= sum;
                }
            }
        }
    }

    /// Turns ∂L/∂a into ∂L/∂z in place, using the activation's own output `a`.
    ///
    /// For `Softmax` the layer is paired with cross-entropy and the combined
    /// gradient `p - onehot` is already ∂L/∂z, so the gradient passes through
    /// unchanged.
    pub fn backward(&self, output: &[f32], grad: &mut [f32]) {
        match self {
            ActivationFunction::ReLU => {
                for (g, &a) in grad.iter_mut().zip(output) {
                    if a <= 0.0 {
                        *g = 0.0;
                    }
                }
            }
            ActivationFunction::Identity | ActivationFunction::Softmax => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn relu_clamps_negatives_and_masks_gradient() {
        let mut v = vec![-1.0, 0.0, 2.5];
        ActivationFunction::ReLU.apply(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 2.5]);

        let mut g = vec![1.0, 1.0, 1.0];
        ActivationFunction::ReLU.backward(&v, &mut g);
        assert_eq!(g, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn softmax_is_a_distribution_even_for_large_logits() {
        let mut v = vec![1000.0, 1001.0, 999.0];
        ActivationFunction::Softmax.apply(&mut v);
        assert_abs_diff_eq!(v.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert!(v[1] > v[0] && v[0] > v[2]);
    }
}
