use serde::{Serialize, Deserialize};

use crate::network::Gradients;

/// Adam hyper-parameters. The defaults are the usual ones with `ε = 1e-7`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub learning_rate: f32,
    pub beta_1: f32,
    pub beta_2: f32,
    pub epsilon: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        AdamConfig {
            learning_rate: 0.001,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-7,
        }
    }
}

/// First and second moment estimates for one parameter slot.
struct Moments {
    m: Vec<f32>,
    v: Vec<f32>,
}

pub struct Adam {
    pub config: AdamConfig,
    iterations: u64,
    moments: Vec<Moments>,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Adam {
        Adam {
            config,
            iterations: 0,
            moments: Vec::new(),
        }
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Applies one update to every parameter slot.
    ///
    /// `params` and `grads.slots` must be in the same order on every call
    /// (the order `Network::parameters_mut` yields); moment buffers are
    /// allocated on the first step.
    pub fn step(&mut self, params: Vec<&mut [f32]>, grads: &Gradients) {
        assert_eq!(params.len(), grads.slots.len(), "parameter/gradient slot mismatch");
        if self.moments.is_empty() {
            self.moments = params.iter()
                .map(|p| Moments { m: vec![0.0; p.len()], v: vec![0.0; p.len()] })
                .collect();
        }

        self.iterations += 1;
        let AdamConfig { learning_rate, beta_1, beta_2, epsilon } = self.config;
        let t = self.iterations as i32;
        let lr_t = learning_rate * (1.0 - beta_2.powi(t)).sqrt() / (1.0 - beta_1.powi(t));

        for ((param, grad), moments) in params.into_iter().zip(&grads.slots).zip(&mut self.moments) {
            assert_eq!(param.len(), grad.len(), "gradient length mismatch");
            for i in 0..param.len() {
                let g = grad[i];
                moments.m[i] = beta_1 * moments.m[i] + (1.0 - beta_1) * g;
                moments.v[i] = beta_2 * moments.v[i] + (1.0 - beta_2) * g * g;
                param[i] -= lr_t * moments.m[i] / (moments.v[i].sqrt() + epsilon);
            }
        }
    }
}
