/// Parameter gradients of a whole `Network`, one flat slot per parameter
/// tensor, in the order `Network::parameters_mut` yields them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Gradients {
    pub slots: Vec<Vec<f32>>,
}

impl Gradients {
    /// Global L2 norm over every slot.
    pub fn norm(&self) -> f32 {
        self.slots.iter()
            .flat_map(|s| s.iter())
            .map(|g| g * g)
            .sum::<f32>()
            .sqrt()
    }
}

/// Element-wise `acc += g`.
pub(crate) fn accumulate(acc: &mut [f32], g: &[f32]) {
    for (a, b) in acc.iter_mut().zip(g) {
        *a += b;
    }
}
