use super::layer::{Dense, Layer};

pub trait Optimizer {
    fn step(&self, layers: &mut [Box<dyn Layer>]);
    fn clone_box(&self) -> Box<dyn Optimizer>;
}

// SGD

#[derive(Clone)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&self, layers: &mut [Box<dyn Layer>]) {
        for layer in layers {
            if let Some(dense) = layer.as_any_mut().downcast_mut::<Dense>() {
                if let (Some(d_weights), Some(d_biases)) = (&dense.d_weights, &dense.d_biases) {
                    let new_weights = dense
                        .weights
                        .zip_map(d_weights, |w, dw| w - self.learning_rate * dw);
                    let new_biases = dense
                        .biases
                        .zip_map(d_biases, |b, db| b - self.learning_rate * db);

                    dense.weights = new_weights;
                    dense.biases = new_biases;
                }
            }
        }
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}
