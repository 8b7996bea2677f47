use super::matrix::Matrix;
use std::any::Any;

pub trait Layer {
    fn forward(&mut self, input: &Matrix) -> Matrix;
    fn backward(&mut self, d_output: &Matrix) -> Matrix;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_box(&self) -> Box<dyn Layer>;
}

// dense layer

#[derive(Clone)]
pub struct Dense {
    pub weights: Matrix,
    pub biases: Matrix,
    cached_input: Option<Matrix>, // for back propagation
    pub d_weights: Option<Matrix>,
    pub d_biases: Option<Matrix>,
}

impl Dense {
    pub fn new(input_size: usize, output_size: usize) -> Self {
        // He initialization
        let std_dev = (2.0 / input_size as f32).sqrt();
        Self {
            weights: Matrix::randn(input_size, output_size, std_dev),
            biases: Matrix::zeros(1, output_size),
            cached_input: None,
            d_weights: None,
            d_biases: None,
        }
    }
}

impl Layer for Dense {
    fn forward(&mut self, input: &Matrix) -> Matrix {
        self.cached_input = Some(input.clone());

        let mut output = input.matmul(&self.weights);
        output.add_row(&self.biases);
        output
    }

    fn backward(&mut self, d_output: &Matrix) -> Matrix {
        let cached_input = self
            .cached_input
            .as_ref()
            .unwrap_or_else(|| panic!("complete forward pass first"));

        // dL/dW = input.T @ dL/dY
        self.d_weights = Some(cached_input.t_matmul(d_output));

        // dL/db = dL/dY summed over the batch
        self.d_biases = Some(d_output.column_sums());

        // dL/dX = dL/dY @ weights.T
        d_output.matmul_t(&self.weights)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

// relu layer

#[derive(Clone)]
pub struct Relu {
    cached_input: Option<Matrix>,
}

impl Relu {
    pub fn new() -> Self {
        Self { cached_input: None }
    }
}

impl Default for Relu {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for Relu {
    fn forward(&mut self, input: &Matrix) -> Matrix {
        self.cached_input = Some(input.clone());
        input.map(|x| x.max(0.0))
    }

    fn backward(&mut self, d_output: &Matrix) -> Matrix {
        let cached_input = self
            .cached_input
            .as_ref()
            .unwrap_or_else(|| panic!("complete forward pass first"));

        cached_input.zip_map(d_output, |x, d| if x > 0.0 { d } else { 0.0 })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}
