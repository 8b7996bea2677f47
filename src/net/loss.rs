use super::matrix::Matrix;

pub trait Loss {
    fn calculate(&self, y_pred: &Matrix, y_true: &Matrix) -> f32;
    fn gradient(&self, y_pred: &Matrix, y_true: &Matrix) -> Matrix;
    fn clone_box(&self) -> Box<dyn Loss>;
}

// mean squared error

#[derive(Clone)]
pub struct MeanSquaredError;

impl Loss for MeanSquaredError {
    fn calculate(&self, y_pred: &Matrix, y_true: &Matrix) -> f32 {
        let squared_errors = y_pred.zip_map(y_true, |p, t| (p - t) * (p - t));
        squared_errors.data.iter().sum::<f32>() / y_pred.rows as f32
    }

    fn gradient(&self, y_pred: &Matrix, y_true: &Matrix) -> Matrix {
        let batch_size = y_pred.rows as f32;
        y_pred.zip_map(y_true, move |p, t| 2.0 * (p - t) / batch_size)
    }

    fn clone_box(&self) -> Box<dyn Loss> {
        Box::new(self.clone())
    }
}
