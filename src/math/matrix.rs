use serde::{Serialize, Deserialize};

/// Row-major `f32` matrix. Dense layers keep their kernels in one of these
/// (shape `inputs × units`) and a mini-batch flows through them as a
/// `batch × features` matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wraps a flat row-major buffer. Panics if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Matrix {
        assert_eq!(data.len(), rows * cols, "Matrix buffer does not match {}x{}", rows, cols);
        Matrix { rows, cols, data }
    }

    /// Stacks equally long rows into a matrix.
    pub fn from_rows(rows: &[Vec<f32>]) -> Matrix {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            assert_eq!(row.len(), cols, "Matrix rows must have equal length");
            data.extend_from_slice(row);
        }
        Matrix { rows: rows.len(), cols, data }
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn transpose(&self) -> Matrix {
        let mut res = Matrix::zeros(self.cols, self.rows);

        for i in 0..self.rows {
            for j in 0..self.cols {
                res.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }

        res
    }

    pub fn map<F>(&self, functor: F) -> Matrix
    where
        F: Fn(f32) -> f32,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// `self * rhs`.
    pub fn matmul(&self, rhs: &Matrix) -> Matrix {
        if self.cols != rhs.rows {
            panic!("Matrices are of incorrect sizes")
        }

        let mut res = Matrix::zeros(self.rows, rhs.cols);

        for i in 0..self.rows {
            let out = &mut res.data[i * rhs.cols..(i + 1) * rhs.cols];
            for k in 0..self.cols {
                let a = self.data[i * self.cols + k];
                if a == 0.0 {
                    continue;
                }
                let rhs_row = &rhs.data[k * rhs.cols..(k + 1) * rhs.cols];
                for (o, &b) in out.iter_mut().zip(rhs_row) {
                    *o += a * b;
                }
            }
        }

        res
    }

    /// `selfᵀ * rhs` without materialising the transpose.
    pub fn t_matmul(&self, rhs: &Matrix) -> Matrix {
        if self.rows != rhs.rows {
            panic!("Matrices are of incorrect sizes")
        }

        let mut res = Matrix::zeros(self.cols, rhs.cols);

        for r in 0..self.rows {
            let rhs_row = rhs.row(r);
            for (i, &a) in self.row(r).iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                let out = &mut res.data[i * rhs.cols..(i + 1) * rhs.cols];
                for (o, &b) in out.iter_mut().zip(rhs_row) {
                    *o += a * b;
                }
            }
        }

        res
    }

    /// `self * rhsᵀ` without materialising the transpose.
    pub fn matmul_t(&self, rhs: &Matrix) -> Matrix {
        if self.cols != rhs.cols {
            panic!("Matrices are of incorrect sizes")
        }

        let mut res = Matrix::zeros(self.rows, rhs.rows);

        for i in 0..self.rows {
            let lhs_row = self.row(i);
            for j in 0..rhs.rows {
                res.data[i * rhs.rows + j] = lhs_row.iter()
                    .zip(rhs.row(j))
                    .map(|(a, b)| a * b)
                    .sum();
            }
        }

        res
    }

    /// Adds `bias` to every row.
    pub fn add_row(&mut self, bias: &[f32]) {
        assert_eq!(bias.len(), self.cols);
        for row in self.data.chunks_mut(self.cols) {
            for (x, b) in row.iter_mut().zip(bias) {
                *x += b;
            }
        }
    }

    /// Sum of each column, i.e. the reduction over the batch dimension.
    pub fn column_sums(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.cols];
        for row in self.data.chunks(self.cols) {
            for (s, x) in sums.iter_mut().zip(row) {
                *s += x;
            }
        }
        sums
    }

    /// Element-wise (Hadamard) product of two same-shape matrices.
    pub fn hadamard(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(self.rows, rhs.rows);
        assert_eq!(self.cols, rhs.cols);
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().zip(&rhs.data).map(|(a, b)| a * b).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Matrix, Matrix) {
        let a = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        let b = Matrix::from_rows(&[vec![7.0, 8.0], vec![9.0, 10.0], vec![11.0, 12.0]]);
        (a, b)
    }

    #[test]
    fn matmul_matches_hand_computed_product() {
        let (a, b) = sample();
        let c = a.matmul(&b);
        assert_eq!((c.rows, c.cols), (2, 2));
        assert_eq!(c.data, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn transposed_products_agree_with_explicit_transpose() {
        let (a, b) = sample();
        let bt = b.transpose();

        assert_eq!(a.matmul_t(&bt), a.matmul(&b));
        assert_eq!(a.transpose().t_matmul(&b), a.matmul(&b));
    }

    #[test]
    fn add_row_and_column_sums() {
        let (mut a, _) = sample();
        a.add_row(&[1.0, 0.0, -1.0]);
        assert_eq!(a.row(0), &[2.0, 2.0, 2.0]);
        assert_eq!(a.column_sums(), vec![7.0, 7.0, 7.0]);
    }

    #[test]
    #[should_panic(expected = "incorrect sizes")]
    fn mismatched_product_panics() {
        let (a, _) = sample();
        let _ = a.matmul(&a);
    }
}
