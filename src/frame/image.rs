//! Single-channel intensity planes.
//!
//! Intensities are normalized to `[0, 1]`, so the sampler's gradient
//! threshold is expressed in the same units.

/// A row-major `f32` image plane of one pyramid level.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlane {
    data: Vec<f32>,
    cols: usize,
    rows: usize,
}

impl ImagePlane {
    /// Zero-filled plane.
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            data: vec![0.0; cols * rows],
            cols,
            rows,
        }
    }

    /// Wrap row-major pixel data. Returns `None` if the length does not match.
    pub fn from_vec(cols: usize, rows: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != cols * rows {
            return None;
        }
        Some(Self { data, cols, rows })
    }

    /// Build a plane by evaluating `f(row, col)` for every pixel.
    pub fn from_fn<F>(cols: usize, rows: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f32,
    {
        let mut data = Vec::with_capacity(cols * rows);
        for row in 0..rows {
            for col in 0..cols {
                data.push(f(row, col));
            }
        }
        Self { data, cols, rows }
    }

    /// Convert 8-bit grey levels to normalized intensities.
    pub fn from_u8(cols: usize, rows: usize, pixels: &[u8]) -> Option<Self> {
        if pixels.len() != cols * rows {
            return None;
        }
        let data = pixels.iter().map(|&p| p as f32 / 255.0).collect();
        Some(Self { data, cols, rows })
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Pixel at `(row, col)`. Panics when out of bounds, like slice indexing.
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> f32 {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col]
    }

    /// Pixel at `(row, col)`, or `None` outside the plane.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    /// Squared centered-difference gradient magnitude at `(row, col)`.
    ///
    /// Returns `None` when a neighbour falls outside the plane.
    pub fn gradient_energy(&self, row: usize, col: usize) -> Option<f64> {
        if row == 0 || col == 0 || row + 1 >= self.rows || col + 1 >= self.cols {
            return None;
        }
        let dx = 0.5 * (self.at(row, col + 1) as f64 - self.at(row, col - 1) as f64);
        let dy = 0.5 * (self.at(row + 1, col) as f64 - self.at(row - 1, col) as f64);
        Some(dx * dx + dy * dy)
    }

    /// Convert back to 8-bit grey levels (clamped, rounded).
    pub fn to_u8(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|&v| (v * 255.0).clamp(0.0, 255.0).round() as u8)
            .collect()
    }
}
