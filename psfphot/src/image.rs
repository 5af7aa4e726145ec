//! Read-only image grid consumed by the photometry engine.

use std::ops::Index;

/// Row-major grid of pixel intensities.
///
/// `x` addresses columns and `y` addresses rows, so `image[(x, y)]` is the
/// value in row `y`, column `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pixels: Vec<f64>,
    width: usize,
    height: usize,
}

impl Image {
    pub fn new(width: usize, height: usize, pixels: Vec<f64>) -> Self {
        assert_eq!(
            pixels.len(),
            width * height,
            "pixels length must equal width * height"
        );
        Self {
            pixels,
            width,
            height,
        }
    }

    pub fn new_filled(width: usize, height: usize, value: f64) -> Self {
        Self::new(width, height, vec![value; width * height])
    }

    /// Build an image from equally long rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        let mut pixels = Vec::with_capacity(width * height);
        for row in rows {
            assert_eq!(row.len(), width, "all rows must have the same length");
            pixels.extend_from_slice(row);
        }
        Self::new(width, height, pixels)
    }

    /// Fill an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self::new(width, height, pixels)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[f64] {
        &self.pixels
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        debug_assert!(x < self.width && y < self.height);
        self.pixels[y * self.width + x]
    }

    #[inline]
    pub(crate) fn pixels_mut(&mut self) -> &mut [f64] {
        &mut self.pixels
    }
}

impl Index<(usize, usize)> for Image {
    type Output = f64;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.pixels[y * self.width + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_column_row() {
        let image = Image::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(image.width(), 3);
        assert_eq!(image.height(), 2);
        assert_eq!(image[(2, 0)], 3.0);
        assert_eq!(image.get(0, 1), 4.0);
    }

    #[test]
    fn test_from_fn_matches_coordinates() {
        let image = Image::from_fn(5, 4, |x, y| (10 * y + x) as f64);
        assert_eq!(image[(3, 2)], 23.0);
    }

    #[test]
    #[should_panic(expected = "pixels length must equal width * height")]
    fn test_new_rejects_wrong_length() {
        let _ = Image::new(3, 3, vec![0.0; 8]);
    }
}
