//! Pixel sampling around a source position.
//!
//! Every sampler returns a fresh [`PixelSet`]: parallel coordinate and
//! intensity vectors for the integer pixels that satisfy a geometric
//! constraint. Bounding boxes are clipped to the image, so samples near an
//! edge simply contain fewer pixels.

use glam::DVec2;

use crate::image::Image;

/// Pixel coordinates and intensities in struct-of-arrays layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelSet {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl PixelSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, x: f64, y: f64, z: f64) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.z.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.x
            .iter()
            .zip(self.y.iter())
            .zip(self.z.iter())
            .map(|((&x, &y), &z)| (x, y, z))
    }

    /// Mean intensity, `None` for an empty set.
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.z.iter().sum::<f64>() / self.len() as f64)
    }

    pub fn sum(&self) -> f64 {
        self.z.iter().sum()
    }

    /// Replace each intensity with `f(x, y, z)`.
    pub fn map_values(mut self, f: impl Fn(f64, f64, f64) -> f64) -> Self {
        for ((z, &x), &y) in self.z.iter_mut().zip(self.x.iter()).zip(self.y.iter()) {
            *z = f(x, y, *z);
        }
        self
    }

    /// Drop pixels sitting more than `n_sigma * noise` below zero.
    ///
    /// Dead pixels and subtraction artifacts show up as deep negative values
    /// that no sky fluctuation explains.
    pub fn reject_low_outliers(self, noise: f64, n_sigma: f64) -> Self {
        let floor = n_sigma * noise;
        let mut kept = Self::with_capacity(self.len());
        for (x, y, z) in self.iter() {
            if z + floor > 0.0 {
                kept.push(x, y, z);
            }
        }
        kept
    }
}

/// Pixels whose distance from `center` lies within `[r_inner, r_outer]`.
pub fn annulus(image: &Image, center: DVec2, r_inner: f64, r_outer: f64) -> PixelSet {
    let mut set = PixelSet::default();
    if r_outer < 0.0 || r_outer < r_inner || image.width() == 0 || image.height() == 0 {
        return set;
    }

    let Some((x_range, y_range)) = clipped_bounds(image, center, r_outer) else {
        return set;
    };

    let r_inner2 = r_inner.max(0.0).powi(2);
    let r_outer2 = r_outer * r_outer;
    for y in y_range {
        for x in x_range.clone() {
            let d2 = (x as f64 - center.x).powi(2) + (y as f64 - center.y).powi(2);
            if d2 >= r_inner2 && d2 <= r_outer2 {
                set.push(x as f64, y as f64, image.get(x, y));
            }
        }
    }
    set
}

/// Pixels within `radius` of `center`.
#[inline]
pub fn disk(image: &Image, center: DVec2, radius: f64) -> PixelSet {
    annulus(image, center, 0.0, radius)
}

/// Square box of pixels with `floor(c - hw) <= coord <= floor(c + hw)`.
pub fn pixel_box(image: &Image, center: DVec2, half_width: f64) -> PixelSet {
    let mut set = PixelSet::default();
    if half_width < 0.0 || image.width() == 0 || image.height() == 0 {
        return set;
    }

    let x_lo = ((center.x - half_width).floor() as i64).max(0);
    let x_hi = ((center.x + half_width).floor() as i64).min(image.width() as i64 - 1);
    let y_lo = ((center.y - half_width).floor() as i64).max(0);
    let y_hi = ((center.y + half_width).floor() as i64).min(image.height() as i64 - 1);
    if x_lo > x_hi || y_lo > y_hi {
        return set;
    }

    let capacity = ((x_hi - x_lo + 1) * (y_hi - y_lo + 1)) as usize;
    set = PixelSet::with_capacity(capacity);
    for y in y_lo..=y_hi {
        for x in x_lo..=x_hi {
            set.push(x as f64, y as f64, image.get(x as usize, y as usize));
        }
    }
    set
}

/// Integer column/row ranges covering a circle of `radius`, clipped to the image.
fn clipped_bounds(
    image: &Image,
    center: DVec2,
    radius: f64,
) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let x_lo = ((center.x - radius).ceil() as i64).max(0);
    let x_hi = ((center.x + radius).floor() as i64).min(image.width() as i64 - 1);
    let y_lo = ((center.y - radius).ceil() as i64).max(0);
    let y_hi = ((center.y + radius).floor() as i64).min(image.height() as i64 - 1);
    if x_lo > x_hi || y_lo > y_hi {
        return None;
    }
    Some((
        x_lo as usize..x_hi as usize + 1,
        y_lo as usize..y_hi as usize + 1,
    ))
}
