//! Bounding box geometry in top-left XYWH form.

use std::marker::PhantomData;

use super::{Normalized, Pixel};

/// An axis-aligned bounding box stored as top-left corner plus size.
///
/// The `TSpace` parameter is either [`Pixel`] or [`Normalized`]. Nothing
/// here rejects negative or non-finite sizes; decoders only check
/// structure, not whether a box is plausible.
#[derive(Clone, Copy, PartialEq)]
pub struct BBoxXYWH<TSpace> {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> BBoxXYWH<TSpace> {
    #[inline]
    pub fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            x,
            y,
            w,
            h,
            _space: PhantomData,
        }
    }

    /// Builds a box from its center point and size.
    #[inline]
    pub fn from_cxcywh(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self::from_xywh(cx - w * 0.5, cy - h * 0.5, w, h)
    }

    /// Returns `(cx, cy, w, h)`.
    #[inline]
    pub fn to_cxcywh(&self) -> (f64, f64, f64, f64) {
        (self.x + self.w * 0.5, self.y + self.h * 0.5, self.w, self.h)
    }
}

impl<TSpace> std::fmt::Debug for BBoxXYWH<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BBoxXYWH")
            .field("x", &self.x)
            .field("y", &self.y)
            .field("w", &self.w)
            .field("h", &self.h)
            .finish()
    }
}

impl<TSpace> Default for BBoxXYWH<TSpace> {
    fn default() -> Self {
        Self::from_xywh(0.0, 0.0, 0.0, 0.0)
    }
}

impl BBoxXYWH<Pixel> {
    /// Scales the box into `[0, 1]` image-relative units.
    pub fn to_normalized(&self, image_width: f64, image_height: f64) -> BBoxXYWH<Normalized> {
        BBoxXYWH::from_xywh(
            self.x / image_width,
            self.y / image_height,
            self.w / image_width,
            self.h / image_height,
        )
    }
}

impl BBoxXYWH<Normalized> {
    /// Scales the box back to absolute pixels.
    pub fn to_pixel(&self, image_width: f64, image_height: f64) -> BBoxXYWH<Pixel> {
        BBoxXYWH::from_xywh(
            self.x * image_width,
            self.y * image_height,
            self.w * image_width,
            self.h * image_height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_form_matches_yolo_decode_formula() {
        // abs_x = (xc - w/2) * W, abs_w = w * W
        let norm = BBoxXYWH::<Normalized>::from_cxcywh(0.5, 0.25, 0.2, 0.1);
        let px = norm.to_pixel(640.0, 480.0);
        assert!((px.x - (0.5 - 0.1) * 640.0).abs() < 1e-9);
        assert!((px.y - (0.25 - 0.05) * 480.0).abs() < 1e-9);
        assert!((px.w - 0.2 * 640.0).abs() < 1e-9);
        assert!((px.h - 0.1 * 480.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_then_scale_back_is_stable() {
        let original = BBoxXYWH::<Pixel>::from_xywh(12.5, 40.0, 100.0, 33.0);
        let (cx, cy, w, h) = original.to_normalized(320.0, 240.0).to_cxcywh();
        let restored = BBoxXYWH::<Normalized>::from_cxcywh(cx, cy, w, h).to_pixel(320.0, 240.0);

        assert!((restored.x - original.x).abs() < 1e-9);
        assert!((restored.y - original.y).abs() < 1e-9);
        assert!((restored.w - original.w).abs() < 1e-9);
        assert!((restored.h - original.h).abs() < 1e-9);
    }
}
