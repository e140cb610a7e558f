use serde::{Deserialize, Serialize};

/// Heights (above floor) of the lowest and highest layer.
///
/// Layer 0 sits at `top`; layer `n_layers` would sit at `bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerCalibration {
    pub bottom: f64,
    pub top: f64,
}

impl LayerCalibration {
    pub fn new(bottom: f64, top: f64) -> Self {
        LayerCalibration { bottom, top }
    }

    pub fn height_from_layer(&self, layer: f64, n_layers: usize) -> f64 {
        -(layer / n_layers as f64 * (self.top - self.bottom) - self.top)
    }

    /// Inverse of [`height_from_layer`](Self::height_from_layer).
    pub fn layer_from_height(&self, height: f64, n_layers: usize) -> f64 {
        (self.top - height) / (self.top - self.bottom) * n_layers as f64
    }

    /// Layer index closest to `height`, if it lies inside `0..n_layers`.
    pub fn nearest_layer(&self, height: f64, n_layers: usize) -> Option<usize> {
        let layer = self.layer_from_height(height, n_layers).round();
        if layer.is_finite() && layer >= 0.0 && layer < n_layers as f64 {
            Some(layer as usize)
        } else {
            None
        }
    }
}
