//! RGB image → float input tensor conversion shared by both networks.

use image::RgbImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Memory layout the ONNX exports expect for their image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, 3, H, W]`, the layout produced by tflite→onnx conversions
    /// with transposed inputs.
    #[default]
    Nchw,
    /// `[1, H, W, 3]`, the TFLite-native layout.
    Nhwc,
}

impl std::str::FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nchw" => Ok(Self::Nchw),
            "nhwc" => Ok(Self::Nhwc),
            other => Err(format!("unknown tensor layout '{other}' (expected nchw or nhwc)")),
        }
    }
}

/// Convert an RGB image into a float tensor with values in [0, 1].
pub fn to_tensor(image: &RgbImage, layout: TensorLayout) -> Array4<f32> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut tensor = match layout {
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
    };

    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let value = pixel.0[c] as f32 / 255.0;
            match layout {
                TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
            }
        }
    }

    tensor
}
