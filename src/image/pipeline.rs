use std::path::Path;

use ::image::imageops::FilterType;

use crate::image::{ImageError, InputShape};
use crate::math::Tensor;

const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

/// Decodes, resizes and normalizes `bytes` into a `[1, h, w, c]` tensor with
/// values in `[0, 1]`. `origin` names the source in error messages.
pub fn preprocess_bytes(bytes: &[u8], shape: InputShape, origin: &str) -> Result<Tensor, ImageError> {
    if shape.channels != 1 && shape.channels != 3 {
        return Err(ImageError::Channels(shape.channels));
    }
    if shape.width == 0 || shape.height == 0 {
        return Err(ImageError::EmptyTarget { width: shape.width, height: shape.height });
    }
    let img = ::image::load_from_memory(bytes).map_err(|e| ImageError::Decode {
        path: origin.to_string(),
        message: e.to_string(),
    })?;
    // Fill semantics: stretch to the exact target, no crop.
    let resized = img.resize_exact(shape.width as u32, shape.height as u32, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let data: Vec<f32> = if shape.channels == 3 {
        rgb.pixels().flat_map(|p| p.0.map(|c| c as f32 / 255.0)).collect()
    } else {
        rgb.pixels()
            .map(|p| {
                let luma: f32 = p.0.iter().zip(LUMA).map(|(&c, k)| c as f32 * k).sum();
                luma / 255.0
            })
            .collect()
    };
    Tensor::new(vec![1, shape.height, shape.width, shape.channels], data).map_err(|e| ImageError::Decode {
        path: origin.to_string(),
        message: e.to_string(),
    })
}

/// Reads and preprocesses the image at `path`.
pub fn load_image_file(path: &Path, shape: InputShape) -> Result<Tensor, ImageError> {
    let bytes = std::fs::read(path).map_err(|source| ImageError::Io {
        path: path.display().to_string(),
        source,
    })?;
    preprocess_bytes(&bytes, shape, &path.display().to_string())
}

/// Preprocesses every path and stacks the results into `[N, h, w, c]`.
/// Fails on the first image that cannot be loaded.
pub fn load_batch(paths: &[&Path], shape: InputShape) -> Result<Tensor, ImageError> {
    let items = paths
        .iter()
        .map(|p| load_image_file(p, shape))
        .collect::<Result<Vec<_>, _>>()?;
    Tensor::stack(&items).map_err(|e| ImageError::Decode {
        path: format!("batch of {}", paths.len()),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn rgb_values_are_normalized() {
        let shape = InputShape { width: 4, height: 2, channels: 3 };
        let t = preprocess_bytes(&png(8, 8, [255, 0, 51]), shape, "mem").unwrap();
        assert_eq!(t.shape, vec![1, 2, 4, 3]);
        assert!((t.data[0] - 1.0).abs() < 1e-6);
        assert_eq!(t.data[1], 0.0);
        assert!((t.data[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn grayscale_uses_luma_coefficients() {
        let shape = InputShape { width: 2, height: 2, channels: 1 };
        let t = preprocess_bytes(&png(3, 3, [100, 200, 50]), shape, "mem").unwrap();
        let expected = (0.299 * 100.0 + 0.587 * 200.0 + 0.114 * 50.0) / 255.0;
        assert!(t.data.iter().all(|v| (v - expected).abs() < 1e-5));
    }

    #[test]
    fn identical_bytes_give_identical_tensors() {
        let shape = InputShape { width: 5, height: 7, channels: 3 };
        let bytes = png(13, 9, [10, 20, 30]);
        let a = preprocess_bytes(&bytes, shape, "a").unwrap();
        let b = preprocess_bytes(&bytes, shape, "b").unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn garbage_is_a_decode_error_naming_the_source() {
        let shape = InputShape { width: 2, height: 2, channels: 3 };
        match preprocess_bytes(b"not an image", shape, "scan.png") {
            Err(ImageError::Decode { path, .. }) => assert_eq!(path, "scan.png"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn batch_stacks_items() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        std::fs::write(&a, png(4, 4, [0, 0, 0])).unwrap();
        std::fs::write(&b, png(4, 4, [255, 255, 255])).unwrap();
        let shape = InputShape { width: 4, height: 4, channels: 1 };
        let t = load_batch(&[a.as_path(), b.as_path()], shape).unwrap();
        assert_eq!(t.shape, vec![2, 4, 4, 1]);
        assert!((t.item(1)[0] - 1.0).abs() < 1e-5);
    }
}
