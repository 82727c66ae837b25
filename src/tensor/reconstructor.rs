//! 入力テンソルから画像への逆変換
//!
//! モデルに実際に渡したデータを確認するためのプレビュー画像を作る。

use image::{Rgba, RgbaImage};

use crate::error::{ClassifierError, Result};
use crate::tensor::tensor_len;

/// [0,1] の値を8bitチャンネルに戻す（切り捨て後に0-255へクランプ）
fn to_channel(value: f32) -> u8 {
    // NaN は as 変換で 0 になる
    ((value * 255.0) as i32).clamp(0, 255) as u8
}

/// 入力テンソルを `side × side` の画像に戻す
///
/// `normalize` と同じR,G,B順・行優先順で読み出し、アルファは255で埋める。
/// 浮動小数点の丸めにより元画像とは各チャンネル最大1ずれることがある。
pub fn reconstruct(tensor: &[f32], side: u32) -> Result<RgbaImage> {
    let expected = tensor_len(side);
    if tensor.len() != expected {
        return Err(ClassifierError::InvalidDimensions(format!(
            "テンソル長 {} (期待: {} = 3x{}x{})",
            tensor.len(),
            expected,
            side,
            side
        )));
    }

    let mut image = RgbaImage::new(side, side);
    for (pixel, rgb) in image.pixels_mut().zip(tensor.chunks_exact(3)) {
        *pixel = Rgba([to_channel(rgb[0]), to_channel(rgb[1]), to_channel(rgb[2]), 255]);
    }

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::normalize;
    use rand::Rng;

    fn random_image(side: u32) -> RgbaImage {
        let mut rng = rand::thread_rng();
        RgbaImage::from_fn(side, side, |_, _| {
            Rgba([rng.gen(), rng.gen(), rng.gen(), rng.gen()])
        })
    }

    #[test]
    fn test_reconstruct_pixel_order() {
        let tensor = vec![
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0, //
            0.5, 0.5, 0.5,
        ];
        let image = reconstruct(&tensor, 2).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([0, 255, 0, 255]));
        assert_eq!(image.get_pixel(0, 1), &Rgba([0, 0, 255, 255]));
        assert_eq!(image.get_pixel(1, 1), &Rgba([127, 127, 127, 255]));
    }

    #[test]
    fn test_reconstruct_clamps_out_of_range() {
        let tensor = vec![-0.5, 1.5, f32::NAN];
        let image = reconstruct(&tensor, 1).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_reconstruct_rejects_wrong_length() {
        let err = reconstruct(&vec![0.0; 3 * 224 * 224 - 1], 224).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidDimensions(_)));
        assert!(matches!(
            reconstruct(&[], 1),
            Err(ClassifierError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_round_trip_within_one_unit() {
        let side = 224;
        let image = random_image(side);
        let tensor = normalize(&image, side).unwrap();
        let restored = reconstruct(&tensor, side).unwrap();

        for (a, b) in image.pixels().zip(restored.pixels()) {
            for c in 0..3 {
                assert!((a[c] as i16 - b[c] as i16).abs() <= 1);
            }
            assert_eq!(b[3], 255);
        }

        let again = normalize(&restored, side).unwrap();
        for (x, y) in tensor.iter().zip(again.iter()) {
            assert!((x - y).abs() <= 1.0 / 255.0 + 1e-6);
        }
    }
}
