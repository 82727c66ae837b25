//! ピクセル正規化

use image::RgbaImage;

use crate::error::{ClassifierError, Result};
use crate::tensor::{tensor_len, InputTensor};

/// 正方形画像を [0,1] の浮動小数点列に変換
///
/// 行優先でピクセルを走査し、各ピクセルのR,G,Bを255で割って順に並べる。
/// アルファは捨てる。
///
/// # 引数
/// - `image`: `side × side` の画像（切り出し・縮小は呼び出し側で済ませておく）
/// - `side`: モデル入力の一辺
///
/// # 戻り値
/// - 長さ `3 × side × side` の入力テンソル
pub fn normalize(image: &RgbaImage, side: u32) -> Result<InputTensor> {
    let (width, height) = image.dimensions();
    if width != side || height != side {
        return Err(ClassifierError::InvalidDimensions(format!(
            "画像サイズ {}x{} (期待: {}x{})",
            width, height, side, side
        )));
    }

    let mut data = Vec::with_capacity(tensor_len(side));

    // pixels() は行優先で返る
    for pixel in image.pixels() {
        data.push(pixel[0] as f32 / 255.0);
        data.push(pixel[1] as f32 / 255.0);
        data.push(pixel[2] as f32 / 255.0);
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use rand::Rng;

    fn random_image(side: u32) -> RgbaImage {
        let mut rng = rand::thread_rng();
        RgbaImage::from_fn(side, side, |_, _| {
            Rgba([rng.gen(), rng.gen(), rng.gen(), rng.gen()])
        })
    }

    #[test]
    fn test_normalize_length_and_range() {
        for side in [1, 7, 224] {
            let image = random_image(side);
            let tensor = normalize(&image, side).unwrap();
            assert_eq!(tensor.len(), 3 * (side * side) as usize);
            assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_normalize_channel_order() {
        let mut image = RgbaImage::new(2, 2);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 10]));
        image.put_pixel(1, 0, Rgba([0, 255, 0, 20]));
        image.put_pixel(0, 1, Rgba([0, 0, 255, 30]));
        image.put_pixel(1, 1, Rgba([51, 102, 204, 255]));

        let tensor = normalize(&image, 2).unwrap();
        assert_eq!(
            tensor,
            vec![
                1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, //
                0.0, 0.0, 1.0, //
                0.2, 0.4, 0.8,
            ]
        );
    }

    #[test]
    fn test_normalize_ignores_alpha() {
        let opaque = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 255]));
        let transparent = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 0]));
        assert_eq!(normalize(&opaque, 3).unwrap(), normalize(&transparent, 3).unwrap());
    }

    #[test]
    fn test_normalize_rejects_wrong_size() {
        let image = RgbaImage::new(224, 200);
        let err = normalize(&image, 224).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidDimensions(_)));

        let image = RgbaImage::new(8, 8);
        assert!(matches!(
            normalize(&image, 4),
            Err(ClassifierError::InvalidDimensions(_))
        ));
    }
}
