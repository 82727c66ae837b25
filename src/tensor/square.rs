//! 任意サイズの画像をモデル入力用の正方形に整える

use std::path::Path;

use image::{imageops, imageops::FilterType, RgbaImage};

use crate::error::{ClassifierError, Result};

/// 中央を正方形に切り出す
///
/// 一辺は `min(width, height)`、切り出し開始位置は余白を左右（上下）に等分した位置。
pub fn center_crop_square(image: &RgbaImage) -> Result<RgbaImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ClassifierError::InvalidDimensions(format!(
            "空の画像は切り出せません: {}x{}",
            width, height
        )));
    }

    let crop = width.min(height);
    let x = (width - crop) / 2;
    let y = (height - crop) / 2;

    Ok(imageops::crop_imm(image, x, y, crop, crop).to_image())
}

/// 中央切り出し後に `side × side` へ縮小（拡大）する
///
/// すでに `side × side` の画像はそのまま複製して返す。
pub fn prepare_square(image: &RgbaImage, side: u32) -> Result<RgbaImage> {
    if side == 0 {
        return Err(ClassifierError::InvalidDimensions(
            "出力サイズ0は指定できません".to_string(),
        ));
    }

    let square = center_crop_square(image)?;
    if square.width() == side {
        return Ok(square);
    }

    Ok(imageops::resize(&square, side, side, FilterType::Triangle))
}

/// 画像ファイルを読み込んでRGBAに変換
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    Ok(image::open(path)?.to_rgba8())
}

/// エンコード済み画像（PNG/JPEGなど）をデコードしてRGBAに変換
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}
