//! 画像とモデル入力テンソルの相互変換
//!
//! - `normalize`: 正方形画像 → [0,1] に正規化した平坦なf32列（R,G,B,R,G,B,...）
//! - `reconstruct`: 上記の逆変換（モデルに渡した入力のプレビュー用）
//! - `prepare_square`: 任意サイズの画像を中央で正方形に切り出して縮小

pub mod normalizer;
pub mod reconstructor;
pub mod square;

pub use normalizer::normalize;
pub use reconstructor::reconstruct;
pub use square::{center_crop_square, decode_image, load_image, prepare_square};

/// モデル入力の一辺のピクセル数
pub const INPUT_SIZE: u32 = 224;

/// 1ピクセルあたりのチャンネル数（RGB）
pub const NUM_CHANNELS: usize = 3;

/// モデル入力テンソル
///
/// 長さは常に `3 × side × side`。ピクセル優先・チャンネル後（R,G,B,R,G,B,...）の行優先順。
pub type InputTensor = Vec<f32>;

/// 一辺 `side` の入力テンソルの要素数
pub fn tensor_len(side: u32) -> usize {
    NUM_CHANNELS * side as usize * side as usize
}
