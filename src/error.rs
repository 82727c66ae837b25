//! 分類コアのエラー型

use thiserror::Error;

/// 分類処理で発生するエラー
///
/// どのエラーも呼び出し元へそのまま返す（自動リトライはしない）。
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// 画像・テンソルのサイズが前提条件を満たさない（プログラミングエラー）
    #[error("サイズが不正です: {0}")]
    InvalidDimensions(String),

    /// モデルアーティファクトの読み込み失敗（セッションにとって致命的）
    #[error("モデルの読み込みに失敗しました: {0}")]
    ModelLoad(String),

    /// 推論実行中のエラー
    #[error("推論エラー: {0}")]
    Inference(String),

    /// 空の確率ベクトルに対するラベル解決
    #[error("確率ベクトルが空です")]
    EmptyInput,

    /// HTTPSでもdata URIでもない画像ソース
    #[error("未対応の画像ソースです: {0}")]
    UnsupportedSource(String),

    /// 画像のデコード・エンコードエラー
    #[error("画像処理エラー: {0}")]
    Image(#[from] image::ImageError),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    /// 設定ファイルの読み書きエラー
    #[error("設定エラー: {0}")]
    Config(String),

    /// 推論ワーカーが停止済み
    #[error("推論ワーカーが停止しています")]
    WorkerClosed,
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
