//! 静的なクラスラベル表
//!
//! MobileNet (ImageNet) の1001クラス。インデックス0は `background`。

use std::sync::OnceLock;

/// 同梱モデルの出力クラス数
pub const NUM_CLASSES: usize = 1001;

/// 同梱ラベル（1行1ラベル、出力チャンネル順）
const MOBILENET_LABELS: &str = include_str!("../../assets/mobilenet_labels.txt");

static MOBILENET: OnceLock<LabelTable> = OnceLock::new();

/// 順序付きのクラスラベル表（読み取り専用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// 改行区切りテキストから作成（空行は無視）
    pub fn parse(text: &str) -> Self {
        let labels = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { labels }
    }

    /// プロセス全体で共有する同梱ラベル表
    ///
    /// 初回呼び出し時に一度だけパースする。
    pub fn mobilenet() -> &'static LabelTable {
        MOBILENET.get_or_init(|| Self::parse(MOBILENET_LABELS))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// ラベル名からインデックスを取得（最初に一致したもの）
    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}
