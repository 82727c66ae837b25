//! 確率ベクトルからラベルを決定する

use std::cmp::Ordering;

use serde::Serialize;

use crate::error::{ClassifierError, Result};
use crate::labels::LabelTable;

/// 上位候補の1件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedLabel {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
}

/// 比較用キー（NaNは最小扱い）
fn rank_key(value: f32) -> f32 {
    if value.is_nan() {
        f32::NEG_INFINITY
    } else {
        value
    }
}

/// 最大値のインデックス
///
/// 同値の場合は最も小さいインデックスを返す。空なら `None`。
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut iter = values.iter().enumerate();
    let (mut best_idx, first) = iter.next()?;
    let mut best = rank_key(*first);

    for (idx, &value) in iter {
        let value = rank_key(value);
        if value > best {
            best = value;
            best_idx = idx;
        }
    }

    Some(best_idx)
}

fn check_lengths(probabilities: &[f32], labels: &LabelTable) -> Result<()> {
    if probabilities.is_empty() {
        return Err(ClassifierError::EmptyInput);
    }
    if probabilities.len() != labels.len() {
        return Err(ClassifierError::InvalidDimensions(format!(
            "確率ベクトル長 {} とラベル数 {} が一致しません",
            probabilities.len(),
            labels.len()
        )));
    }
    Ok(())
}

/// 確率ベクトルの最大要素に対応するラベルと確率を返す
///
/// 確率は正規化し直さず、そのまま返す。
pub fn resolve(probabilities: &[f32], labels: &LabelTable) -> Result<(String, f32)> {
    check_lengths(probabilities, labels)?;

    let index = argmax(probabilities).ok_or(ClassifierError::EmptyInput)?;
    let label = labels.get(index).ok_or_else(|| {
        ClassifierError::InvalidDimensions(format!("クラスインデックス {} は範囲外です", index))
    })?;

    Ok((label.to_string(), probabilities[index]))
}

/// 確率の高い順に最大 `k` 件を返す（同値はインデックスの小さい順）
pub fn top_k(probabilities: &[f32], labels: &LabelTable, k: usize) -> Result<Vec<RankedLabel>> {
    check_lengths(probabilities, labels)?;

    let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    // 安定ソートなので同値は元の順序を保つ（argmax と同じく -0.0 と 0.0 は同値）
    indexed.sort_by(|a, b| {
        rank_key(b.1)
            .partial_cmp(&rank_key(a.1))
            .unwrap_or(Ordering::Equal)
    });

    Ok(indexed
        .into_iter()
        .take(k)
        .filter_map(|(index, confidence)| {
            labels.get(index).map(|label| RankedLabel {
                index,
                label: label.to_string(),
                confidence,
            })
        })
        .collect())
}
