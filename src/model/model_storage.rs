//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1つのアーティファクトに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（クラス数、入力サイズなど）
//! - model.bin       - モデルの重み（バイナリ）
//!
//! 読み込み側の失敗はすべて `ClassifierError::ModelLoad` として返します。

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};

use crate::error::{ClassifierError, Result};
use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

fn load_error(context: &str, err: impl std::fmt::Display) -> ClassifierError {
    ClassifierError::ModelLoad(format!("{}: {}", context, err))
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, data)?;
    Ok(())
}

/// メタデータとモデルの重みをtar.gzのバイト列にまとめる
pub fn write_model_bundle(metadata: &ModelMetadata, model_binary: &[u8]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut builder, MODEL_ENTRY, model_binary)?;

    // tarアーカイブを完成させてからgzipを閉じる
    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// 保存先パスを `.tar.gz` に揃える
fn bundle_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 戻り値は実際に書き込んだパス。
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = bundle_path(output_path);

    // 親ディレクトリが存在しない場合は作成
    if let Some(parent) = tar_gz_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let bytes = write_model_bundle(metadata, model_binary)?;
    std::fs::write(&tar_gz_path, bytes)?;
    tracing::info!("モデルを保存しました: {}", tar_gz_path.display());

    Ok(tar_gz_path)
}

/// tar.gzストリームからメタデータとモデルバイナリを読み込む
///
/// 両方のエントリが揃っていなければエラー。
pub fn read_model_bundle<R: Read>(reader: R) -> Result<(ModelMetadata, Vec<u8>)> {
    let decoder = GzDecoder::new(reader);
    let mut archive = Archive::new(decoder);

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    let entries = archive
        .entries()
        .map_err(|e| load_error("アーカイブを開けません", e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| load_error("アーカイブの読み込みエラー", e))?;
        let path = entry
            .path()
            .map_err(|e| load_error("エントリ名の読み込みエラー", e))?
            .to_string_lossy()
            .to_string();

        match path.as_str() {
            METADATA_ENTRY => {
                let mut json_str = String::new();
                entry
                    .read_to_string(&mut json_str)
                    .map_err(|e| load_error("metadata.jsonの読み込みエラー", e))?;
                metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
            }
            MODEL_ENTRY => {
                let mut buffer = Vec::new();
                entry
                    .read_to_end(&mut buffer)
                    .map_err(|e| load_error("model.binの読み込みエラー", e))?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    match (metadata_opt, model_binary_opt) {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(ClassifierError::ModelLoad(
            "metadata.json not found in tar.gz archive".to_string(),
        )),
        (_, None) => Err(ClassifierError::ModelLoad(
            "model.bin not found in tar.gz archive".to_string(),
        )),
    }
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let file = File::open(tar_gz_path)
        .map_err(|e| load_error(&format!("ファイルを開けません {:?}", tar_gz_path), e))?;
    read_model_bundle(file)
}

/// Tar.gzからモデルメタデータのみを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let file = File::open(tar_gz_path)
        .map_err(|e| load_error(&format!("ファイルを開けません {:?}", tar_gz_path), e))?;

    let mut archive = Archive::new(GzDecoder::new(file));
    let entries = archive
        .entries()
        .map_err(|e| load_error("アーカイブを開けません", e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| load_error("アーカイブの読み込みエラー", e))?;
        let is_metadata = entry
            .path()
            .map(|p| p.to_str() == Some(METADATA_ENTRY))
            .unwrap_or(false);

        if is_metadata {
            let mut json_str = String::new();
            entry
                .read_to_string(&mut json_str)
                .map_err(|e| load_error("metadata.jsonの読み込みエラー", e))?;
            return ModelMetadata::from_json_string(&json_str);
        }
    }

    Err(ClassifierError::ModelLoad(
        "metadata.json not found in tar.gz archive".to_string(),
    ))
}

/// メタデータをコンソールに表示
pub fn print_metadata_info(metadata: &ModelMetadata) {
    println!("\n=== モデルメタデータ ===");
    println!("モデル名: {}", metadata.model_name);
    println!("クラス数: {}", metadata.num_classes);
    println!("モデル入力サイズ: {}x{}", metadata.input_size, metadata.input_size);
    println!("幅係数: {}", metadata.width_multiplier);
    println!("エクスポート日時: {}", metadata.exported_at);
    println!("========================");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> ModelMetadata {
        ModelMetadata::new("test_model", 5, 16, 0.25)
    }

    #[test]
    fn test_bundle_round_trip() {
        let metadata = sample_metadata();
        let weights: Vec<u8> = (0..=255).collect();

        let bytes = write_model_bundle(&metadata, &weights).unwrap();
        let (loaded_metadata, loaded_weights) = read_model_bundle(bytes.as_slice()).unwrap();

        assert_eq!(loaded_metadata, metadata);
        assert_eq!(loaded_weights, weights);
    }

    #[test]
    fn test_missing_entry() {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);
        let json = sample_metadata().to_json_string().unwrap();
        append_entry(&mut builder, METADATA_ENTRY, json.as_bytes()).unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        let err = read_model_bundle(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ClassifierError::ModelLoad(msg) if msg.contains("model.bin")));
    }

    #[test]
    fn test_garbage_bytes() {
        let err = read_model_bundle(&b"definitely not a gzip stream"[..]).unwrap_err();
        assert!(matches!(err, ClassifierError::ModelLoad(_)));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = std::env::temp_dir().join(format!("photo_classifier_storage_{}", std::process::id()));
        let metadata = sample_metadata();

        let path = save_model_with_metadata(&dir.join("model"), &metadata, &[1, 2, 3]).unwrap();
        assert!(path.to_string_lossy().ends_with("model.tar.gz"));

        assert_eq!(load_metadata(&path).unwrap(), metadata);
        let (_, binary) = load_model_with_metadata(&path).unwrap();
        assert_eq!(binary, vec![1, 2, 3]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_metadata(Path::new("does/not/exist.tar.gz")).unwrap_err();
        assert!(matches!(err, ClassifierError::ModelLoad(_)));
    }
}
