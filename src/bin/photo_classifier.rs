//! 写真分類コアのコマンドラインツール
//!
//! 使用例:
//!   photo-classifier classify samples/cat.jpg --preview preview.png
//!   photo-classifier init-model
//!   photo-classifier inspect assets/mobilenet_v2.tar.gz
//!   photo-classifier source "https://example.com/cat.jpg"
//!   photo-classifier init-config

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use photo_classifier::logging::{init_logging, LogConfig};
use photo_classifier::model::{
    load_metadata, print_metadata_info, AppConfig, DeviceType, DEFAULT_MODEL_PATH,
};
use photo_classifier::tensor::load_image;
use photo_classifier::{ImageSource, LabelTable};

#[cfg(feature = "ml")]
use burn::tensor::backend::Backend;
#[cfg(feature = "ml")]
use photo_classifier::{
    ml::export_model, model::ModelMetadata, Classifier, CpuBackend, GpuBackend, InferenceWorker,
    ModelRunner,
};

#[derive(Parser, Debug)]
#[command(name = "photo-classifier", version, about = "端末内で写真を分類する")]
struct Cli {
    /// 詳細ログを出す
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 画像を分類する
    Classify(ClassifyArgs),
    /// モデルアーカイブのメタデータを表示する
    Inspect {
        model: PathBuf,
    },
    /// 画像URLが受け付けられるか判定する
    Source {
        url: String,
    },
    /// デフォルト設定ファイルを書き出す
    InitConfig {
        path: Option<PathBuf>,
    },
    /// 学習前（ランダム初期化）のモデルアーカイブを書き出す
    InitModel(InitModelArgs),
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// 分類する画像（複数可）
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// モデルアーカイブ（省略時は設定ファイルの値）
    #[arg(long)]
    model: Option<PathBuf>,

    /// 設定ファイル
    #[arg(long)]
    config: Option<PathBuf>,

    /// ラベルファイル（1行1ラベル、省略時は同梱のMobileNetラベル）
    #[arg(long)]
    labels: Option<PathBuf>,

    /// モデル入力を画像に戻して保存する（複数画像のときは連番を付ける）
    #[arg(long, value_name = "OUT.png")]
    preview: Option<PathBuf>,

    /// 表示する上位候補数
    #[arg(long)]
    top_k: Option<usize>,

    /// 結果をJSONで出力する
    #[arg(long)]
    json: bool,

    #[arg(long, conflicts_with = "gpu")]
    cpu: bool,

    #[arg(long)]
    gpu: bool,
}

#[derive(Args, Debug)]
struct InitModelArgs {
    /// 出力先（拡張子は .tar.gz に揃える）
    #[arg(default_value = DEFAULT_MODEL_PATH)]
    output: PathBuf,

    #[arg(long, default_value_t = 1001)]
    classes: usize,

    #[arg(long, default_value_t = 224)]
    size: u32,

    #[arg(long, default_value_t = 1.0)]
    width: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Classify(args) => {
            let config_path = args.config.clone().unwrap_or_else(AppConfig::default_path);
            let config = AppConfig::load_or_default(&config_path);
            setup_logging(cli.verbose, Some(&config));
            classify(args, config, &config_path)
        }
        Command::Inspect { model } => {
            setup_logging(cli.verbose, None);
            let metadata = load_metadata(&model)
                .with_context(|| format!("{} を読み込めません", model.display()))?;
            print_metadata_info(&metadata);
            Ok(())
        }
        Command::Source { url } => {
            setup_logging(cli.verbose, None);
            let source = ImageSource::parse(&url)?;
            println!("{}", source);
            Ok(())
        }
        Command::InitConfig { path } => {
            setup_logging(cli.verbose, None);
            let path = path.unwrap_or_else(AppConfig::default_path);
            if path.exists() {
                bail!("{} は既に存在します", path.display());
            }
            AppConfig::default().save(&path)?;
            println!("設定ファイルを書き出しました: {}", path.display());
            Ok(())
        }
        Command::InitModel(args) => {
            setup_logging(cli.verbose, None);
            init_model(args)
        }
    }
}

fn setup_logging(verbose: bool, config: Option<&AppConfig>) {
    let log_config = if verbose {
        LogConfig::verbose()
    } else {
        config
            .map(|c| LogConfig::from(&c.logging))
            .unwrap_or_default()
    };
    init_logging(&log_config);
}

fn load_labels(path: Option<&Path>) -> Result<LabelTable> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("ラベルファイル {} を読み込めません", path.display()))?;
            Ok(LabelTable::parse(&text))
        }
        None => Ok(LabelTable::mobilenet().clone()),
    }
}

/// プレビューの保存先（複数画像のときは `stem_N.png`）
fn preview_path(base: &Path, index: usize, total: usize) -> PathBuf {
    if total <= 1 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "preview".to_string());
    base.with_file_name(format!("{}_{}.png", stem, index + 1))
}

#[cfg(feature = "ml")]
fn classify(args: ClassifyArgs, mut config: AppConfig, config_path: &Path) -> Result<()> {
    if args.gpu {
        config.set_device_type(DeviceType::Wgpu);
    } else if args.cpu {
        config.set_device_type(DeviceType::Cpu);
    }
    if let Some(model) = &args.model {
        config.set_model_path(model.to_string_lossy().to_string());
    }

    match config.device_type {
        DeviceType::Cpu => classify_with::<CpuBackend>(Default::default(), &args, &config)?,
        DeviceType::Wgpu => classify_with::<GpuBackend>(Default::default(), &args, &config)?,
    }

    // 今回使った設定と画像を記録（設定ファイルがある場合のみ）
    if config_path.exists() {
        if let Some(last) = args.images.last() {
            config.update_last_image_path(last);
            if let Err(e) = config.save(config_path) {
                tracing::warn!("設定ファイルを更新できません: {}", e);
            }
        }
    }
    Ok(())
}

#[cfg(feature = "ml")]
fn classify_with<B: Backend>(device: B::Device, args: &ClassifyArgs, config: &AppConfig) -> Result<()> {
    let model_path = PathBuf::from(&config.model.model_path);
    if !model_path.exists() {
        bail!(
            "モデル {} が見つかりません（`photo-classifier init-model {}` で作成できます）",
            model_path.display(),
            model_path.display()
        );
    }
    let labels = load_labels(args.labels.as_deref())?;
    let top_k = args.top_k.unwrap_or(config.inference.top_k);
    let preview_enabled = args.preview.is_some() && config.inference.preview_enabled;
    if args.preview.is_some() && !preview_enabled {
        tracing::warn!("設定でプレビューが無効になっているため保存しません");
    }
    let configured_size = config.model.input_size;

    tracing::info!("計算デバイス: {:?}", device);
    let worker = InferenceWorker::spawn(config.inference.queue_capacity, move || {
        let runner = ModelRunner::<B>::load_file(&model_path, &device)?;
        if runner.input_size() != configured_size {
            tracing::warn!(
                "設定の入力サイズ {} とモデルの入力サイズ {} が異なります。モデルの値を使います",
                configured_size,
                runner.input_size()
            );
        }
        Ok(Classifier::new(runner, labels)?
            .with_preview(preview_enabled)
            .with_top_k(top_k))
    })?;

    let total = args.images.len();
    for (i, path) in args.images.iter().enumerate() {
        let image = load_image(path).with_context(|| format!("{} を読み込めません", path.display()))?;
        let prediction = worker.blocking_classify(image)?;

        if args.json {
            println!("{}", serde_json::to_string(&prediction)?);
        } else {
            println!("{}", path.display());
            println!("{}", prediction.summary());
            for ranked in &prediction.top_k {
                println!("  {:>4}  {:<30} {:.4}", ranked.index, ranked.label, ranked.confidence);
            }
        }

        if let (Some(base), Some(preview)) = (&args.preview, &prediction.preview) {
            let out = preview_path(base, i, total);
            preview
                .save(&out)
                .with_context(|| format!("{} に保存できません", out.display()))?;
            tracing::info!("プレビューを保存しました: {}", out.display());
        }
    }

    Ok(())
}

#[cfg(not(feature = "ml"))]
fn classify(_args: ClassifyArgs, _config: AppConfig, _config_path: &Path) -> Result<()> {
    bail!("ml 機能を有効にしてビルドしてください")
}

#[cfg(feature = "ml")]
fn init_model(args: InitModelArgs) -> Result<()> {
    let metadata = ModelMetadata::new("mobilenet_v2_untrained", args.classes, args.size, args.width);
    metadata.validate()?;

    let device = Default::default();
    let model = metadata.model_config().init::<CpuBackend>(&device);
    let path = export_model(&model, &metadata, &args.output)?;

    print_metadata_info(&metadata);
    println!("モデルを書き出しました: {}", path.display());
    Ok(())
}

#[cfg(not(feature = "ml"))]
fn init_model(_args: InitModelArgs) -> Result<()> {
    bail!("ml 機能を有効にしてビルドしてください")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_path() {
        let base = Path::new("out/preview.png");
        assert_eq!(preview_path(base, 0, 1), PathBuf::from("out/preview.png"));
        assert_eq!(preview_path(base, 1, 3), PathBuf::from("out/preview_2.png"));
    }

    #[test]
    fn test_parse_classify_args() {
        let cli = Cli::try_parse_from(["photo-classifier", "classify", "a.jpg", "b.jpg", "--top-k", "3", "--gpu"])
            .unwrap();
        match cli.command {
            Command::Classify(args) => {
                assert_eq!(args.images.len(), 2);
                assert_eq!(args.top_k, Some(3));
                assert!(args.gpu);
            }
            other => panic!("unexpected: {:?}", other),
        }

        assert!(Cli::try_parse_from(["photo-classifier", "classify", "a.jpg", "--cpu", "--gpu"]).is_err());
        assert!(Cli::try_parse_from(["photo-classifier", "classify"]).is_err());
    }

    #[test]
    fn test_init_model_default_output() {
        let cli = Cli::try_parse_from(["photo-classifier", "init-model", "--classes", "10"]).unwrap();
        match cli.command {
            Command::InitModel(args) => {
                assert_eq!(args.output, PathBuf::from(DEFAULT_MODEL_PATH));
                assert_eq!(args.classes, 10);
                assert_eq!(args.size, 224);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
