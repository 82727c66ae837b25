//! ログ出力の初期化
//!
//! `tracing` のサブスクライバーを設定します。
//! 環境変数 `RUST_LOG` があればそちらを優先し、なければ設定ファイルのレベルを使います。

use tracing_subscriber::EnvFilter;

use crate::model::LoggingSettings;

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル（EnvFilterの書式も可: "photo_classifier=debug,warn"）
    pub level: String,
    pub ansi_colors: bool,
    /// モジュールパスを出すか
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi_colors: true,
            include_target: false,
        }
    }
}

impl LogConfig {
    /// デバッグ用の詳細なログ
    pub fn verbose() -> Self {
        Self {
            level: "debug".to_string(),
            ansi_colors: true,
            include_target: true,
        }
    }

    /// エラーのみ
    pub fn quiet() -> Self {
        Self {
            level: "error".to_string(),
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

impl From<&LoggingSettings> for LogConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            ansi_colors: settings.ansi_colors,
            include_target: false,
        }
    }
}

/// ログを初期化
///
/// 既にサブスクライバーが設定されている場合は何もしない（false を返す）。
pub fn init_logging(config: &LogConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let settings = LoggingSettings {
            level: "warn".to_string(),
            ansi_colors: false,
        };
        let config = LogConfig::from(&settings);
        assert_eq!(config.level, "warn");
        assert!(!config.ansi_colors);
    }

    #[test]
    fn test_init_twice() {
        init_logging(&LogConfig::quiet());
        // 2回目は失敗扱いになるがパニックしない
        assert!(!init_logging(&LogConfig::verbose()));
    }
}
