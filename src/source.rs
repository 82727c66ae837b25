//! 画像ソースURLの判定
//!
//! 受け付けるのはHTTPSのURLと `data:<type>/<subtype>;base64,<payload>` 形式のみ。
//! それ以外は `UnsupportedSource` として明示的にエラーにする。
//! 実際のダウンロードやBase64デコードはこのクレートの外側で行う。

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{ClassifierError, Result};

/// 判定済みの画像ソース
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// HTTPSで取得する画像
    Https(Url),
    /// URIに埋め込まれた画像（ペイロードはBase64のまま保持）
    EmbeddedData {
        /// 例: "image/png"
        media_type: String,
        payload: String,
    },
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_base64(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}

/// `data:<type>/<subtype>;base64,<payload>` を分解
fn parse_data_uri(input: &str) -> Option<(String, String)> {
    let rest = input.strip_prefix("data:")?;
    let (media_type, payload) = rest.split_once(";base64,")?;
    let (main_type, sub_type) = media_type.split_once('/')?;

    if is_word(main_type) && is_word(sub_type) && is_base64(payload) {
        Some((media_type.to_string(), payload.to_string()))
    } else {
        None
    }
}

impl ImageSource {
    /// 文字列から画像ソースを判定
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        let has_https_scheme = trimmed
            .get(..8)
            .map(|scheme| scheme.eq_ignore_ascii_case("https://"))
            .unwrap_or(false);

        if has_https_scheme {
            let url = Url::parse(trimmed).map_err(|e| {
                ClassifierError::UnsupportedSource(format!("URLを解析できません ({}): {}", e, trimmed))
            })?;
            if url.scheme() == "https" && url.host().is_some() {
                return Ok(ImageSource::Https(url));
            }
        } else if let Some((media_type, payload)) = parse_data_uri(trimmed) {
            return Ok(ImageSource::EmbeddedData {
                media_type,
                payload,
            });
        }

        // ログに長いdata URIを出さない
        let preview: String = trimmed.chars().take(64).collect();
        Err(ClassifierError::UnsupportedSource(preview))
    }

    pub fn is_https(&self) -> bool {
        matches!(self, ImageSource::Https(_))
    }
}

impl FromStr for ImageSource {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Https(url) => write!(f, "HTTPS: {}", url),
            ImageSource::EmbeddedData {
                media_type,
                payload,
            } => write!(f, "埋め込みデータ: {} ({}文字)", media_type, payload.len()),
        }
    }
}
