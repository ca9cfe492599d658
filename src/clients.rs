pub mod igdb;
pub mod tmdb;

pub use igdb::{IgdbClient, IgdbConfig};
pub use tmdb::{TmdbClient, TmdbConfig};

use reqwest::{Response, Url};
use serde::de::DeserializeOwned;

use crate::util::error::CollectorError;

/// ベースURLを末尾スラッシュ付きでパースする。`join` で相対パスを連結するため。
pub(crate) fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Ok(Url::parse(&normalized)?)
}

/// 成功ステータスならJSONとしてデコードし、それ以外は [`CollectorError::Status`] にする。
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: Response,
    endpoint: &str,
) -> Result<T, CollectorError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CollectorError::Status { status, body });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| CollectorError::Decode {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    })
}
