//! Tile request URL construction.

use crate::pyramid::TileKey;

/// Builds the request URL of a tile from the service URL.
///
/// A service URL may contain the placeholders `{level}`, `{row}`, `{col}`,
/// `{dataset}` and `{format}`. A URL without placeholders gets the classic
/// query parameters appended: `T=<dataset>&L=<level>&X=<col>&Y=<row>`.
///
/// # Example
///
/// ```
/// use globetile::layer::UrlBuilder;
/// use globetile::pyramid::TileKey;
///
/// let plain = UrlBuilder::new("https://tiles.example.com/imagery", "bmng", "dds");
/// assert_eq!(
///     plain.url_for(&TileKey::new(2, 10, 21)),
///     "https://tiles.example.com/imagery?T=bmng&L=2&X=21&Y=10"
/// );
///
/// let templated = UrlBuilder::new(
///     "https://t.example.com/{dataset}/{level}/{row}/{col}.{format}",
///     "bmng",
///     "png",
/// );
/// assert_eq!(
///     templated.url_for(&TileKey::new(2, 10, 21)),
///     "https://t.example.com/bmng/2/10/21.png"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBuilder {
    service: String,
    dataset: String,
    format: String,
    templated: bool,
}

const PLACEHOLDERS: [&str; 5] = ["{level}", "{row}", "{col}", "{dataset}", "{format}"];

impl UrlBuilder {
    pub fn new(service: &str, dataset: &str, format_suffix: &str) -> Self {
        Self {
            service: service.trim().to_string(),
            dataset: dataset.to_string(),
            format: format_suffix.trim_start_matches('.').to_string(),
            templated: PLACEHOLDERS.iter().any(|p| service.contains(p)),
        }
    }

    /// The service URL as configured.
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn url_for(&self, key: &TileKey) -> String {
        if self.templated {
            return self
                .service
                .replace("{level}", &key.level().to_string())
                .replace("{row}", &key.row().to_string())
                .replace("{col}", &key.col().to_string())
                .replace("{dataset}", &self.dataset)
                .replace("{format}", &self.format);
        }

        let separator = match self.service.chars().last() {
            Some('?') | Some('&') => "",
            _ if self.service.contains('?') => "&",
            _ => "?",
        };
        format!(
            "{}{}T={}&L={}&X={}&Y={}",
            self.service,
            separator,
            self.dataset,
            key.level(),
            key.col(),
            key.row()
        )
    }
}
