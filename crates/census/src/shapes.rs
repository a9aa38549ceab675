//! TIGER/Line shape aggregation: scrape the year's directory listing for
//! one geography, download every zip, decode and concatenate.
//!
//! Unlike the geocoder and ACS5 fetcher, any per-file failure aborts the
//! whole call.

use acstools_config::Settings;
use acstools_table::Table;
use scraper::{Html, Selector};
use url::Url;

use crate::client::FetchClient;
use crate::error::CensusError;
use crate::geography::GeographyLevel;
use crate::shapefile;

pub const MIN_YEAR: i64 = 2001;
pub const MAX_YEAR: i64 = 2999;

/// A validated geography code + TIGER/Line year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeRequest {
    pub level: GeographyLevel,
    pub year: u16,
}

impl ShapeRequest {
    /// `year` is accepted as text ("2020") and must be an integer in
    /// 2001..=2999. The code is matched case-insensitively.
    pub fn new(abbrev: &str, year: &str) -> Result<Self, CensusError> {
        let level = GeographyLevel::from_code(abbrev).ok_or_else(|| {
            let codes: Vec<&str> = GeographyLevel::ALL.iter().map(|l| l.code()).collect();
            CensusError::InvalidArgument(format!(
                "requested geography '{}' is not in the supported list: {}",
                abbrev,
                codes.join(" ")
            ))
        })?;

        let year = year
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y))
            .ok_or_else(|| {
                CensusError::InvalidArgument(format!(
                    "year '{}' is invalid (expected {} to {})",
                    year, MIN_YEAR, MAX_YEAR
                ))
            })?;

        Ok(Self {
            level,
            year: year as u16,
        })
    }

    /// `{tiger_base}/geo/tiger/TIGER{year}/{code}/`
    pub fn listing_url(&self, tiger_base: &str) -> String {
        format!(
            "{}/geo/tiger/TIGER{}/{}/",
            tiger_base.trim_end_matches('/'),
            self.year,
            self.level.code()
        )
    }
}

pub struct ShapeFetcher {
    client: FetchClient,
    tiger_base: String,
}

impl ShapeFetcher {
    pub fn new(settings: &Settings) -> Result<Self, CensusError> {
        let client = FetchClient::from_settings(&settings.http)?;
        Ok(Self::with_base_url(client, settings.census.tiger_base.clone()))
    }

    pub fn with_base_url(client: FetchClient, tiger_base: String) -> Self {
        Self { client, tiger_base }
    }

    /// Archive URLs linked from the request's directory listing.
    pub fn list_archives(&self, request: &ShapeRequest) -> Result<Vec<Url>, CensusError> {
        let listing = request.listing_url(&self.tiger_base);
        let unavailable = |detail: String| CensusError::ListingUnavailable {
            url: listing.clone(),
            detail,
        };

        let url = Url::parse(&listing).map_err(|e| unavailable(e.to_string()))?;
        let html = self.client.get_text(&url).map_err(|e| unavailable(e.to_string()))?;
        let archives = extract_zip_links(&html, &url);
        if archives.is_empty() {
            return Err(unavailable("listing links no .zip archives".to_string()));
        }
        Ok(archives)
    }

    /// Download and decode every archive into one table (attribute columns
    /// plus `geometry`).
    pub fn fetch(&self, request: &ShapeRequest) -> Result<Table, CensusError> {
        let archives = self.list_archives(request)?;
        tracing::info!(
            files = archives.len(),
            geography = request.level.code(),
            year = request.year,
            "downloading shape files"
        );

        let mut tables = Vec::with_capacity(archives.len());
        for (i, url) in archives.iter().enumerate() {
            tracing::info!(file = i + 1, total = archives.len(), url = %url, "shape file");
            let bytes = self.client.get_bytes(url).map_err(|e| CensusError::Download {
                url: url.to_string(),
                detail: e.to_string(),
            })?;
            let table = shapefile::read_zip(&bytes).map_err(|detail| CensusError::Shapefile {
                url: url.to_string(),
                detail,
            })?;
            tracing::debug!(url = %url, rows = table.len(), "decoded shape file");
            tables.push(table);
        }

        let combined = Table::concat(tables);
        tracing::info!(rows = combined.len(), "shape files combined");
        Ok(combined)
    }
}

/// `<a href>` targets ending in `.zip`, resolved against `base`, first
/// occurrence order, no duplicates.
pub fn extract_zip_links(html: &str, base: &Url) -> Vec<Url> {
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut links: Vec<Url> = Vec::new();
    for el in document.select(&anchors) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let path = href.split(['?', '#']).next().unwrap_or_default();
        if !path.to_ascii_lowercase().ends_with(".zip") {
            continue;
        }
        if let Ok(url) = base.join(href) {
            if !links.contains(&url) {
                links.push(url);
            }
        }
    }
    links
}
