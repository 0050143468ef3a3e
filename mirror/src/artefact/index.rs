//! Remote index discovery.
//!
//! The upstream archive publishes an HTML page whose first table lists the
//! files of a full installation. The first row is a header; every following
//! row carries the download link in its second cell.

use log::debug;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

use super::download::http_agent;

/// One downloadable file belonging to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtifact {
    url: String,
    filename: String,
}

impl RemoteArtifact {
    /// Build an artifact from an absolute URL.
    ///
    /// The local filename is the text after the last `/`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::EmptyFilename`] when the URL ends in `/`.
    ///
    /// ```
    /// use caldb_mirror::artefact::index::RemoteArtifact;
    ///
    /// let artifact = RemoteArtifact::from_url("https://example.test/caldb/a.tar.gz")
    ///     .expect("artifact");
    /// assert_eq!(artifact.filename(), "a.tar.gz");
    /// ```
    pub fn from_url(url: &str) -> Result<Self, IndexError> {
        let trimmed = url.trim();
        let filename = trimmed.rsplit('/').next().unwrap_or_default();
        if filename.is_empty() {
            return Err(IndexError::EmptyFilename {
                url: trimmed.to_owned(),
            });
        }
        Ok(Self {
            url: trimmed.to_owned(),
            filename: filename.to_owned(),
        })
    }

    /// The download URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The name the file takes in the staging directory.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

/// Errors raised while discovering a release's artifacts.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The index page could not be retrieved.
    #[error("could not fetch index {url}: {reason}")]
    Fetch {
        /// Index URL.
        url: String,
        /// Description of the transport failure.
        reason: String,
    },

    /// The page contains no table.
    #[error("index page contains no table")]
    NoTable,

    /// The table has a header but no data rows.
    #[error("index table has no data rows")]
    NoRows,

    /// A data row lacks a link in its second cell.
    #[error("index row {row} has no download link in its second cell")]
    MissingLink {
        /// One-based data row number (header excluded).
        row: usize,
    },

    /// A link could not be resolved against the index URL.
    #[error("index row {row} has unusable link \"{href}\": {reason}")]
    InvalidLink {
        /// One-based data row number (header excluded).
        row: usize,
        /// The raw `href` value.
        href: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A link resolves to a URL without a filename.
    #[error("download link {url} does not name a file")]
    EmptyFilename {
        /// The offending URL.
        url: String,
    },
}

impl IndexError {
    /// Whether this error came from retrieving the page rather than parsing it.
    #[must_use]
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

/// Source of the raw index document.
#[cfg_attr(test, mockall::automock)]
pub trait IndexSource {
    /// Return the HTML body of the index at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Fetch`] when the page cannot be retrieved.
    fn fetch_index(&self, url: &str) -> Result<String, IndexError>;
}

/// Fetches the index over HTTP with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpIndexSource {
    agent: ureq::Agent,
}

impl HttpIndexSource {
    /// Create a source whose requests expire after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: http_agent(timeout),
        }
    }
}

impl IndexSource for HttpIndexSource {
    fn fetch_index(&self, url: &str) -> Result<String, IndexError> {
        let fetch_error = |reason: String| IndexError::Fetch {
            url: url.to_owned(),
            reason,
        };
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| fetch_error(e.to_string()))?;
        response
            .into_body()
            .read_to_string()
            .map_err(|e| fetch_error(e.to_string()))
    }
}

/// Fetch the index at `index_url` and parse its artifact list.
///
/// # Errors
///
/// Returns [`IndexError::Fetch`] when retrieval fails and any other
/// [`IndexError`] variant when the page does not list artifacts.
pub fn resolve_artifacts(
    source: &dyn IndexSource,
    index_url: &str,
) -> Result<Vec<RemoteArtifact>, IndexError> {
    debug!("fetching release index from {index_url}");
    let html = source.fetch_index(index_url)?;
    parse_index(&html, index_url)
}

struct Selectors {
    table: Selector,
    row: Selector,
    cell: Selector,
    anchor: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        table: css("table"),
        row: css("tr"),
        cell: css("td"),
        anchor: css("a[href]"),
    })
}

#[expect(
    clippy::expect_used,
    reason = "selectors are string literals that are known to parse"
)]
fn css(selector: &str) -> Selector {
    Selector::parse(selector).expect("static CSS selector")
}

/// Parse an index document into artifacts, in row order.
///
/// Relative links are resolved against `base_url`.
///
/// # Errors
///
/// Returns an [`IndexError`] when no table, no data rows, or an unusable
/// link is found.
///
/// ```
/// use caldb_mirror::artefact::index::parse_index;
///
/// let html = r#"<table>
///   <tr><th>Name</th><th>File</th></tr>
///   <tr><td>main</td><td><a href="files/caldb_main.tar.gz">get</a></td></tr>
/// </table>"#;
/// let artifacts = parse_index(html, "https://example.test/ciao/caldb.html")
///     .expect("parse");
/// assert_eq!(artifacts[0].url(), "https://example.test/ciao/files/caldb_main.tar.gz");
/// ```
pub fn parse_index(html: &str, base_url: &str) -> Result<Vec<RemoteArtifact>, IndexError> {
    let document = Html::parse_document(html);
    let sel = selectors();
    let table = document.select(&sel.table).next().ok_or(IndexError::NoTable)?;
    let base = Url::parse(base_url).ok();

    let artifacts = table
        .select(&sel.row)
        .skip(1)
        .enumerate()
        .map(|(index, row)| artifact_from_row(row, index + 1, base.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    if artifacts.is_empty() {
        return Err(IndexError::NoRows);
    }
    Ok(artifacts)
}

fn artifact_from_row(
    row: ElementRef<'_>,
    row_number: usize,
    base: Option<&Url>,
) -> Result<RemoteArtifact, IndexError> {
    let sel = selectors();
    let href = row
        .select(&sel.cell)
        .nth(1)
        .and_then(|cell| cell.select(&sel.anchor).next())
        .and_then(|anchor| anchor.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .ok_or(IndexError::MissingLink { row: row_number })?;

    let url = resolve_link(href, base).map_err(|reason| IndexError::InvalidLink {
        row: row_number,
        href: href.to_owned(),
        reason,
    })?;
    RemoteArtifact::from_url(&url)
}

fn resolve_link(href: &str, base: Option<&Url>) -> Result<String, String> {
    match Url::parse(href) {
        Ok(url) => Ok(url.into()),
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .ok_or_else(|| "relative link and index URL is not absolute".to_owned())
            .and_then(|b| b.join(href).map_err(|e| e.to_string()))
            .map(Into::into),
        Err(e) => Err(e.to_string()),
    }
}
