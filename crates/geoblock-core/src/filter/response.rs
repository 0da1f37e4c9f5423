//! Denial responses

use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::admission::Phase;
use crate::error::{Error, Result};
use crate::geodb::files::search_file;

/// File name looked up when the ban page path is a directory
pub const DEFAULT_BAN_PAGE: &str = "geoblockban.html";

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const IP_PLACEHOLDERS: [&str; 2] = ["{{.IP}}", "{{ip}}"];
const COUNTRY_PLACEHOLDERS: [&str; 2] = ["{{.Country}}", "{{country}}"];

/// HTML template for denied requests
///
/// `{{.IP}}` and `{{.Country}}` are replaced on render. The lowercase
/// `{{ip}}` and `{{country}}` spellings are accepted as well.
#[derive(Debug, Clone, Default)]
pub struct BanPage {
    template: Option<String>,
}

impl BanPage {
    /// Page from template text
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
        }
    }

    /// Load a template file, searching directories for [`DEFAULT_BAN_PAGE`]
    pub fn load(path: &Path) -> Result<Self> {
        let file = search_file(path, DEFAULT_BAN_PAGE)?;
        let template = std::fs::read_to_string(&file).map_err(|e| {
            Error::Config(format!("failed to load ban page {}: {e}", file.display()))
        })?;
        debug!(path = %file.display(), "Loaded ban page");
        Ok(Self::new(template))
    }

    /// Rendered body, `None` when no template is configured
    pub fn render(&self, ip: &str, country: &str) -> Option<String> {
        self.template.as_ref().map(|t| {
            let mut body = t.clone();
            for placeholder in COUNTRY_PLACEHOLDERS {
                body = body.replace(placeholder, country);
            }
            for placeholder in IP_PLACEHOLDERS {
                body = body.replace(placeholder, ip);
            }
            body
        })
    }
}

/// A denied request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    /// Address that caused the denial
    pub ip: String,
    /// Resolved country, or a sentinel
    pub country: String,
    /// Deciding rule, `None` when evaluation failed
    pub phase: Option<Phase>,
    /// Response status
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,
    /// Rendered ban page
    pub body: Option<String>,
}

fn serialize_status<S: serde::Serializer>(
    status: &StatusCode,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u16(status.as_u16())
}

impl Denial {
    /// HTTP response for this denial
    pub fn to_response(&self) -> http::Response<String> {
        let mut response = http::Response::new(self.body.clone().unwrap_or_default());
        *response.status_mut() = self.status;
        if self.body.is_some() {
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
        }
        response
    }
}
