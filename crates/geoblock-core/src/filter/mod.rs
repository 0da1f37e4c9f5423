//! Request admission at the HTTP boundary
//!
//! The filter turns a request into candidate client addresses, runs each
//! selected address through the [`AdmissionEngine`] and either forwards the
//! request or produces a [`Denial`]:
//! - Candidate addresses come from configured headers, in order
//! - The header strategy picks which candidates are evaluated
//! - Bypass headers and ignored methods skip blocking but still resolve the country
//! - The first denied address ends evaluation

mod request;
mod response;

pub use request::{candidate_ips, strip_port, RequestView, REMOTE_ADDRESS};
pub use response::{BanPage, Denial, DEFAULT_BAN_PAGE};

use http::{HeaderName, HeaderValue, StatusCode};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::admission::{is_private, AdmissionEngine, PRIVATE_COUNTRY, UNKNOWN_COUNTRY};
use crate::config::{Config, IpHeaderStrategy};
use crate::error::{Error, Result};
use crate::geodb::{CountryLookup, GeoDatabaseManager, ManagerRegistry};

/// Why blocking was skipped for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bypass {
    /// A configured header carried its configured value
    Header,
    /// The method is listed in `ignore_verbs`
    Method,
}

/// What to do with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Pass the request downstream
    Forward {
        /// Country to expose downstream
        country: Option<String>,
        /// Set when blocking was skipped
        bypass: Option<Bypass>,
    },
    /// Reject the request
    Deny(Denial),
}

impl Decision {
    /// Whether the request is forwarded
    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward { .. })
    }
}

/// Request-level admission filter
pub struct RequestFilter {
    engine: Option<AdmissionEngine>,
    manager: Option<Arc<GeoDatabaseManager>>,
    ip_headers: Vec<String>,
    strategy: IpHeaderStrategy,
    bypass_headers: Vec<(String, String)>,
    ignore_verbs: HashSet<String>,
    country_header: Option<HeaderName>,
    log_banned_requests: bool,
    ban_on_error: bool,
    status: StatusCode,
    ban_page: BanPage,
}

impl std::fmt::Debug for RequestFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestFilter")
            .field("enabled", &self.engine.is_some())
            .field("engine", &self.engine)
            .field("ip_headers", &self.ip_headers)
            .field("strategy", &self.strategy)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl RequestFilter {
    /// Build a filter, sharing the database manager through `registry`
    pub fn new(config: &Config, registry: &ManagerRegistry) -> Result<Self> {
        config.validate()?;
        if !config.filter.enabled {
            debug!("Filter disabled, requests pass through");
            return Self::build(config, None, None);
        }

        let manager = registry.get_or_create(&config.database)?;
        let geo: Arc<dyn CountryLookup> = manager.clone();
        let engine = AdmissionEngine::from_config(&config.filter, geo);
        Self::build(config, Some(engine), Some(manager))
    }

    /// Build a filter around an existing country lookup
    pub fn with_lookup(config: &Config, geo: Arc<dyn CountryLookup>) -> Result<Self> {
        config.validate()?;
        let engine = config
            .filter
            .enabled
            .then(|| AdmissionEngine::from_config(&config.filter, geo));
        Self::build(config, engine, None)
    }

    fn build(
        config: &Config,
        engine: Option<AdmissionEngine>,
        manager: Option<Arc<GeoDatabaseManager>>,
    ) -> Result<Self> {
        let filter = &config.filter;

        let status = StatusCode::from_u16(config.response.status_code)
            .map_err(|e| Error::config_value("response.status_code", e.to_string()))?;
        let ban_page = match &config.response.ban_html_file {
            Some(path) => BanPage::load(path)?,
            None => BanPage::default(),
        };
        let country_header = filter
            .country_header()
            .map(|h| HeaderName::from_bytes(h.as_bytes()))
            .transpose()
            .map_err(|e| Error::config_value("filter.country_header", e.to_string()))?;

        Ok(Self {
            engine,
            manager,
            ip_headers: filter
                .ip_headers
                .iter()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect(),
            strategy: filter.ip_header_strategy,
            bypass_headers: filter
                .bypass_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ignore_verbs: filter
                .ignore_verbs
                .iter()
                .map(|v| v.trim().to_ascii_uppercase())
                .collect(),
            country_header,
            log_banned_requests: filter.log_banned_requests,
            ban_on_error: filter.ban_on_error,
            status,
            ban_page,
        })
    }

    /// Database manager backing this filter, if built from a registry
    pub fn database(&self) -> Option<&Arc<GeoDatabaseManager>> {
        self.manager.as_ref()
    }

    /// Admission engine, `None` when the filter is disabled
    pub fn engine(&self) -> Option<&AdmissionEngine> {
        self.engine.as_ref()
    }

    fn bypass<R: RequestView + ?Sized>(&self, req: &R) -> Option<Bypass> {
        let header_match = self
            .bypass_headers
            .iter()
            .any(|(name, expected)| req.header(name) == Some(expected.as_str()));
        if header_match {
            return Some(Bypass::Header);
        }
        if self.ignore_verbs.contains(&req.method().to_ascii_uppercase()) {
            return Some(Bypass::Method);
        }
        None
    }

    fn select<'a>(&self, ips: &'a [String]) -> &'a [String] {
        match self.strategy {
            IpHeaderStrategy::CheckAll => ips,
            IpHeaderStrategy::CheckFirst => &ips[..ips.len().min(1)],
            IpHeaderStrategy::CheckFirstNonPrivate => {
                let public = ips.iter().position(|ip| {
                    ip.parse::<IpAddr>().map_or(false, |addr| !is_private(addr))
                });
                let at = public.unwrap_or(0);
                &ips[at.min(ips.len())..(at + 1).min(ips.len())]
            }
        }
    }

    fn deny(&self, ip: &str, country: &str, phase: Option<crate::admission::Phase>) -> Decision {
        Decision::Deny(Denial {
            ip: ip.to_string(),
            country: country.to_string(),
            phase,
            status: self.status,
            body: self.ban_page.render(ip, country),
        })
    }

    /// Decide what to do with a request
    #[instrument(level = "debug", skip_all, fields(method = req.method(), path = req.path()))]
    pub fn evaluate<R: RequestView + ?Sized>(&self, req: &R) -> Decision {
        let Some(engine) = &self.engine else {
            return Decision::Forward {
                country: None,
                bypass: None,
            };
        };

        let bypass = self.bypass(req);
        if bypass.is_some() && self.country_header.is_none() {
            debug!(?bypass, "Bypassing admission checks");
            return Decision::Forward {
                country: None,
                bypass,
            };
        }

        let ips = candidate_ips(req, &self.ip_headers);
        let ip_chain = if ips.len() > 1 { ips.join(", ") } else { String::new() };
        let mut exposed: Option<String> = None;

        for ip in self.select(&ips) {
            match engine.check(ip) {
                Ok(verdict) => {
                    if let Some(country) = &verdict.country {
                        let replace = match &exposed {
                            None => true,
                            Some(current) => current == PRIVATE_COUNTRY && country != PRIVATE_COUNTRY,
                        };
                        if replace {
                            exposed = Some(country.clone());
                        }
                    }

                    if verdict.allowed || bypass.is_some() {
                        continue;
                    }

                    let country = verdict.country.as_deref().unwrap_or(UNKNOWN_COUNTRY);
                    if self.log_banned_requests {
                        info!(
                            ip = %ip,
                            ip_chain = %ip_chain,
                            country,
                            host = req.host().unwrap_or_default(),
                            method = req.method(),
                            phase = %verdict.phase,
                            path = req.path(),
                            "Blocked request"
                        );
                    }
                    return self.deny(ip, country, Some(verdict.phase));
                }
                Err(e) => {
                    error!(
                        ip = %ip,
                        ip_chain = %ip_chain,
                        host = req.host().unwrap_or_default(),
                        method = req.method(),
                        path = req.path(),
                        error = %e,
                        "Request check failed"
                    );
                    if self.ban_on_error && bypass.is_none() {
                        return self.deny(ip, UNKNOWN_COUNTRY, None);
                    }
                }
            }
        }

        Decision::Forward {
            country: exposed,
            bypass,
        }
    }

    /// Evaluate an `http::Request`, setting the country header when forwarding
    ///
    /// Returns the response to send instead when the request is denied.
    pub fn apply<B>(&self, req: &mut http::Request<B>) -> Option<http::Response<String>> {
        match self.evaluate(&*req) {
            Decision::Forward { country, .. } => {
                if let (Some(name), Some(country)) = (&self.country_header, country) {
                    if let Ok(value) = HeaderValue::from_str(&country) {
                        req.headers_mut().insert(name.clone(), value);
                    }
                }
                None
            }
            Decision::Deny(denial) => Some(denial.to_response()),
        }
    }
}
