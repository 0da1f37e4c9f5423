//! Simulate command - run a synthetic request through the filter

use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use geoblock_core::config::Config;
use geoblock_core::filter::Decision;
use geoblock_core::{ManagerRegistry, RequestFilter};
use http::{HeaderName, HeaderValue, Method, Request};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Simulate command arguments
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Connection peer address, used by the remoteAddress header
    #[arg(long, value_name = "ADDR")]
    pub remote: Option<SocketAddr>,

    /// Requested host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Request path
    #[arg(long, default_value = "/")]
    pub path: String,

    /// Country database file or directory
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,
}

/// Split a `Name: value` header argument
fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Header '{raw}' must look like 'Name: value'"))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("Invalid header name in '{raw}'"))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("Invalid header value in '{raw}'"))?;
    Ok((name, value))
}

impl SimulateArgs {
    fn build_request(&self) -> Result<Request<()>> {
        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("Invalid method '{}'", self.method))?;
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        let mut request = Request::builder()
            .method(method)
            .uri(path)
            .header(http::header::HOST, self.host.as_str())
            .body(())
            .context("Failed to build request")?;

        for raw in &self.headers {
            let (name, value) = parse_header(raw)?;
            request.headers_mut().append(name, value);
        }
        if let Some(remote) = self.remote {
            request.extensions_mut().insert(remote);
        }
        Ok(request)
    }
}

/// Execute simulate command
pub fn execute(args: SimulateArgs, mut config: Config) -> Result<()> {
    if let Some(db) = &args.db {
        config.database.file_path = db.clone();
    }
    config.database.auto_update = false;

    let request = args.build_request()?;
    let registry = ManagerRegistry::new();
    let filter = RequestFilter::new(&config, &registry).context("Failed to build filter")?;

    println!("{} {} {}", request.method(), args.host.cyan(), request.uri().path());
    for (name, value) in request.headers() {
        println!("  {}: {}", name.as_str().bright_black(), value.to_str().unwrap_or("<binary>"));
    }
    println!("{}", "─".repeat(60).bright_black());

    match filter.evaluate(&request) {
        Decision::Forward { country, bypass } => {
            println!("{}", "FORWARD".green().bold());
            if let Some(bypass) = bypass {
                println!("  Bypass: {bypass:?}");
            }
            if let Some(name) = config.filter.country_header() {
                println!("  {name}: {}", country.as_deref().unwrap_or("(not set)"));
            }
        }
        Decision::Deny(denial) => {
            println!("{} {}", "DENY".red().bold(), denial.status);
            println!("  IP: {}", denial.ip);
            println!("  Country: {}", denial.country);
            if let Some(phase) = denial.phase {
                println!("  Phase: {phase}");
            }
            if let Some(body) = &denial.body {
                println!("{}", "─".repeat(60).bright_black());
                println!("{body}");
            }
        }
    }

    registry.clear();
    Ok(())
}
