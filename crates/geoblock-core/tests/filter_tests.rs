//! End-to-end tests: configuration, registry, database and request filter

mod common;

use common::{date, world};
use geoblock_core::config::IpHeaderStrategy;
use geoblock_core::filter::Decision;
use geoblock_core::{Config, ManagerRegistry, Phase, RequestFilter};
use http::{Method, Request, StatusCode};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

fn config(db: &Path, toml: &str) -> Config {
    let mut config = Config::from_toml(toml).unwrap();
    config.database.file_path = db.to_path_buf();
    config.database.local_copy_dir = db.parent().map(Path::to_path_buf);
    config
}

fn request(headers: &[(&str, &str)]) -> Request<()> {
    let mut builder = Request::builder().uri("http://shop.example/cart");
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    builder.body(()).unwrap()
}

fn setup() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db = world(date(2024, 1, 1), "US").write(&dir.path().join("geo.BIN"));
    (dir, db)
}

#[test]
fn test_blocked_country_end_to_end() {
    let (_dir, db) = setup();
    let config = config(
        &db,
        r#"
        [filter]
        blocked_countries = ["US"]
        default_allow = true
        allow_private = false
        "#,
    );
    let registry = ManagerRegistry::new();
    let filter = RequestFilter::new(&config, &registry).unwrap();

    match filter.evaluate(&request(&[("x-forwarded-for", "8.8.8.8")])) {
        Decision::Deny(denial) => {
            assert_eq!(denial.country, "US");
            assert_eq!(denial.phase, Some(Phase::BlockedCountry));
        }
        other => panic!("expected denial, got {other:?}"),
    }
    assert!(filter
        .evaluate(&request(&[("x-forwarded-for", "85.214.132.117")]))
        .is_forward());
    assert!(!filter
        .evaluate(&request(&[("x-real-ip", "192.168.1.1")]))
        .is_forward());
}

#[test]
fn test_filters_share_one_manager() {
    let (_dir, db) = setup();
    let config = config(&db, "[filter]\nallowed_countries = [\"DE\"]\n");
    let registry = ManagerRegistry::new();

    let a = RequestFilter::new(&config, &registry).unwrap();
    let b = RequestFilter::new(&config, &registry).unwrap();

    assert!(Arc::ptr_eq(a.database().unwrap(), b.database().unwrap()));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_ip_block_rules_with_directory() {
    let (dir, db) = setup();
    let blocks = dir.path().join("blocks");
    std::fs::create_dir_all(blocks.join("nested")).unwrap();
    std::fs::write(blocks.join("nested/list.TXT"), "# networks\n85.214.132.0/24\n\n").unwrap();

    let mut config = config(
        &db,
        r#"
        [filter]
        default_allow = true
        allowed_ip_blocks = ["8.8.8.8/32"]
        blocked_ip_blocks = ["8.8.0.0/16"]
        "#,
    );
    config.filter.blocked_ip_blocks_dir = Some(blocks);
    let filter = RequestFilter::new(&config, &ManagerRegistry::new()).unwrap();

    assert!(filter.evaluate(&request(&[("x-real-ip", "8.8.8.8")])).is_forward());
    assert!(!filter.evaluate(&request(&[("x-real-ip", "8.8.8.9")])).is_forward());
    assert!(!filter
        .evaluate(&request(&[("x-real-ip", "85.214.132.117")]))
        .is_forward());
    assert!(filter.evaluate(&request(&[("x-real-ip", "85.214.1.1")])).is_forward());
}

#[test]
fn test_remote_address_and_strategy() {
    let (_dir, db) = setup();
    let mut config = config(
        &db,
        r#"
        [filter]
        blocked_countries = ["US"]
        default_allow = true
        ip_headers = ["x-forwarded-for", "remoteAddress"]
        "#,
    );

    let mut req = request(&[("x-forwarded-for", "85.214.132.117")]);
    req.extensions_mut()
        .insert("8.8.8.8:40000".parse::<SocketAddr>().unwrap());

    let filter = RequestFilter::new(&config, &ManagerRegistry::new()).unwrap();
    assert!(!filter.evaluate(&req).is_forward());

    config.filter.ip_header_strategy = IpHeaderStrategy::CheckFirst;
    let filter = RequestFilter::new(&config, &ManagerRegistry::new()).unwrap();
    assert!(filter.evaluate(&req).is_forward());
}

#[test]
fn test_country_header_and_bypass() {
    let (_dir, db) = setup();
    let config = config(
        &db,
        r#"
        [filter]
        blocked_countries = ["US"]
        default_allow = true
        ignore_verbs = ["OPTIONS"]
        country_header = "X-Country"

        [filter.bypass_headers]
        x-internal = "yes"
        "#,
    );
    let filter = RequestFilter::new(&config, &ManagerRegistry::new()).unwrap();

    let mut req = request(&[("x-forwarded-for", "85.214.132.117")]);
    assert!(filter.apply(&mut req).is_none());
    assert_eq!(req.headers()["x-country"], "DE");

    let mut req = request(&[("x-forwarded-for", "8.8.8.8"), ("x-internal", "yes")]);
    assert!(filter.apply(&mut req).is_none());
    assert_eq!(req.headers()["x-country"], "US");

    let mut req = request(&[("x-forwarded-for", "8.8.8.8")]);
    *req.method_mut() = Method::OPTIONS;
    assert!(filter.apply(&mut req).is_none());

    let mut req = request(&[("x-forwarded-for", "8.8.8.8")]);
    let response = filter.apply(&mut req).unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(req.headers().get("x-country").is_none());
}

#[test]
fn test_lookup_failure_policy() {
    let (_dir, db) = setup();
    let toml = "[filter]\ndefault_allow = true\n";

    let filter = RequestFilter::new(&config(&db, toml), &ManagerRegistry::new()).unwrap();
    match filter.evaluate(&request(&[("x-real-ip", "203.0.113.7")])) {
        Decision::Deny(denial) => assert_eq!(denial.country, "Unknown"),
        other => panic!("expected denial, got {other:?}"),
    }

    let mut lenient = config(&db, toml);
    lenient.filter.ban_on_error = false;
    let filter = RequestFilter::new(&lenient, &ManagerRegistry::new()).unwrap();
    assert!(filter
        .evaluate(&request(&[("x-real-ip", "203.0.113.7")]))
        .is_forward());
}

#[test]
fn test_ban_page_rendered_from_directory() {
    let (dir, db) = setup();
    let pages = dir.path().join("pages");
    std::fs::create_dir_all(&pages).unwrap();
    std::fs::write(
        pages.join("geoblockban.html"),
        "<h1>{{.Country}}</h1><p>{{.IP}}</p>",
    )
    .unwrap();

    let mut config = config(&db, "[filter]\nblocked_countries = [\"US\"]\n[response]\nstatus_code = 451\n");
    config.response.ban_html_file = Some(pages);
    let filter = RequestFilter::new(&config, &ManagerRegistry::new()).unwrap();

    let mut req = request(&[("x-forwarded-for", "8.8.8.8")]);
    let response = filter.apply(&mut req).unwrap();
    assert_eq!(response.status().as_u16(), 451);
    assert_eq!(response.body(), "<h1>US</h1><p>8.8.8.8</p>");
}

#[test]
fn test_disabled_filter_does_not_open_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("missing.BIN"), "[filter]\nenabled = false\n");
    let registry = ManagerRegistry::new();

    let filter = RequestFilter::new(&config, &registry).unwrap();
    assert!(filter.database().is_none());
    assert!(registry.is_empty());
    assert!(filter.evaluate(&request(&[("x-real-ip", "8.8.8.8")])).is_forward());
}

#[test]
fn test_missing_database_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("missing.BIN"), "");
    assert!(RequestFilter::new(&config, &ManagerRegistry::new()).is_err());
}
