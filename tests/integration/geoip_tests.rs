//! Geolocation lookup tests against mocked upstream APIs

use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use einvoice_webui::config::GeoipConfig;
use einvoice_webui::db;
use einvoice_webui::services::GeoipService;

use crate::common::test_config;

async fn test_service(server: &MockServer, config: GeoipConfig) -> GeoipService {
    let pool = db::init_pool(&test_config().database)
        .await
        .expect("Failed to initialize test database");
    GeoipService::new(pool, config)
        .expect("Failed to build geoip service")
        .with_sources(server.uri(), server.uri())
}

fn lookup_config() -> GeoipConfig {
    GeoipConfig {
        enabled: true,
        lookup_delay_ms: 1,
        ..GeoipConfig::default()
    }
}

#[tokio::test]
async fn test_primary_source_resolves_and_caches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/203.0.113.7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "country": "中国",
            "regionName": "浙江省",
            "city": "杭州市"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = test_service(&server, lookup_config()).await;

    let result = service.resolve_batch(&["203.0.113.7".to_string()]).await;
    assert_eq!(result["203.0.113.7"], Some("中国浙江省杭州市".to_string()));

    // Second batch is served from the cache; the expect(1) above verifies
    // that no second request went out
    let result = service.resolve_batch(&["203.0.113.7".to_string()]).await;
    assert_eq!(result["203.0.113.7"], Some("中国浙江省杭州市".to_string()));
}

#[tokio::test]
async fn test_fallback_source_used_when_primary_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/203.0.113.7"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/203.0.113.7/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "country_name": "中国",
            "region": "广东省",
            "city": "深圳市"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = test_service(&server, lookup_config()).await;
    let result = service.resolve_batch(&["203.0.113.7".to_string()]).await;
    assert_eq!(result["203.0.113.7"], Some("中国广东省深圳市".to_string()));
}

#[tokio::test]
async fn test_primary_error_status_field_falls_through() {
    let server = MockServer::start().await;
    // ip-api signals failure in-band with HTTP 200
    Mock::given(method("GET"))
        .and(path("/json/203.0.113.7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "fail",
            "message": "reserved range"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/203.0.113.7/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "country_name": "中国",
            "region": "",
            "city": "上海市"
        })))
        .mount(&server)
        .await;

    let service = test_service(&server, lookup_config()).await;
    let result = service.resolve_batch(&["203.0.113.7".to_string()]).await;
    assert_eq!(result["203.0.113.7"], Some("中国上海市".to_string()));
}

#[tokio::test]
async fn test_fallback_error_body_leaves_ip_unresolved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/203.0.113.7"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/203.0.113.7/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": true,
            "reason": "RateLimited"
        })))
        .mount(&server)
        .await;

    let service = test_service(&server, lookup_config()).await;
    let result = service.resolve_batch(&["203.0.113.7".to_string()]).await;
    assert_eq!(result["203.0.113.7"], None);
}

#[tokio::test]
async fn test_batch_cap_limits_external_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/json/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "country": "中国",
            "regionName": "浙江省",
            "city": "杭州市"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let config = GeoipConfig {
        max_lookups_per_batch: 2,
        ..lookup_config()
    };
    let service = test_service(&server, config).await;

    let ips = vec![
        "203.0.113.1".to_string(),
        "203.0.113.2".to_string(),
        "203.0.113.3".to_string(),
    ];
    let result = service.resolve_batch(&ips).await;

    assert_eq!(result["203.0.113.1"], Some("中国浙江省杭州市".to_string()));
    assert_eq!(result["203.0.113.2"], Some("中国浙江省杭州市".to_string()));
    // Over-budget entries stay unresolved
    assert_eq!(result["203.0.113.3"], None);
}

#[tokio::test]
async fn test_stale_cache_entry_is_requeried_and_refreshed() {
    let server = MockServer::start().await;
    // expect(1) proves the stale entry triggered a real lookup
    Mock::given(method("GET"))
        .and(path("/json/203.0.113.7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "country": "中国",
            "regionName": "广东省",
            "city": "深圳市"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pool = db::init_pool(&test_config().database)
        .await
        .expect("Failed to initialize test database");

    // Plant an outdated entry pointing at a different location
    sqlx::query(
        "INSERT INTO ip_location_cache (ip, location, updated_at)
         VALUES (?, ?, DATETIME('now', '-60 days'))",
    )
    .bind("203.0.113.7")
    .bind("中国浙江省杭州市")
    .execute(&pool)
    .await
    .unwrap();

    let service = GeoipService::new(pool.clone(), lookup_config())
        .expect("Failed to build geoip service")
        .with_sources(server.uri(), server.uri());

    // Stale means re-query, not reuse
    let result = service.resolve_batch(&["203.0.113.7".to_string()]).await;
    assert_eq!(result["203.0.113.7"], Some("中国广东省深圳市".to_string()));

    // The cache row was refreshed with the new location
    let cached = einvoice_webui::db::IpCacheRepository::new(&pool)
        .get("203.0.113.7")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.location, "中国广东省深圳市");
    assert!(cached.updated_at > chrono::Utc::now() - chrono::Duration::days(1));
}

#[tokio::test]
async fn test_stale_cache_entry_survives_lookup_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/json/.+$"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/.+/json/$"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let pool = db::init_pool(&test_config().database)
        .await
        .expect("Failed to initialize test database");

    // Plant a cache entry well past the freshness window
    sqlx::query(
        "INSERT INTO ip_location_cache (ip, location, updated_at)
         VALUES (?, ?, DATETIME('now', '-60 days'))",
    )
    .bind("203.0.113.7")
    .bind("中国浙江省杭州市")
    .execute(&pool)
    .await
    .unwrap();

    let service = GeoipService::new(pool, lookup_config())
        .expect("Failed to build geoip service")
        .with_sources(server.uri(), server.uri());

    let result = service.resolve_batch(&["203.0.113.7".to_string()]).await;
    assert_eq!(result["203.0.113.7"], Some("中国浙江省杭州市".to_string()));
}

#[tokio::test]
async fn test_mixed_batch_only_queries_public_ips() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/203.0.113.7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "country": "中国",
            "regionName": "北京市",
            "city": "北京市"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = test_service(&server, lookup_config()).await;
    let ips = vec![
        "-".to_string(),
        "192.168.1.20".to_string(),
        "203.0.113.7".to_string(),
        "not-an-ip".to_string(),
    ];
    let result = service.resolve_batch(&ips).await;

    assert_eq!(result["-"], Some("-".to_string()));
    assert_eq!(result["192.168.1.20"], Some("本地/内网".to_string()));
    assert_eq!(result["203.0.113.7"], Some("中国北京市北京市".to_string()));
    assert_eq!(result["not-an-ip"], None);
}
