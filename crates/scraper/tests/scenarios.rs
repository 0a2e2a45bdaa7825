use std::sync::Arc;

use chrono::{Duration, Utc};
use citadel_directory::CitadelDirectory;
use esi::EsiClient;
use location_cache::LocationCache;
use market_data::RegionId;
use market_types::MarketTypeDirectory;
use scraper_core::Scraper;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REGION: u32 = 10_000_002;

fn raw_order(order_id: u64, type_id: u32, location_id: u64) -> serde_json::Value {
    json!({
        "duration": 90,
        "is_buy_order": false,
        "issued": Utc::now().to_rfc3339(),
        "location_id": location_id,
        "min_volume": 1,
        "order_id": order_id,
        "price": 5.0,
        "range": "region",
        "system_id": 30000142,
        "type_id": type_id,
        "volume_remain": 10,
        "volume_total": 10,
    })
}

async fn location_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "60003760": {
                "stationID": 60003760u64,
                "solarSystem": {"id": 30000142},
                "region": {"id": REGION},
            }
        })))
        .mount(&server)
        .await;
    server
}

async fn empty_citadels(esi: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/universe/structures/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<u64>::new()))
        .mount(esi)
        .await;
}

async fn empty_types(esi: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/universe/types/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<u32>::new()))
        .mount(esi)
        .await;
}

/// Terminates a region's order pagination loop: an empty page at `page`.
async fn empty_region_page(esi: &MockServer, page: u32) {
    Mock::given(method("GET"))
        .and(path(format!("/markets/{REGION}/orders/")))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(esi)
        .await;
}

async fn build_scraper(esi_server: &MockServer, location_server: &MockServer) -> Scraper {
    let client = Arc::new(EsiClient::with_base_url("test", "test-os", 8, &esi_server.uri()));
    empty_citadels(esi_server).await;
    empty_types(esi_server).await;

    let locations = Arc::new(LocationCache::new(location_server.uri()));
    let citadels = Arc::new(CitadelDirectory::new(client.clone(), locations.clone()).await);
    let market_types = Arc::new(MarketTypeDirectory::new(client.clone()).await);

    Scraper::new(client, locations, citadels, market_types, "market-streamer")
}

#[tokio::test]
async fn s2_happy_path_emits_two_rowsets_sorted_by_order_id() {
    let esi_server = MockServer::start().await;
    let locations = location_server().await;

    let last_modified = Utc::now() - Duration::minutes(5);
    Mock::given(method("GET"))
        .and(path(format!("/markets/{REGION}/orders/")))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![
                    raw_order(3, 34, 60003760),
                    raw_order(1, 34, 60003760),
                    raw_order(2, 35, 60003760),
                ])
                .insert_header("expires", (Utc::now() + Duration::minutes(5)).to_rfc2822())
                .insert_header("last-modified", last_modified.to_rfc2822()),
        )
        .mount(&esi_server)
        .await;
    empty_region_page(&esi_server, 2).await;

    let scraper = build_scraper(&esi_server, &locations).await;
    let region = RegionId::try_from(REGION).unwrap();
    let outcome = scraper
        .scrape_market(region, Utc::now() - Duration::hours(1))
        .await
        .expect("scrape should succeed");

    let payload = outcome.payload.expect("happy path should publish");
    let decompressed = {
        use std::io::Read;
        let mut decoder = flate2::read::ZlibDecoder::new(&payload[..]);
        let mut s = String::new();
        decoder.read_to_string(&mut s).unwrap();
        s
    };
    let doc: serde_json::Value = serde_json::from_str(&decompressed).unwrap();
    let rowsets = doc["rowsets"].as_array().unwrap();
    assert_eq!(rowsets.len(), 2);

    let type34 = rowsets.iter().find(|r| r["typeID"] == 34).unwrap();
    let order_ids: Vec<u64> = type34["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row[3].as_u64().unwrap())
        .collect();
    assert_eq!(order_ids, vec![1, 3]);
}

#[tokio::test]
async fn s4_expired_header_reschedules_shortly_instead_of_immediately() {
    let esi_server = MockServer::start().await;
    let locations = location_server().await;

    let last_modified = Utc::now() - Duration::minutes(5);
    Mock::given(method("GET"))
        .and(path(format!("/markets/{REGION}/orders/")))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![raw_order(1, 34, 60003760)])
                .insert_header("expires", (Utc::now() - Duration::seconds(60)).to_rfc2822())
                .insert_header("last-modified", last_modified.to_rfc2822()),
        )
        .mount(&esi_server)
        .await;
    empty_region_page(&esi_server, 2).await;

    let scraper = build_scraper(&esi_server, &locations).await;
    let region = RegionId::try_from(REGION).unwrap();
    let before = Utc::now();
    let outcome = scraper
        .scrape_market(region, Utc::now() - Duration::hours(1))
        .await
        .expect("scrape should succeed even with an already-expired header");

    // An already-expired `Expires` must not put the region due again
    // immediately -- it gets a short grace window (10s) plus the usual
    // reschedule margin (5s), not `now`.
    assert!(outcome.run_again >= before + Duration::seconds(14));
    assert!(outcome.run_again <= before + Duration::seconds(16));
}

#[tokio::test]
async fn s3_not_modified_suppresses_publish() {
    let esi_server = MockServer::start().await;
    let locations = location_server().await;

    let last_modified = Utc::now() - Duration::minutes(5);
    Mock::given(method("GET"))
        .and(path(format!("/markets/{REGION}/orders/")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![raw_order(1, 34, 60003760)])
                .insert_header("expires", (Utc::now() + Duration::minutes(5)).to_rfc2822())
                .insert_header("last-modified", last_modified.to_rfc2822()),
        )
        .mount(&esi_server)
        .await;

    let scraper = build_scraper(&esi_server, &locations).await;
    let region = RegionId::try_from(REGION).unwrap();

    // hint equal to the upstream's last-modified -> not modified
    let outcome = scraper.scrape_market(region, last_modified).await.unwrap();
    assert!(outcome.payload.is_none());
    assert_eq!(outcome.last_modified, last_modified);
}

#[tokio::test]
async fn s6_duplicate_order_across_pages_collapses_to_one() {
    let esi_server = MockServer::start().await;
    let locations = location_server().await;

    let last_modified = Utc::now() - Duration::minutes(5);
    Mock::given(method("GET"))
        .and(path(format!("/markets/{REGION}/orders/")))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![raw_order(42, 34, 60003760), raw_order(42, 34, 60003760)])
                .insert_header("expires", (Utc::now() + Duration::minutes(5)).to_rfc2822())
                .insert_header("last-modified", last_modified.to_rfc2822()),
        )
        .mount(&esi_server)
        .await;
    empty_region_page(&esi_server, 2).await;

    let scraper = build_scraper(&esi_server, &locations).await;
    let region = RegionId::try_from(REGION).unwrap();
    let outcome = scraper
        .scrape_market(region, Utc::now() - Duration::hours(1))
        .await
        .unwrap();

    let payload = outcome.payload.unwrap();
    use std::io::Read;
    let mut decoder = flate2::read::ZlibDecoder::new(&payload[..]);
    let mut s = String::new();
    decoder.read_to_string(&mut s).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&s).unwrap();

    let rows = doc["rowsets"][0]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn region_page_two_with_unparseable_last_modified_still_scrapes() {
    let esi_server = MockServer::start().await;
    let locations = location_server().await;

    let page1_last_modified = Utc::now() - Duration::minutes(5);
    Mock::given(method("GET"))
        .and(path(format!("/markets/{REGION}/orders/")))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![raw_order(1, 34, 60003760)])
                .insert_header("expires", (Utc::now() + Duration::minutes(5)).to_rfc2822())
                .insert_header("last-modified", page1_last_modified.to_rfc2822()),
        )
        .mount(&esi_server)
        .await;

    // Page 2 carries a second order but a garbage Last-Modified header --
    // this must not abort the scrape. Only the region's first page decides
    // scheduling; this order's generatedAt just falls back to now().
    Mock::given(method("GET"))
        .and(path(format!("/markets/{REGION}/orders/")))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![raw_order(2, 35, 60003760)])
                .insert_header("expires", (Utc::now() + Duration::minutes(5)).to_rfc2822())
                .insert_header("last-modified", "not-a-real-date"),
        )
        .mount(&esi_server)
        .await;
    empty_region_page(&esi_server, 3).await;

    let scraper = build_scraper(&esi_server, &locations).await;
    let region = RegionId::try_from(REGION).unwrap();
    let outcome = scraper
        .scrape_market(region, Utc::now() - Duration::hours(1))
        .await
        .expect("an unparseable header on a non-first page must not abort the scrape");

    let payload = outcome.payload.expect("both pages' orders should still be published");
    use std::io::Read;
    let mut decoder = flate2::read::ZlibDecoder::new(&payload[..]);
    let mut s = String::new();
    decoder.read_to_string(&mut s).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&s).unwrap();

    let rowsets = doc["rowsets"].as_array().unwrap();
    assert_eq!(rowsets.len(), 2);
    let type35 = rowsets.iter().find(|r| r["typeID"] == 35).unwrap();
    assert_eq!(type35["rows"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn s5_citadel_403_blacklists_and_keeps_region_orders() {
    const CITADEL_ID: u64 = 1_000_000_000_100;

    let esi_server = MockServer::start().await;
    let locations = MockServer::start().await;

    let last_modified = Utc::now() - Duration::minutes(5);
    Mock::given(method("GET"))
        .and(path(format!("/markets/{REGION}/orders/")))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![raw_order(1, 34, 60003760)])
                .insert_header("expires", (Utc::now() + Duration::minutes(5)).to_rfc2822())
                .insert_header("last-modified", last_modified.to_rfc2822()),
        )
        .mount(&esi_server)
        .await;
    empty_region_page(&esi_server, 2).await;

    Mock::given(method("GET"))
        .and(path("/universe/structures/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![CITADEL_ID]))
        .mount(&esi_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/universe/types/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<u32>::new()))
        .mount(&esi_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/markets/structures/{CITADEL_ID}/")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&esi_server)
        .await;

    let client = Arc::new(EsiClient::with_base_url("test", "test-os", 8, &esi_server.uri()));
    let location_cache = Arc::new(LocationCache::new(locations.uri()));
    // Both the region's own orders and the citadel itself resolve through
    // this one batched endpoint.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "60003760": {
                "stationID": 60003760u64,
                "solarSystem": {"id": 30000142},
                "region": {"id": REGION},
            },
            "1000000000100": {
                "stationID": CITADEL_ID,
                "solarSystem": {"id": 30000142},
                "region": {"id": REGION},
            },
        })))
        .mount(&locations)
        .await;
    let citadels = Arc::new(CitadelDirectory::new(client.clone(), location_cache.clone()).await);
    let market_types = Arc::new(MarketTypeDirectory::new(client.clone()).await);
    let scraper = Scraper::new(client, location_cache, citadels.clone(), market_types, "market-streamer");

    let region = RegionId::try_from(REGION).unwrap();
    let outcome = scraper
        .scrape_market(region, Utc::now() - Duration::hours(1))
        .await
        .expect("a citadel 403 should not abort the scrape");

    assert!(outcome.payload.is_some());
    assert!(citadels.get_citadels_in_region(region).is_empty());
}
