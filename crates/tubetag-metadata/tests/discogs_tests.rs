use serde_json::json;
use std::time::{Duration, Instant};
use tubetag_domain::{Candidate, SearchQuery};
use tubetag_metadata::discogs::{DiscogsClient, DiscogsError};
use tubetag_metadata::{MetadataSource, QuotaThrottle};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_body() -> serde_json::Value {
    json!({
        "pagination": { "page": 1, "pages": 1, "items": 3 },
        "results": [
            {
                "id": 101,
                "type": "release",
                "title": "Daft Punk - One More Time",
                "year": "2000",
                "format": ["Vinyl", "12\"", "Single"],
                "genre": ["Electronic"],
                "style": ["House", "Disco"],
                "thumb": "https://img.discogs.test/101-thumb.jpg",
                "cover_image": "https://img.discogs.test/101.jpg"
            },
            {
                "id": 7,
                "type": "artist",
                "title": "Daft Punk"
            },
            {
                "id": 202,
                "type": "master",
                "title": "Daft Punk - Discovery",
                "year": "2001",
                "thumb": "https://img.discogs.test/202-thumb.jpg"
            }
        ]
    })
}

#[tokio::test]
async fn test_search_releases_maps_releases_and_masters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .and(query_param("q", "Daft Punk - One More Time"))
        .and(header("authorization", "Discogs token=test-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-discogs-ratelimit-remaining", "59")
                .set_body_json(search_body()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = DiscogsClient::new(Some("test-token".to_string()), Some(server.uri()));
    let candidates = client
        .search_releases(&SearchQuery::new("Daft Punk - One More Time"))
        .await
        .unwrap();

    assert_eq!(candidates.len(), 2);
    match &candidates[0] {
        Candidate::Release(release) => {
            assert_eq!(release.id, Some(101));
            assert_eq!(release.title, "Daft Punk - One More Time");
            assert_eq!(release.year, Some(2000));
            assert!(release.format_tags.contains("Single"));
            assert_eq!(release.genres, vec!["Electronic".to_string()]);
            assert_eq!(release.styles, vec!["House".to_string(), "Disco".to_string()]);
            assert_eq!(
                release.cover_art_url.as_deref(),
                Some("https://img.discogs.test/101.jpg")
            );
        }
        other => panic!("expected release, got: {other:?}"),
    }
    match &candidates[1] {
        Candidate::Album(album) => {
            assert_eq!(album.master_id, Some(202));
            assert!(album.format_tags.contains("Album"));
            assert_eq!(
                album.cover_art_url.as_deref(),
                Some("https://img.discogs.test/202-thumb.jpg")
            );
        }
        other => panic!("expected album, got: {other:?}"),
    }
    assert_eq!(client.throttle().remaining().await, Some(59));
}

#[tokio::test]
async fn test_forced_fields_are_sent_as_search_params() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .and(query_param("q", "Daft Punk - One More Time"))
        .and(query_param("artist", "Daft Punk"))
        .and(query_param("title", "One More Time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = DiscogsClient::new(None, Some(server.uri()));
    let query = SearchQuery::forced(Some("Daft Punk"), Some("One More Time"));
    let candidates = client.search_releases(&query).await.unwrap();

    assert_eq!(candidates.len(), 2);
}

#[tokio::test]
async fn test_search_releases_caches_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = DiscogsClient::new(None, Some(server.uri()));
    let query = SearchQuery::new("Daft Punk - One More Time");

    let first = client.search_releases(&query).await.unwrap();
    let second = client.search_releases(&query).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_search_releases_handles_http_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let client = DiscogsClient::new(None, Some(server.uri()));
    let result = client.search_releases(&SearchQuery::new("anything")).await;

    match result.unwrap_err() {
        DiscogsError::HttpStatus { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert!(body.contains("upstream down"));
        }
        other => panic!("expected HttpStatus error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_search_releases_handles_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "You must authenticate to access this resource."
        })))
        .mount(&server)
        .await;

    let client = DiscogsClient::new(None, Some(server.uri()));
    let result = client.search_releases(&SearchQuery::new("anything")).await;

    match result.unwrap_err() {
        DiscogsError::Api { message } => assert!(message.contains("authenticate")),
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_metadata_source_swallows_errors_and_empty_results() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .and(query_param("q", "broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .and(query_param("q", "nothing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&server)
        .await;

    let client = DiscogsClient::new(None, Some(server.uri()));

    assert!(client.search(&SearchQuery::new("broken")).await.is_none());
    assert!(client.search(&SearchQuery::new("nothing")).await.is_none());
}

#[tokio::test]
async fn test_low_quota_delays_next_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-discogs-ratelimit-remaining", "1")
                .set_body_json(search_body()),
        )
        .expect(2)
        .mount(&server)
        .await;

    let cooldown = Duration::from_millis(300);
    let client = DiscogsClient::new_with_quota(
        None,
        QuotaThrottle::new(2, cooldown),
        Duration::from_secs(5),
        Some(server.uri()),
    );

    client
        .search_releases(&SearchQuery::new("first"))
        .await
        .unwrap();
    let start = Instant::now();
    client
        .search_releases(&SearchQuery::new("second"))
        .await
        .unwrap();

    assert!(
        start.elapsed() >= cooldown,
        "second request was not delayed: {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_healthy_quota_does_not_delay() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-discogs-ratelimit-remaining", "40")
                .set_body_json(search_body()),
        )
        .mount(&server)
        .await;

    let client = DiscogsClient::new_with_quota(
        None,
        QuotaThrottle::new(2, Duration::from_secs(30)),
        Duration::from_secs(5),
        Some(server.uri()),
    );

    let start = Instant::now();
    client.search_releases(&SearchQuery::new("first")).await.unwrap();
    client.search_releases(&SearchQuery::new("second")).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
}
