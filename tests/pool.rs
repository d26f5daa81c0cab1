//! Pool behavior against a local mock server.

use volley::{Client, ClientConfig, Pool, PoolKey, PoolOptions, PoolOutcome};

fn mock_server_with(paths: &[(&str, usize, &str)]) -> mockito::ServerGuard {
    let mut server = mockito::Server::new();
    for (path, status, body) in paths {
        server
            .mock("GET", *path)
            .with_status(*status)
            .with_body(*body)
            .create();
    }
    server
}

#[test]
fn results_keyed_in_registration_order() {
    let server = mock_server_with(&[("/a", 200, "a"), ("/b", 200, "b"), ("/c", 200, "c")]);
    let base = server.url();

    let client = Client::new();
    let results = client
        .pool()
        .run(
            |pool| {
                pool.named("alpha").get(format!("{base}/a"));
                pool.get(format!("{base}/b"));
                pool.named("gamma").get(format!("{base}/c"));
            },
            PoolOptions::default(),
        )
        .unwrap();

    assert_eq!(results.len(), 3);
    let keys: Vec<_> = results.keys().cloned().collect();
    assert_eq!(
        keys,
        [
            PoolKey::Named("alpha".into()),
            PoolKey::Index(0),
            PoolKey::Named("gamma".into()),
        ]
    );
    let body = results.named("gamma").unwrap().response().unwrap().body();
    assert_eq!(body.as_ref(), b"c");
}

#[test]
fn http_failures_are_still_fulfilled() {
    // transport succeeded for all three; 404/500 are HTTP-level failures
    let server = mock_server_with(&[("/ok", 200, ""), ("/missing", 404, ""), ("/broken", 500, "")]);
    let base = server.url();

    let client = Client::new();
    let results = client
        .pool()
        .run(
            |pool| {
                pool.named("ok").get(format!("{base}/ok"));
                pool.named("missing").get(format!("{base}/missing"));
                pool.named("broken").get(format!("{base}/broken"));
            },
            PoolOptions::default(),
        )
        .unwrap();

    for (_, outcome) in results.iter() {
        assert!(outcome.is_fulfilled());
    }
    assert!(results.named("ok").unwrap().response().unwrap().ok());
    let missing = results.named("missing").unwrap().response().unwrap();
    assert!(missing.client_error() && missing.failed());
    let broken = results.named("broken").unwrap().response().unwrap();
    assert!(broken.server_error() && broken.failed());
}

#[test]
fn transport_failure_stays_in_its_slot() {
    let server = mock_server_with(&[("/one", 200, "one"), ("/two", 200, "two")]);
    let base = server.url();

    let client = Client::new();
    let results = client
        .pool()
        .run(
            |pool| {
                pool.named("one").get(format!("{base}/one"));
                // nothing listens on the discard port
                pool.named("dead").get("http://127.0.0.1:2/");
                pool.named("two").get(format!("{base}/two"));
            },
            PoolOptions::default(),
        )
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results.named("one").unwrap().is_fulfilled());
    assert!(results.named("two").unwrap().is_fulfilled());

    let dead = results.named("dead").unwrap();
    assert!(dead.is_rejected());
    assert_ne!(dead.error().unwrap().code, 0);
}

#[test]
fn custom_hooks_choose_the_result_type() {
    let server = mock_server_with(&[("/a", 201, ""), ("/b", 418, "")]);
    let base = server.url();

    let options = PoolOptions::with_hooks(
        |response, _key| i32::from(response.status()),
        |err, _key| -err.code,
    );

    let client = Client::new();
    let results = client
        .pool()
        .run(
            |pool| {
                pool.get(format!("{base}/a"));
                pool.get(format!("{base}/b"));
                pool.get("http://127.0.0.1:2/");
            },
            options,
        )
        .unwrap();

    assert_eq!(results.index(0), Some(&201));
    assert_eq!(results.index(1), Some(&418));
    assert!(*results.index(2).unwrap() < 0);
}

#[test]
fn unsorted_results_keep_completion_order() {
    let server = mock_server_with(&[("/a", 200, ""), ("/b", 200, "")]);
    let base = server.url();

    let client = Client::new();
    let results = client
        .pool()
        .run(
            |pool| {
                pool.named("a").get(format!("{base}/a"));
                pool.named("b").get(format!("{base}/b"));
            },
            PoolOptions::default().sort(false),
        )
        .unwrap();

    // completion order is unspecified; every key is still present
    assert_eq!(results.len(), 2);
    assert!(results.named("a").is_some());
    assert!(results.named("b").is_some());
}

#[test]
fn pool_uses_client_base_url() {
    let mut server = mockito::Server::new();
    server.mock("GET", "/v2/users").with_status(200).create();

    let config = ClientConfig::builder()
        .base_url(format!("{}/v2/", server.url()))
        .build();
    let results = Pool::new(config)
        .run(
            |pool| {
                pool.named("users").get("users");
            },
            PoolOptions::default(),
        )
        .unwrap();

    assert!(results.named("users").unwrap().response().unwrap().ok());
}

#[test]
fn pooled_post_sends_body() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/items")
        .match_body(mockito::Matcher::Json(serde_json::json!({"name": "thing"})))
        .with_status(201)
        .create();

    let client = Client::new();
    let results = client
        .pool()
        .run(
            |pool| {
                pool.named("create")
                    .json(&serde_json::json!({"name": "thing"}))
                    .post(format!("{}/items", server.url()));
            },
            PoolOptions::default(),
        )
        .unwrap();

    mock.assert();
    assert_eq!(
        results.named("create").unwrap().response().unwrap().status(),
        201
    );
}

#[test]
fn large_pool_completes_fully() {
    let mut server = mockito::Server::new();
    for i in 0..20 {
        server
            .mock("GET", format!("/item/{i}").as_str())
            .with_status(200)
            .with_body(format!("{i}"))
            .create();
    }
    let base = server.url();

    let client = Client::new();
    let results = client
        .pool()
        .run(
            |pool| {
                for i in 0..20 {
                    pool.get(format!("{base}/item/{i}"));
                }
            },
            PoolOptions::default(),
        )
        .unwrap();

    assert_eq!(results.len(), 20);
    for i in 0..20 {
        match results.index(i).unwrap() {
            PoolOutcome::Fulfilled(response) => {
                assert_eq!(response.body().as_ref(), format!("{i}").as_bytes());
            }
            PoolOutcome::Rejected(err) => panic!("request {i} rejected: {err}"),
        }
    }
}
