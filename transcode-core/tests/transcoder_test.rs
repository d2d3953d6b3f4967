use bookstore_service::{bookstore, last_call, schema};
use bytes::Bytes;
use http::{Method, Request, StatusCode};
use serde_json::{Value as JsonValue, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use transcode_core::{HandlerRegistry, MessageValue, Status, Transcoder, TranscoderOptions, Value};


async fn send<D: transcode_core::Dispatcher>(
    transcoder: &Transcoder<D>,
    method: Method,
    uri: &str,
    body: &str,
) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Bytes::from(body.to_string()))
        .unwrap();

    let response = transcoder.handle(request).await;
    assert_eq!(response.headers()[http::header::CONTENT_TYPE], "application/json");

    let status = response.status();
    let body = String::from_utf8(response.into_body().to_vec()).unwrap();
    (status, body)
}

fn parse(body: &str) -> JsonValue {
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_create_shelf_maps_body_to_the_shelf_field() {
    let (transcoder, calls) = bookstore();

    let (status, body) = send(&transcoder, Method::POST, "/v1/shelves", r#"{"theme":"Music"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!({ "theme": "Music" }));

    let (method, request) = last_call(&calls);
    assert_eq!(method, "CreateShelf");
    assert_eq!(
        transcoder.codec().encode_message(&request),
        json!({ "shelf": { "theme": "Music" } })
    );
}

#[tokio::test]
async fn test_create_book_primary_binding() {
    let (transcoder, calls) = bookstore();

    let (status, body) = send(
        &transcoder,
        Method::POST,
        "/v1/shelves/1/books",
        r#"{"author":"foo","title":"bar"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!({ "author": "foo", "title": "bar" }));

    let (method, request) = last_call(&calls);
    assert_eq!(method, "CreateBook");
    assert_eq!(
        transcoder.codec().encode_message(&request),
        json!({ "shelf": "1", "book": { "author": "foo", "title": "bar" } })
    );
}

#[tokio::test]
async fn test_create_book_additional_binding() {
    let (transcoder, calls) = bookstore();

    let (status, _) = send(&transcoder, Method::POST, "/v1/shelves/1/books/42/foo", r#""bar""#).await;
    assert_eq!(status, StatusCode::OK);

    let (method, request) = last_call(&calls);
    assert_eq!(method, "CreateBook");
    assert_eq!(request.get("shelf"), Some(&Value::Int64(1)));

    let book = request.get("book").and_then(Value::as_message).unwrap();
    assert_eq!(book.get("id"), Some(&Value::Int64(42)));
    assert_eq!(book.get("author"), Some(&Value::from("foo")));
    assert_eq!(book.get("title"), Some(&Value::from("bar")));
}

#[tokio::test]
async fn test_path_captures_take_precedence_over_the_body() {
    let (transcoder, calls) = bookstore();

    let (status, body) = send(
        &transcoder,
        Method::POST,
        "/v1/shelves/5",
        r#"{"shelf":"9","theme":"Jazz"}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!({ "id": "5", "theme": "Jazz" }));
    assert_eq!(last_call(&calls).1.get("shelf"), Some(&Value::Int64(5)));
}

#[tokio::test]
async fn test_single_and_double_wildcards() {
    let (transcoder, calls) = bookstore();

    let (status, body) = send(&transcoder, Method::POST, "/v1/shelves/1/single/anything-here", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["theme"], "Single");
    assert_eq!(last_call(&calls).0, "SingleWildcard");

    let (status, body) = send(&transcoder, Method::POST, "/v1/shelves/1/double/a/b/c", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["theme"], "Double");
    assert_eq!(last_call(&calls).0, "DoubleWildcard");

    // A single wildcard covers exactly one segment
    let (status, _) = send(&transcoder, Method::POST, "/v1/shelves/1/single/a/b", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_custom_verb_only_matches_its_own_binding() {
    let (transcoder, calls) = bookstore();

    let (status, body) = send(&transcoder, Method::POST, "/v1/shelves/5:registeredCustomVerb", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!({ "id": "5", "theme": "Custom" }));
    assert_eq!(last_call(&calls).0, "RegisteredCustomVerb");

    let (status, _) = send(&transcoder, Method::POST, "/v1/shelves/5", "{}").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(last_call(&calls).0, "UpdateShelf");

    let (status, _) = send(&transcoder, Method::POST, "/v1/shelves/5:unknownVerb", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_int64_is_rendered_as_a_string() {
    let (transcoder, _) = bookstore();

    let (status, body) = send(&transcoder, Method::GET, "/v1/shelves/9007199254740993", "").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"id":"9007199254740993","theme":"Music"}"#);
}

#[tokio::test]
async fn test_unknown_any_round_trips_byte_identically() {
    let (transcoder, _) = bookstore();
    let inputs = [
        r#"{"payload":{"@type":"type.googleapis.com/acme.Unknown","zeta":1,"alpha":[true,null,{"x":"y"}]},"note":"n"}"#,
        r#"{"payload":{"@type":"type.googleapis.com/acme.Unknown","big":123456789012345678901234567890}}"#,
        r#"{"payload":{"@type":"type.googleapis.com/acme.Unknown","price":1.50,"n":1e2,"neg":-0.0}}"#,
    ];

    for input in inputs {
        let (status, body) = send(&transcoder, Method::POST, "/v1/any", input).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, input);
    }
}

#[tokio::test]
async fn test_known_any_is_decoded_and_reencoded() {
    let (transcoder, calls) = bookstore();
    let input = r#"{"payload":{"@type":"type.googleapis.com/bookstore.Shelf","id":"7","theme":"Jazz"}}"#;

    let (status, body) = send(&transcoder, Method::POST, "/v1/any", input).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, input);

    let (_, request) = last_call(&calls);
    let Some(Value::Any(any)) = request.get("payload") else {
        panic!("Expected an Any payload");
    };
    assert!(matches!(any, transcode_core::AnyValue::Known { .. }));
}

#[tokio::test]
async fn test_non_canonical_status_keeps_its_code() {
    let (transcoder, _) = bookstore();

    let (status, body) = send(&transcoder, Method::GET, "/v1/shelves/499", "").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        parse(&body),
        json!({ "code": 499, "message": "Client Closed Request", "details": [] })
    );
}

#[tokio::test]
async fn test_canonical_status_is_mapped() {
    let (transcoder, _) = bookstore();

    let (status, body) = send(&transcoder, Method::GET, "/v1/shelves/404", "").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse(&body)["code"], 5);
    assert_eq!(parse(&body)["message"], "Shelf 404 does not exist");
}

#[tokio::test]
async fn test_no_route_is_not_found() {
    let (transcoder, calls) = bookstore();

    let (status, body) = send(&transcoder, Method::GET, "/v2/shelves", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse(&body)["code"], 5);

    let (status, _) = send(&transcoder, Method::PATCH, "/v1/shelves", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_requests_name_the_field() {
    let (transcoder, calls) = bookstore();

    let (status, body) = send(&transcoder, Method::POST, "/v1/shelves/1/books", r#"{"id":"abc"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse(&body)["code"], 3);
    assert!(parse(&body)["message"].as_str().unwrap().contains("book.id"));

    let (status, body) = send(&transcoder, Method::GET, "/v1/shelves/abc", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(parse(&body)["message"].as_str().unwrap().contains("shelf"));

    let (status, _) = send(&transcoder, Method::POST, "/v1/shelves", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_encoded_slash_only_matches_multi_segment_captures() {
    let (transcoder, calls) = bookstore();

    let (status, _) = send(&transcoder, Method::GET, "/v1/shelves/1%2F2", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&transcoder, Method::GET, "/v1/resources/a%2Fb/c%20d", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!({ "name": "a/b/c d" }));
    assert_eq!(last_call(&calls).0, "GetResource");
}

#[tokio::test]
async fn test_query_parameters_and_response_body() {
    let (transcoder, calls) = bookstore();

    let (status, body) = send(
        &transcoder,
        Method::GET,
        "/v1/shelves/3/books?page_size=5&genre=POETRY",
        "",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        parse(&body),
        json!([{ "id": "1", "title": "Leaves of Grass", "genre": "POETRY" }])
    );

    let (method, request) = last_call(&calls);
    assert_eq!(method, "ListBooks");
    assert_eq!(request.get("shelf"), Some(&Value::Int64(3)));
    assert_eq!(request.get("page_size"), Some(&Value::Int32(5)));
    assert_eq!(request.get("genre"), Some(&Value::Enum(2)));
}

#[tokio::test]
async fn test_first_registered_binding_wins() {
    let (transcoder, calls) = bookstore();

    // `GetShelf` (`/v1/shelves/{shelf}`) is declared before `GetFeaturedShelf`
    // (`/v1/shelves/featured`), so it shadows the literal route.
    let (status, _) = send(&transcoder, Method::GET, "/v1/shelves/featured", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_request_message() {
    let (transcoder, _) = bookstore();

    let (status, body) = send(&transcoder, Method::GET, "/v1/shelves", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!({ "shelves": [{ "id": "1", "theme": "Fiction" }] }));

    let (status, body) = send(&transcoder, Method::DELETE, "/v1/shelves/1", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "{}");
}

#[tokio::test]
async fn test_missing_handler_is_unimplemented() {
    let transcoder = Transcoder::new(schema(), HandlerRegistry::new()).unwrap();

    let (status, body) = send(&transcoder, Method::GET, "/v1/shelves", "").await;

    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(parse(&body)["code"], 12);
}

#[tokio::test(start_paused = true)]
async fn test_slow_calls_hit_the_deadline() {
    let handlers = HandlerRegistry::new().register("bookstore.Bookstore.ListShelves", |_| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(Status::internal("too late"))
    });
    let options = TranscoderOptions {
        timeout: Some(Duration::from_secs(1)),
        ..Default::default()
    };
    let transcoder = Transcoder::with_options(schema(), handlers, options).unwrap();

    let (status, body) = send(&transcoder, Method::GET, "/v1/shelves", "").await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(parse(&body)["code"], 4);
}

#[tokio::test]
async fn test_dropping_the_request_drops_the_call() {
    let (started_tx, started_rx) = oneshot::channel::<()>();
    let (dropped_tx, dropped_rx) = oneshot::channel::<()>();
    let signals = Arc::new(Mutex::new(Some((started_tx, dropped_tx))));

    let handlers = HandlerRegistry::new().register("bookstore.Bookstore.ListShelves", move |_| {
        let signals = signals.lock().unwrap().take();
        async move {
            // Lives as long as the handler future does
            let _guard = signals.map(|(started, dropped)| {
                let _ = started.send(());
                dropped
            });
            std::future::pending::<Result<MessageValue, Status>>().await
        }
    });
    let transcoder = Arc::new(Transcoder::new(schema(), handlers).unwrap());

    let request = Request::builder()
        .method(Method::GET)
        .uri("/v1/shelves")
        .body(Bytes::new())
        .unwrap();
    let call = tokio::spawn({
        let transcoder = transcoder.clone();
        async move { transcoder.handle(request).await }
    });

    started_rx.await.unwrap();
    call.abort();

    assert!(dropped_rx.await.is_err());
    assert!(call.await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_requests_are_independent() {
    let (transcoder, calls) = bookstore();
    let transcoder = Arc::new(transcoder);

    let tasks = (0..16).map(|i| {
        let transcoder = transcoder.clone();
        tokio::spawn(async move {
            let uri = format!("/v1/shelves/{i}");
            let (status, body) = send(&transcoder, Method::GET, &uri, "").await;
            (i, status, body)
        })
    });

    for task in tasks.collect::<Vec<_>>() {
        let (i, status, body) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse(&body)["id"], i.to_string());
    }
    assert_eq!(calls.lock().unwrap().len(), 16);
}
