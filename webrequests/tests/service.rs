//! End-to-end calls against a local axum server.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Redirect};
use axum::routing::{any, get};
use serde::{Deserialize, Serialize};
use url::Url;
use webrequests::{
    AutoMapper, AutoResponse, ByteRange, ClientError, CookieStore, JsonResponseFactory,
    JsonServiceClient, RequestDescription, RequestSettings, ResponseFields, ResponseStream,
    StatusClassifier, WebServiceErrorKind, execute,
};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Echo {
    method: String,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    message: String,
}

async fn echo(method: Method, body: Bytes) -> impl IntoResponse {
    let message = serde_json::from_slice::<Message>(&body)
        .map(|m| m.message)
        .unwrap_or_default();
    axum::Json(Echo {
        method: method.to_string(),
        message,
    })
}

async fn status(Path(code): Path<u16>) -> impl IntoResponse {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, [(header::ETAG, "\"v1\"")], "status body")
}

async fn range(headers: HeaderMap) -> String {
    headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none")
        .to_string()
}

async fn set_cookie() -> impl IntoResponse {
    ([(header::SET_COOKIE, "session=abc123; Path=/")], "set")
}

async fn read_cookie(headers: HeaderMap) -> String {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none")
        .to_string()
}

async fn gzipped() -> impl IntoResponse {
    let body = webrequests_core::gzip(b"compressed payload").unwrap();
    ([(header::CONTENT_ENCODING, "gzip")], body)
}

async fn maintenance() -> impl IntoResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONTENT_TYPE, "text/html")],
        "<h1>Down for maintenance</h1>",
    )
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/echo", any(echo))
        .route("/status/{code}", get(status))
        .route("/range", get(range))
        .route("/redirect", get(|| async { Redirect::to("/status/200") }))
        .route("/cookie/set", get(set_cookie))
        .route("/cookie/read", get(read_cookie))
        .route("/gzip", get(gzipped))
        .route("/maintenance", get(maintenance))
        .route("/slow", get(slow));
    spawn(app).await
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Two servers: the first redirects `/go/{name}` to `/deep/{name}` on the
/// second, which is addressed as `localhost` so host and path both change.
async fn serve_redirect_pair() -> (SocketAddr, String) {
    let landing = Router::new()
        .route(
            "/deep/set",
            get(|| async {
                (
                    [
                        (header::SET_COOKIE, "hop=1; Domain=localhost; Path=/"),
                        (header::CONTENT_LOCATION, "item/7"),
                    ],
                    "landed",
                )
            }),
        )
        .route(
            "/deep/missing",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        );
    let landing_addr = spawn(landing).await;
    let landing_base = format!("http://localhost:{}", landing_addr.port());

    let target = landing_base.clone();
    let entry = Router::new().route(
        "/go/{name}",
        get(move |Path(name): Path<String>| {
            let target = target.clone();
            async move { Redirect::to(&format!("{target}/deep/{name}")) }
        }),
    );
    (spawn(entry).await, landing_base)
}

fn url(addr: SocketAddr, path: &str) -> Url {
    Url::parse(&format!("http://{addr}{path}")).unwrap()
}

#[derive(Default, Debug)]
struct EchoResponse {
    ok: Option<Echo>,
    no_content: bool,
    status: Option<StatusCode>,
}

impl AutoResponse for EchoResponse {
    fn fields() -> &'static ResponseFields<Self> {
        static FIELDS: OnceLock<ResponseFields<EchoResponse>> = OnceLock::new();
        FIELDS.get_or_init(|| {
            ResponseFields::new()
                .json("OK", |r: &mut EchoResponse, v| r.ok = Some(v))
                .flag("NoContent", |r, v| r.no_content = v)
                .status_code(|r, s| r.status = Some(s))
        })
    }
}

#[derive(Default, Debug)]
struct TextResponse {
    ok: Option<String>,
    etag: Option<String>,
}

impl AutoResponse for TextResponse {
    fn fields() -> &'static ResponseFields<Self> {
        static FIELDS: OnceLock<ResponseFields<TextResponse>> = OnceLock::new();
        FIELDS.get_or_init(|| {
            ResponseFields::new()
                .text("OK", |r: &mut TextResponse, v| r.ok = Some(v))
                .header_text("ETag", |r, v| r.etag = Some(v))
        })
    }
}

#[derive(Default, Debug)]
struct LandingResponse {
    ok: Option<String>,
    content_location: Option<Url>,
}

impl AutoResponse for LandingResponse {
    fn fields() -> &'static ResponseFields<Self> {
        static FIELDS: OnceLock<ResponseFields<LandingResponse>> = OnceLock::new();
        FIELDS.get_or_init(|| {
            ResponseFields::new()
                .text("OK", |r: &mut LandingResponse, v| r.ok = Some(v))
                .header_uri("Content-Location", |r, v| r.content_location = Some(v))
        })
    }
}

#[derive(Default)]
struct StreamResponse {
    ok: Option<ResponseStream>,
}

impl AutoResponse for StreamResponse {
    fn fields() -> &'static ResponseFields<Self> {
        static FIELDS: OnceLock<ResponseFields<StreamResponse>> = OnceLock::new();
        FIELDS.get_or_init(|| {
            ResponseFields::new().stream("OK", |r: &mut StreamResponse, v| r.ok = Some(v))
        })
    }
}

#[tokio::test]
async fn post_json_is_mapped_by_status() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/echo"))
        .unwrap()
        .with_post_method()
        .with_json_content(&Message {
            message: "hello".into(),
        })
        .unwrap();

    let response = execute(request, &AutoMapper::<EchoResponse>::new())
        .await
        .unwrap();

    assert_eq!(
        response.ok,
        Some(Echo {
            method: "POST".into(),
            message: "hello".into(),
        })
    );
    assert_eq!(response.status, Some(StatusCode::OK));
    assert!(!response.no_content);
}

#[tokio::test]
async fn no_content_sets_flag() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/status/204")).unwrap();

    let response = execute(request, &AutoMapper::<EchoResponse>::new())
        .await
        .unwrap();

    assert!(response.no_content);
    assert!(response.ok.is_none());
    assert_eq!(response.status, Some(StatusCode::NO_CONTENT));
}

#[tokio::test]
async fn unhandled_status_is_a_fault_with_preview() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/status/500")).unwrap();

    let err = execute(request, &AutoMapper::<TextResponse>::new())
        .await
        .unwrap_err();

    let fault = err.as_service().expect("fault");
    assert_eq!(fault.kind(), WebServiceErrorKind::Response);
    assert_eq!(fault.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(fault.content_preview(), Some("status body"));
    assert_eq!(fault.request_method(), Some(&Method::GET));
}

#[tokio::test]
async fn text_and_headers_are_mapped() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/status/200")).unwrap();

    let response = execute(request, &AutoMapper::<TextResponse>::new())
        .await
        .unwrap();

    assert_eq!(response.ok.as_deref(), Some("status body"));
    assert_eq!(response.etag.as_deref(), Some("\"v1\""));
}

#[tokio::test]
async fn range_header_is_sent() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/range"))
        .unwrap()
        .with_range(ByteRange::new(10, 19).unwrap());

    let response = execute(request, &AutoMapper::<TextResponse>::new())
        .await
        .unwrap();

    assert_eq!(response.ok.as_deref(), Some("bytes=10-19"));
}

#[tokio::test]
async fn redirects_are_followed() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/redirect")).unwrap();

    let response = execute(request, &AutoMapper::<TextResponse>::new())
        .await
        .unwrap();

    assert_eq!(response.ok.as_deref(), Some("status body"));
}

#[tokio::test]
async fn redirect_to_another_host_uses_final_uri() {
    let (entry, landing_base) = serve_redirect_pair().await;
    let store = Arc::new(CookieStore::new());
    let settings = Arc::new(
        RequestSettings::builder()
            .cookie_store(store.clone())
            .build()
            .unwrap(),
    );

    let request = RequestDescription::new(url(entry, "/go/set"))
        .unwrap()
        .with_settings(settings.clone());
    let response = execute(request, &AutoMapper::<LandingResponse>::new())
        .await
        .unwrap();

    assert_eq!(response.ok.as_deref(), Some("landed"));
    assert_eq!(
        response.content_location.map(String::from),
        Some(format!("{landing_base}/deep/item/7"))
    );
    let landing = Url::parse(&format!("{landing_base}/")).unwrap();
    assert_eq!(store.cookie_header(&landing).as_deref(), Some("hop=1"));

    let request = RequestDescription::new(url(entry, "/go/missing"))
        .unwrap()
        .with_settings(settings);
    let err = execute(request, &AutoMapper::<LandingResponse>::new())
        .await
        .unwrap_err();
    let fault = err.as_service().expect("fault");
    assert_eq!(fault.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(
        fault.request_uri().map(Url::as_str),
        Some(format!("{landing_base}/deep/missing").as_str())
    );
}

#[tokio::test]
async fn classifier_accepts_redirect_when_disabled() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/redirect"))
        .unwrap()
        .with_redirects_disabled();

    let response = execute(request, &StatusClassifier::new()).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/status/200")
    );
}

#[tokio::test]
async fn classifier_rejects_unlisted_status() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/status/404")).unwrap();

    let err = execute(request, &StatusClassifier::new())
        .await
        .unwrap_err();

    let fault = err.as_service().expect("fault");
    assert_eq!(fault.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(fault.content_preview(), Some("status body"));
}

#[tokio::test]
async fn cookies_round_trip_through_store() {
    let addr = serve().await;
    let store = Arc::new(CookieStore::new());
    let settings = Arc::new(
        RequestSettings::builder()
            .cookie_store(store.clone())
            .build()
            .unwrap(),
    );

    let set = RequestDescription::new(url(addr, "/cookie/set"))
        .unwrap()
        .with_settings(settings.clone());
    execute(set, &AutoMapper::<TextResponse>::new())
        .await
        .unwrap();
    assert!(
        store
            .cookies()
            .iter()
            .any(|c| c.set_cookie.starts_with("session=abc123"))
    );

    let read = RequestDescription::new(url(addr, "/cookie/read"))
        .unwrap()
        .with_settings(settings);
    let response = execute(read, &AutoMapper::<TextResponse>::new())
        .await
        .unwrap();
    assert_eq!(response.ok.as_deref(), Some("session=abc123"));
}

#[tokio::test]
async fn gzip_responses_are_decoded() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/gzip")).unwrap();

    let response = execute(request, &AutoMapper::<TextResponse>::new())
        .await
        .unwrap();

    assert_eq!(response.ok.as_deref(), Some("compressed payload"));
}

#[tokio::test]
async fn stream_field_outlives_the_call() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/status/200")).unwrap();

    let response = execute(request, &AutoMapper::<StreamResponse>::new())
        .await
        .unwrap();

    let stream = response.ok.expect("stream");
    assert_eq!(&stream.bytes().await.unwrap()[..], b"status body");
}

#[tokio::test]
async fn timeout_is_a_fault() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/slow"))
        .unwrap()
        .with_timeout(Duration::from_millis(100));

    let err = execute(request, &AutoMapper::<TextResponse>::new())
        .await
        .unwrap_err();

    let fault = err.as_service().expect("fault");
    assert_eq!(fault.kind(), WebServiceErrorKind::Request);
}

#[tokio::test]
async fn cancellation_is_not_a_fault() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/slow")).unwrap();
    let token = webrequests::CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = webrequests::execute_with_cancellation(
        request,
        &AutoMapper::<TextResponse>::new(),
        token,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ClientError::Canceled));
}

#[tokio::test]
async fn json_client_gets_and_decodes() {
    let addr = serve().await;
    let client = JsonServiceClient::new(url(addr, "/"));

    let response = client.get_json::<Echo>("echo").await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.into_value(),
        Some(Echo {
            method: "GET".into(),
            message: String::new(),
        })
    );
}

#[tokio::test]
async fn non_json_error_page_is_kept() {
    let addr = serve().await;
    let request = RequestDescription::new(url(addr, "/maintenance")).unwrap();
    let classifier = StatusClassifier::new()
        .accept_any_status()
        .with_factory(JsonResponseFactory::<Echo>::new());

    let response = execute(request, &classifier).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.value().is_none());
    assert_eq!(
        response.content().map(|c| &c[..]),
        Some(&b"<h1>Down for maintenance</h1>"[..])
    );
    let detailed = response.create_error("Service unavailable.").detailed();
    assert!(detailed.ends_with("content: <h1>Down for maintenance</h1>"));
}

#[tokio::test]
async fn json_client_maps_by_status() {
    let addr = serve().await;
    let client = JsonServiceClient::new(url(addr, ""));

    let response: EchoResponse = client
        .execute(
            client
                .create_request("/echo")
                .unwrap()
                .with_put_method()
                .with_json_content(&Message {
                    message: "put".into(),
                })
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.ok.map(|e| e.method), Some("PUT".into()));
}
