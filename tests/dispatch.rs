use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use httptools::{BoxError, Error, RequestExt, ResponseWriter, Router, WeakContext};
use hyper::body::to_bytes;
use hyper::{Body, Method, Request, StatusCode};

async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let (res, pending) = ResponseWriter::channel();
    router.dispatch(req, res).await;

    let response = pending.await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body()).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn hello(req: Request<Body>, res: ResponseWriter) -> Result<(), Error> {
    let name = req.param("name").unwrap();
    res.send_text(StatusCode::OK, format!("Hello, {}!", name))
}

async fn wildcard(req: Request<Body>, res: ResponseWriter) -> Result<(), Error> {
    let rest = req.param("wildCard1").unwrap();
    res.send_text(StatusCode::OK, rest)
}

async fn path(req: Request<Body>, res: ResponseWriter) -> Result<(), Error> {
    let path_and_query = req.uri().path_and_query().unwrap().to_string();
    res.send_text(StatusCode::OK, path_and_query)
}

async fn first(_: Request<Body>, res: ResponseWriter) -> Result<(), Error> {
    res.send_text(StatusCode::OK, "first")
}

async fn second(_: Request<Body>, res: ResponseWriter) -> Result<(), Error> {
    res.send_text(StatusCode::OK, "second")
}

async fn failing(_: Request<Body>, _: ResponseWriter) -> Result<(), BoxError> {
    Err("boom".into())
}

async fn failing_midway(_: Request<Body>, res: ResponseWriter) -> Result<(), BoxError> {
    res.write("partial;")?;
    Err("lost the database".into())
}

fn panics_immediately(_: Request<Body>, _: ResponseWriter) -> std::future::Ready<Result<(), Error>> {
    panic!("no future for you")
}

async fn panics_later(_: Request<Body>, _: ResponseWriter) -> Result<(), Error> {
    tokio::task::yield_now().await;
    panic!("gave up")
}

async fn silent(_: Request<Body>, res: ResponseWriter) -> Result<(), Error> {
    res.set_status(StatusCode::NO_CONTENT)
}

#[tokio::test]
async fn named_parameter() {
    let router = Router::builder().get("/hello/{name}", hello).build().unwrap();

    assert_eq!(
        send(&router, Method::GET, "/hello/world").await,
        (StatusCode::OK, "Hello, world!".to_owned())
    );
    assert_eq!(
        send(&router, Method::GET, "/hello/%E4%BD%A0").await,
        (StatusCode::OK, "Hello, 你!".to_owned())
    );
    assert_eq!(
        send(&router, Method::GET, "/hello/world/extra").await,
        (StatusCode::NOT_FOUND, "Not Found".to_owned())
    );
}

#[tokio::test]
async fn wildcard_capture() {
    let router = Router::builder().get("/files/*", wildcard).build().unwrap();

    let (status, body) = send(&router, Method::GET, "/files/a/b/c").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "a/b/c");
}

#[tokio::test]
async fn registration_order_wins() {
    let router = Router::builder()
        .get("/{x}", first)
        .get("/fixed", second)
        .build()
        .unwrap();

    assert_eq!(send(&router, Method::GET, "/fixed").await.1, "first");
}

#[tokio::test]
async fn wrong_method_falls_through_to_not_found() {
    let router = Router::builder().get("/same", first).build().unwrap();

    let (status, body) = send(&router, Method::POST, "/same").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not Found");
}

#[tokio::test]
async fn wildcard_method() {
    let router = Router::builder()
        .any("/anything", first)
        .build()
        .unwrap();

    for method in &[Method::GET, Method::POST, Method::DELETE] {
        assert_eq!(send(&router, method.clone(), "/anything").await.1, "first");
    }
}

#[tokio::test]
async fn custom_not_found() {
    let router = Router::builder()
        .not_found(|_: Request<Body>, res: ResponseWriter| async move {
            res.send_text(StatusCode::GONE, "nothing here")
        })
        .build()
        .unwrap();

    assert_eq!(
        send(&router, Method::GET, "/missing").await,
        (StatusCode::GONE, "nothing here".to_owned())
    );
}

#[tokio::test]
async fn prefix_is_stripped_for_the_handler() {
    let router = Router::builder()
        .prefix("/api")
        .get("/users/{id}", path)
        .build()
        .unwrap();

    assert_eq!(
        send(&router, Method::GET, "/api/users/7?full=1").await.1,
        "/users/7?full=1"
    );
    assert_eq!(send(&router, Method::GET, "/users/7").await.1, "/users/7");
    assert_eq!(
        send(&router, Method::GET, "/apiusers/7").await.0,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn default_error_handler_answers_500() {
    let router = Router::builder().get("/", failing).build().unwrap();

    assert_eq!(
        send(&router, Method::GET, "/").await,
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_owned()
        )
    );
}

#[tokio::test]
async fn default_error_handler_after_head_was_sent() {
    let router = Router::builder().get("/", failing_midway).build().unwrap();

    let (status, body) = send(&router, Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "partial;Internal Server Error");
}

#[tokio::test]
async fn error_handler_runs_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(Mutex::new(Vec::new()));

    let router = {
        let calls = calls.clone();
        let errors = errors.clone();
        Router::builder()
            .get("/", failing)
            .error_handler(move |err, info, res| {
                calls.fetch_add(1, Ordering::SeqCst);
                errors
                    .lock()
                    .unwrap()
                    .push(format!("{} {}: {}", info.method(), info.uri(), err));

                assert!(!res.headers_sent());
                assert!(!res.finished());
                res.send_text(StatusCode::BAD_GATEWAY, "custom").unwrap();
            })
            .build()
            .unwrap()
    };

    assert_eq!(
        send(&router, Method::GET, "/").await,
        (StatusCode::BAD_GATEWAY, "custom".to_owned())
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        errors.lock().unwrap().as_slice(),
        &["GET /: handler failed: boom".to_owned()]
    );
}

#[tokio::test]
async fn panics_are_contained() {
    let calls = Arc::new(AtomicUsize::new(0));
    let panics = Arc::new(Mutex::new(Vec::new()));

    let router = {
        let calls = calls.clone();
        let panics = panics.clone();
        Router::builder()
            .get("/now", panics_immediately)
            .get("/later", panics_later)
            .error_handler(move |err, _, res| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Error::Panic(msg) = &err {
                    panics.lock().unwrap().push(msg.clone());
                }

                assert!(!res.finished());
                res.send_text(StatusCode::INTERNAL_SERVER_ERROR, "panicked").unwrap();
            })
            .build()
            .unwrap()
    };

    assert_eq!(
        send(&router, Method::GET, "/now").await,
        (StatusCode::INTERNAL_SERVER_ERROR, "panicked".to_owned())
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        send(&router, Method::GET, "/later").await,
        (StatusCode::INTERNAL_SERVER_ERROR, "panicked".to_owned())
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert_eq!(
        panics.lock().unwrap().as_slice(),
        &["no future for you".to_owned(), "gave up".to_owned()]
    );
}

#[tokio::test]
async fn panicking_error_handler_still_answers() {
    let router = Router::builder()
        .get("/", failing)
        .error_handler(|_, _, _| panic!("error handler is broken"))
        .build()
        .unwrap();

    assert_eq!(
        send(&router, Method::GET, "/").await,
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_owned()
        )
    );
}

#[tokio::test]
async fn unfinished_response_is_ended() {
    let router = Router::builder().get("/", silent).build().unwrap();

    assert_eq!(
        send(&router, Method::GET, "/").await,
        (StatusCode::NO_CONTENT, String::new())
    );
}

async fn echo_id_later(req: Request<Body>, res: ResponseWriter) -> Result<(), Error> {
    let context = req.context().unwrap();
    tokio::task::yield_now().await;

    let id = context.params().unwrap().get("id").unwrap().to_owned();
    context.insert("seen", id);
    tokio::task::yield_now().await;

    let seen: String = context.get("seen").unwrap();
    res.send_text(StatusCode::OK, seen)
}

#[tokio::test]
async fn concurrent_requests_have_separate_contexts() {
    let router = Router::builder()
        .get("/items/{id}", echo_id_later)
        .build()
        .unwrap();

    let (a, b) = tokio::join!(
        send(&router, Method::GET, "/items/a"),
        send(&router, Method::GET, "/items/b")
    );

    assert_eq!(a.1, "a");
    assert_eq!(b.1, "b");
}

#[tokio::test]
async fn context_is_released_after_dispatch() {
    let slot: Arc<Mutex<Option<WeakContext>>> = Arc::new(Mutex::new(None));

    let router = {
        let slot = slot.clone();
        Router::builder()
            .get("/{id}", move |req: Request<Body>, res: ResponseWriter| {
                let weak = req.context().map(|context| context.downgrade());
                *slot.lock().unwrap() = weak;
                async move { res.finish() }
            })
            .build()
            .unwrap()
    };

    send(&router, Method::GET, "/1").await;

    let weak = slot.lock().unwrap().take().unwrap();
    assert!(weak.upgrade().is_none());
}
