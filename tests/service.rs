use std::sync::Arc;

use httptools::{Error, RequestExt, ResponseWriter, Router};
use hyper::body::to_bytes;
use hyper::{Body, Client, Request, Server, StatusCode, Uri};
use tokio::sync::Notify;

async fn hello(req: Request<Body>, res: ResponseWriter) -> Result<(), Error> {
    let name = req.param("name").unwrap_or_default();
    res.send_text(StatusCode::OK, format!("Hello, {}!", name))
}

#[tokio::test]
async fn serves_over_http() {
    let router = Router::builder()
        .get("/hello/{name}", hello)
        .build()
        .unwrap();

    let server = Server::bind(&([127, 0, 0, 1], 0).into()).serve(router.into_service());
    let addr = server.local_addr();
    tokio::spawn(server);

    let client = Client::new();

    let uri: Uri = format!("http://{}/hello/you", addr).parse().unwrap();
    let response = client.get(uri).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        &to_bytes(response.into_body()).await.unwrap()[..],
        b"Hello, you!"
    );

    let uri: Uri = format!("http://{}/bye/you", addr).parse().unwrap();
    let response = client.get(uri).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn head_resolves_before_the_body_ends() {
    let gate = Arc::new(Notify::new());

    let router = {
        let gate = gate.clone();
        Router::builder()
            .get("/stream", move |_: Request<Body>, res: ResponseWriter| {
                let gate = gate.clone();
                async move {
                    res.write("first ")?;
                    gate.notified().await;
                    res.end("second")
                }
            })
            .build()
            .unwrap()
    };
    let router = Arc::new(router);

    let req = Request::get("/stream").body(Body::empty()).unwrap();
    let response = router.serve(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    gate.notify_one();
    let body = to_bytes(response.into_body()).await.unwrap();
    assert_eq!(&body[..], b"first second");
}
