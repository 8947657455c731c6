//! Scripted XML-RPC agent for client-side tests.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use fleetop::remote::xmlrpc;
use tokio::net::TcpListener;

/// `Ok(json text)`, or a `(code, message)` fault.
pub type Reply = Result<String, (i64, String)>;

/// Serve `/RPC2` on an ephemeral port. `answer` returning `None` yields HTTP 401.
pub async fn spawn_rpc_stub<F>(answer: F) -> SocketAddr
where
    F: Fn(&str) -> Option<Reply> + Send + Sync + 'static,
{
    let answer = Arc::new(answer);
    let app = Router::new().route(
        "/RPC2",
        post(move |body: String| {
            let answer = answer.clone();
            async move {
                let Ok((method, _params)) = xmlrpc::decode_call(&body) else {
                    return StatusCode::BAD_REQUEST.into_response();
                };
                let xml = match answer(&method) {
                    None => return StatusCode::UNAUTHORIZED.into_response(),
                    Some(Ok(v)) => xmlrpc::encode_response(&v),
                    Some(Err((code, msg))) => xmlrpc::encode_fault(code, &msg),
                };
                ([(header::CONTENT_TYPE, "text/xml")], xml).into_response()
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A local TCP port with nothing listening on it.
pub fn closed_port() -> u16 {
    let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}
