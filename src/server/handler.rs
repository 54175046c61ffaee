// src/server/handler.rs
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tracing::Instrument;

use crate::proxy::Proxy;
use crate::server::listener::ClientAddr;

#[derive(Clone)]
pub struct RequestHandler {
    proxy: Arc<Proxy>,
}

impl RequestHandler {
    pub fn new(proxy: Arc<Proxy>) -> Self {
        Self { proxy }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let proxy = self.proxy.clone();
        let client_addr = req.extensions().get::<ClientAddr>().map(|c| c.0);
        let span = tracing::info_span!(
            "request",
            id = %uuid::Uuid::new_v4(),
            client = ?client_addr,
        );

        Box::pin(
            async move { Ok(proxy.respond(req, client_addr).await) }.instrument(span),
        )
    }
}
