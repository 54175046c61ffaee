// src/load_balancer/key.rs
use hyper::Request;

/// Extracts the routing key from the request query string.
///
/// The value is percent-decoded. A missing or empty parameter yields `None`.
pub fn routing_key<B>(req: &Request<B>, param: &str) -> Option<String> {
    let query = req.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == param)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
