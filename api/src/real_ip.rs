// Borrow a lot of code from crates.io
// https://github.com/rust-lang/crates.io/blob/986d296f910c2ed821be907b1e32a120c03338cb/src/real_ip.rs

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, request::Parts},
};
use ipnetwork::IpNetwork;
use sha2::{Digest, Sha256};
use std::net::{IpAddr, SocketAddr};

use crate::{App, error::AppError};

/// One-way digest of the submitting address, the only form that is ever
/// persisted. Hex-encoded SHA-256 of the canonical address string.
pub fn ip_hash(ip: &IpAddr) -> String {
    Sha256::digest(ip.to_string().as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn is_trusted_proxy(trusted: &[IpNetwork], ip: &IpAddr) -> bool {
    trusted.iter().any(|network| network.contains(*ip))
}

/// Picks the originating client address out of the X-Forwarded-For chain, or
/// `None` when the headers carry nothing usable and the caller should fall
/// back to the socket address.
pub fn pick_client_ip(headers: &HeaderMap, trusted: &[IpNetwork]) -> Option<IpAddr> {
    let mut forwarded_ips = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(','))
        .filter_map(|ip| ip.trim().parse::<IpAddr>().ok())
        .filter(|ip| match ip {
            IpAddr::V4(ip) => !ip.is_private() && !ip.is_loopback(),
            IpAddr::V6(_) => true,
        });

    // The originating client is the left-most non-private address in the
    // X-Forwarded-For header.
    let client_ip = forwarded_ips.next();

    // The right-most address is the hop appended by our reverse proxy; it
    // must belong to a configured trusted proxy range for the left-most
    // value to be believable.
    let supposedly_proxy_ip = forwarded_ips.next_back();

    match (client_ip, supposedly_proxy_ip) {
        (Some(client_ip), Some(proxy_ip)) if is_trusted_proxy(trusted, &proxy_ip) => {
            Some(client_ip)
        }
        // No allow-list configured (single-proxy or dev deployments).
        (Some(client_ip), _) if trusted.is_empty() => Some(client_ip),
        (Some(client_ip), proxy_ip) => {
            tracing::warn!(
                ?client_ip,
                ?proxy_ip,
                "Request from outside the trusted proxy ranges, using the untrusted client IP"
            );
            Some(client_ip)
        }
        (None, _) => None,
    }
}

pub struct ClientIp(pub IpAddr);

impl axum::extract::FromRequestParts<App> for ClientIp {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
        if let Some(client_ip) = pick_client_ip(&parts.headers, &state.config.trusted_proxies) {
            return Ok(ClientIp(client_ip));
        }

        let socket_ip: IpAddr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .ok_or("couldn't get connecting socket IP")?
            .0
            .ip();

        tracing::warn!(
            ?socket_ip,
            "No client IP found in X-Forwarded-For headers, using socket IP"
        );
        Ok(ClientIp(socket_ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(forwarded: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for value in forwarded {
            headers.append("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn leftmost_public_address_wins() {
        let trusted: Vec<IpNetwork> = vec!["198.51.100.0/24".parse().unwrap()];
        let picked = pick_client_ip(
            &headers(&["203.0.113.7, 10.0.0.1, 198.51.100.20"]),
            &trusted,
        );
        assert_eq!(picked, Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn private_prefixes_are_skipped() {
        let picked = pick_client_ip(&headers(&["192.168.1.4, 203.0.113.7"]), &[]);
        assert_eq!(picked, Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn untrusted_chain_still_yields_leftmost() {
        let trusted: Vec<IpNetwork> = vec!["198.51.100.0/24".parse().unwrap()];
        let picked = pick_client_ip(&headers(&["203.0.113.7, 192.0.2.1"]), &trusted);
        assert_eq!(picked, Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn empty_headers_fall_through() {
        assert_eq!(pick_client_ip(&HeaderMap::new(), &[]), None);
    }

    #[test]
    fn hash_is_stable_hex() {
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let first = ip_hash(&ip);
        assert_eq!(first, ip_hash(&ip));
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, ip_hash(&"203.0.113.8".parse().unwrap()));
    }
}
