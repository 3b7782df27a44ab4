//! Proxy-provider documents served to the routing engine.
//!
//! A document is `{"proxies": [ … ]}` with exactly one entry. It is emitted as JSON, which
//! the engine's YAML loader accepts, and rendered once into a [`Bytes`] buffer so that the
//! request path only clones a reference count.

use crate::proxy::{Proxy, ProxyProtocol};
use bytes::Bytes;
use serde_json::{json, Map, Value};

/// Content type of every provider document.
pub const CONTENT_TYPE: &str = "text/yaml; charset=utf-8";

/// Loopback address of the placeholder route. Nothing listens there, so the engine never
/// carries traffic through it.
pub const PLACEHOLDER_SERVER: &str = "127.0.0.1";
pub const PLACEHOLDER_PORT: u16 = 1;

const PLACEHOLDER_PREFIX: &str = "placeholder-";

/// Name of the proxy provider (and selector group) for `slot`.
#[must_use]
pub fn provider_name(slot: u32) -> String {
    format!("slot_{slot}")
}

/// Engine-side name of a real proxy bound to `slot`.
#[must_use]
pub fn proxy_name(slot: u32, proxy_id: i64) -> String {
    format!("slot{slot}-p{proxy_id}")
}

#[must_use]
pub fn placeholder_name(slot: u32) -> String {
    format!("{PLACEHOLDER_PREFIX}slot-{slot}")
}

/// Whether a group member name refers to a placeholder entry.
#[must_use]
pub fn is_placeholder_name(name: &str) -> bool {
    name.starts_with(PLACEHOLDER_PREFIX)
}

/// Renders the document for a real proxy bound to `slot`.
#[must_use]
pub fn render_proxy_document(slot: u32, proxy: &Proxy) -> Bytes {
    let mut entry = Map::new();
    entry.insert("name".into(), Value::String(proxy_name(slot, proxy.id)));
    entry.insert(
        "type".into(),
        Value::String(
            match proxy.protocol {
                ProxyProtocol::Http | ProxyProtocol::Https => "http",
                ProxyProtocol::Socks5 => "socks5",
            }
            .to_string(),
        ),
    );
    entry.insert("server".into(), Value::String(proxy.host.clone()));
    entry.insert("port".into(), Value::from(proxy.port));
    if proxy.protocol == ProxyProtocol::Https {
        entry.insert("tls".into(), Value::Bool(true));
    }
    if let Some(username) = &proxy.username {
        entry.insert("username".into(), Value::String(username.clone()));
        entry.insert(
            "password".into(),
            Value::String(proxy.password.clone().unwrap_or_default()),
        );
    }
    entry.insert("udp".into(), Value::Bool(proxy.protocol == ProxyProtocol::Socks5));

    wrap(Value::Object(entry))
}

/// Renders the placeholder document for `slot`.
#[must_use]
pub fn render_placeholder(slot: u32) -> Bytes {
    render_named_placeholder(&placeholder_name(slot))
}

/// Placeholder with an arbitrary name, used for ids outside the slot range.
#[must_use]
pub fn render_named_placeholder(name: &str) -> Bytes {
    wrap(json!({
        "name": name,
        "type": "socks5",
        "server": PLACEHOLDER_SERVER,
        "port": PLACEHOLDER_PORT,
    }))
}

fn wrap(entry: Value) -> Bytes {
    Bytes::from(json!({ "proxies": [entry] }).to_string())
}
