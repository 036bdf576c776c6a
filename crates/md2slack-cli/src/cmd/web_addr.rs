use anyhow::{bail, Result};
use std::net::TcpListener;

const MAX_TRIES: u16 = 20;
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// First bindable `host:port`, trying the next ports in turn when
/// `auto_increment` is set.
pub fn resolve_web_addr(host: &str, port: u16, auto_increment: bool) -> Result<String> {
    let host = if host.trim().is_empty() {
        DEFAULT_HOST
    } else {
        host.trim()
    };
    let port = if port == 0 { DEFAULT_PORT } else { port };

    for i in 0..MAX_TRIES {
        let Some(candidate) = port.checked_add(i) else {
            break;
        };
        let addr = join_host_port(host, candidate);
        if TcpListener::bind(&addr).is_ok() {
            return Ok(addr);
        }
        if !auto_increment {
            bail!("port {port} unavailable");
        }
        tracing::debug!(addr = %addr, "port busy, trying next");
    }
    bail!("no available port found after {MAX_TRIES} attempts")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy_port() -> (TcpListener, u16) {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = l.local_addr().unwrap().port();
        (l, port)
    }

    #[test]
    fn busy_port_without_increment_fails() {
        let (_l, port) = busy_port();
        let err = resolve_web_addr("127.0.0.1", port, false).unwrap_err();
        assert_eq!(err.to_string(), format!("port {port} unavailable"));
    }

    #[test]
    fn busy_port_with_increment_moves_on() {
        let (_l, port) = busy_port();
        let addr = resolve_web_addr("127.0.0.1", port, true).unwrap();
        assert_ne!(addr, format!("127.0.0.1:{port}"));
        assert!(addr.starts_with("127.0.0.1:"));
    }

    #[test]
    fn free_port_is_used_as_is() {
        let (l, port) = busy_port();
        drop(l);
        assert_eq!(
            resolve_web_addr(" ", port, false).unwrap(),
            format!("127.0.0.1:{port}")
        );
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        assert_eq!(join_host_port("::1", 80), "[::1]:80");
    }
}
