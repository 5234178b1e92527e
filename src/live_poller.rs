//! live-poller — live odds polling service with HTTP control + WS feed
//!
//! HTTP (LIVE_POLLER_BIND, default 127.0.0.1:8090):
//!   GET|POST /api/live-scraper/start
//!   GET|POST /api/live-scraper/stop
//!   GET      /api/live-scraper/status
//!   GET      /api/live-scraper/events
//!   GET      /health
//!
//! WS (LIVE_FEED_BIND, default 127.0.0.1:8091): current snapshot on connect,
//! then every snapshot / suspension change as it happens.
//!
//! Run:
//!   LIVE_SOURCES=sportybet,betpawa-gh LIVE_AUTOSTART=true cargo run --bin live-poller

use anyhow::{Context, Result};
use dotenv::dotenv;
use futures_util::{SinkExt, StreamExt};
use logger::EventLogger;
use odds_core::config::env_or;
use oddscrape::history_db::{spawn_db_writer, DbConfig};
use oddscrape::poller::{FeedUpdate, LivePoller, PollerConfig};
use serde::Serialize;
use std::env;
use std::fs::File;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Start,
    Stop,
    Status,
    Events,
    Health,
    MethodNotAllowed,
    NotFound,
}

fn route(method: &str, target: &str) -> Route {
    let path = target.split('?').next().unwrap_or("").trim_end_matches('/');
    let (route, methods): (Route, &[&str]) = match path {
        "/api/live-scraper/start"  => (Route::Start, &["GET", "POST"]),
        "/api/live-scraper/stop"   => (Route::Stop, &["GET", "POST"]),
        "/api/live-scraper/status" => (Route::Status, &["GET"]),
        "/api/live-scraper/events" => (Route::Events, &["GET"]),
        "/health"                  => (Route::Health, &["GET"]),
        _ => return Route::NotFound,
    };
    if methods.contains(&method) {
        route
    } else {
        Route::MethodNotAllowed
    }
}

fn json_body<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

async fn handle_http_connection(mut stream: TcpStream, poller: LivePoller) -> Result<()> {
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await.context("http read")?;
    if n == 0 {
        return Ok(());
    }

    let req = String::from_utf8_lossy(&buf[..n]);
    let first_line = req.lines().next().unwrap_or_default();
    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("");

    const JSON: &str = "application/json; charset=utf-8";
    const TEXT: &str = "text/plain; charset=utf-8";

    let (status_line, content_type, body) = match route(method, target) {
        Route::Start  => ("HTTP/1.1 200 OK", JSON, json_body(&poller.start().await)),
        Route::Stop   => ("HTTP/1.1 200 OK", JSON, json_body(&poller.stop().await)),
        Route::Status => ("HTTP/1.1 200 OK", JSON, json_body(&poller.status().await)),
        Route::Events => ("HTTP/1.1 200 OK", JSON, json_body(&poller.events().await)),
        Route::Health => ("HTTP/1.1 200 OK", TEXT, "ok".to_string()),
        Route::MethodNotAllowed => ("HTTP/1.1 405 Method Not Allowed", TEXT, "method not allowed".to_string()),
        Route::NotFound => ("HTTP/1.1 404 Not Found", TEXT, "not found".to_string()),
    };
    debug!("{method} {target} -> {status_line}");

    let resp = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(resp.as_bytes()).await.context("http write")?;
    Ok(())
}

async fn start_http_server(poller: LivePoller, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind).await.context("http bind")?;
    info!("live-poller http listening on http://{} (/api/live-scraper/{{start,stop,status,events}}, /health)", bind);

    loop {
        let (stream, peer) = listener.accept().await.context("http accept")?;
        let poller = poller.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_http_connection(stream, poller).await {
                debug!("http handler err {}: {}", peer, e);
            }
        });
    }
}

async fn handle_socket(peer: SocketAddr, stream: TcpStream, poller: LivePoller) -> Result<()> {
    let ws_stream = accept_async(stream).await.context("WS handshake failed")?;
    info!("WS client connected: {}", peer);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let mut updates = poller.subscribe();

    let status = poller.status().await;
    let hello = FeedUpdate::Snapshot {
        ts:              logger::now_iso(),
        cycle:           status.cycles,
        suspended_count: status.suspended_count,
        events:          poller.events().await,
    };
    ws_sink
        .send(Message::Text(json_body(&hello).into()))
        .await
        .context("WS initial snapshot")?;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(u) => {
                    let txt = serde_json::to_string(&u).unwrap_or_else(|_| "{}".to_string());
                    if ws_sink.send(Message::Text(txt.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("WS client {} lagged, skipped {} updates", peer, n),
                Err(RecvError::Closed) => break,
            },
            msg = ws_stream.next() => match msg {
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws_sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WS recv err from {}: {}", peer, e);
                    break;
                }
            },
        }
    }

    info!("WS client disconnected: {}", peer);
    Ok(())
}

async fn start_ws_server(poller: LivePoller, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind).await.context("ws bind")?;
    info!("live-poller feed listening on ws://{}", bind);

    while let Ok((stream, peer)) = listener.accept().await {
        let poller = poller.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_socket(peer, stream, poller).await {
                debug!("socket handler err {}: {}", peer, e);
            }
        });
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    oddscrape::init_tracing();

    // Single instance lock
    let lock_file_path = env::temp_dir().join("oddscrape_live_poller.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another instance of live-poller is already running! Exiting.");
            return Ok(());
        }
    };

    let cfg = PollerConfig::from_env()?;
    let http_addr: SocketAddr = env_or("LIVE_POLLER_BIND", "127.0.0.1:8090".to_string())
        .parse()
        .context("Invalid LIVE_POLLER_BIND")?;
    let ws_addr: SocketAddr = env_or("LIVE_FEED_BIND", "127.0.0.1:8091".to_string())
        .parse()
        .context("Invalid LIVE_FEED_BIND")?;
    let db_path = env_or("HISTORY_DB_PATH", "data/history.db".to_string());
    let log_dir = env_or("LOG_DIR", "logs".to_string());

    info!("=== live-poller ===");
    info!("Sources: {:?}, interval {}s", cfg.sources, cfg.interval.as_secs());
    info!("Snapshot: {}, history DB: {}, logs: {}/", cfg.snapshot_path.display(), db_path, log_dir);

    let logger = Arc::new(EventLogger::new(log_dir));
    let db_tx = spawn_db_writer(DbConfig { path: db_path });
    let poller = LivePoller::new(cfg, logger, Some(db_tx));
    poller.restore_snapshot().await;

    {
        let poller = poller.clone();
        tokio::spawn(async move {
            if let Err(e) = start_ws_server(poller, ws_addr).await {
                warn!("ws server stopped: {e}");
            }
        });
    }

    if env_or("LIVE_AUTOSTART", false) {
        poller.start().await;
    } else {
        info!("poller idle, POST /api/live-scraper/start to begin");
    }

    start_http_server(poller, http_addr).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_method_and_path() {
        assert_eq!(route("POST", "/api/live-scraper/start"), Route::Start);
        assert_eq!(route("GET", "/api/live-scraper/start"), Route::Start);
        assert_eq!(route("GET", "/api/live-scraper/stop/"), Route::Stop);
        assert_eq!(route("GET", "/api/live-scraper/status?verbose=1"), Route::Status);
        assert_eq!(route("GET", "/api/live-scraper/events"), Route::Events);
        assert_eq!(route("GET", "/health"), Route::Health);
    }

    #[test]
    fn rejects_unknown_paths_and_methods() {
        assert_eq!(route("POST", "/api/live-scraper/status"), Route::MethodNotAllowed);
        assert_eq!(route("DELETE", "/api/live-scraper/start"), Route::MethodNotAllowed);
        assert_eq!(route("GET", "/state"), Route::NotFound);
        assert_eq!(route("", ""), Route::NotFound);
    }
}
