//! Remote market API.
//!
//! `MarketApi` is the seam between the stores and the network: every method takes
//! the bearer credential explicitly, so callers mint a fresh one right before each
//! request. `HttpMarketApi` implements it over a blocking `reqwest` client with a
//! per-request timeout.
use std::time::Duration;

use log::debug;
use market_common::net::{
    endpoint, STOCKS_PATH, USER_ME_PATH, WATCHLIST_ADD_PATH, WATCHLIST_PATH, WATCHLIST_REMOVE_PATH,
};
use market_common::{MarketError, Quote, Result};
use reqwest::blocking::{Client, Response};
use reqwest::Url;
use serde::Deserialize;

/// Backend user record returned by `GET /users/me`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserProfile {
    /// Identity-provider user id.
    pub uid: String,
    /// E-mail address, if known.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub picture: Option<String>,
    /// Whether the backend grants admin rights.
    #[serde(default)]
    pub is_admin: bool,
}

/// One element of a `GET /watchlist` response: a bare symbol or an object carrying one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WatchlistEntry {
    Symbol(String),
    Item { symbol: String },
}

impl WatchlistEntry {
    fn into_symbol(self) -> String {
        match self {
            WatchlistEntry::Symbol(symbol) | WatchlistEntry::Item { symbol } => symbol,
        }
    }
}

/// Decode a `GET /watchlist` body into plain symbols.
pub fn watchlist_from_json(bytes: &[u8]) -> Result<Vec<String>> {
    let entries: Vec<WatchlistEntry> = serde_json::from_slice(bytes)?;
    Ok(entries.into_iter().map(WatchlistEntry::into_symbol).collect())
}

/// Operations the client needs from the remote market API.
pub trait MarketApi: Send + Sync {
    /// Full stock list with the latest price/metrics snapshot.
    fn fetch_stocks(&self, token: &str) -> Result<Vec<Quote>>;

    /// Symbols on the caller's watchlist.
    fn fetch_watchlist(&self, token: &str) -> Result<Vec<String>>;

    /// Add `symbol` to the caller's watchlist. Idempotent.
    fn add_to_watchlist(&self, token: &str, symbol: &str) -> Result<()>;

    /// Remove `symbol` from the caller's watchlist. Idempotent.
    fn remove_from_watchlist(&self, token: &str, symbol: &str) -> Result<()>;

    /// Make sure a backend user record exists for the caller.
    fn ensure_user(&self, token: &str) -> Result<UserProfile>;
}

/// `MarketApi` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpMarketApi {
    client: Client,
    base: String,
}

impl HttpMarketApi {
    /// Client for the API rooted at `base` with the given per-request `timeout`.
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        Url::parse(base).map_err(|e| MarketError::InvalidUrl(format!("{}: {}", base, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(MarketError::transport)?;
        Ok(HttpMarketApi {
            client,
            base: String::from(base),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        let raw = endpoint(&self.base, path);
        Url::parse(&raw).map_err(|e| MarketError::InvalidUrl(format!("{}: {}", raw, e)))
    }

    fn symbol_url(&self, prefix: &str, symbol: &str) -> Result<Url> {
        let mut url = self.url(prefix)?;
        url.path_segments_mut()
            .map_err(|_| MarketError::InvalidUrl(format!("{} cannot carry a path", self.base)))?
            .push(symbol);
        Ok(url)
    }

    fn get(&self, url: Url, token: &str) -> Result<Vec<u8>> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .map_err(|e| classify(&url, e))?;
        read_body(&url, response)
    }

    fn post(&self, url: Url, token: &str) -> Result<Vec<u8>> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(token)
            .send()
            .map_err(|e| classify(&url, e))?;
        read_body(&url, response)
    }
}

fn classify(url: &Url, err: reqwest::Error) -> MarketError {
    if err.is_timeout() {
        MarketError::Timeout(url.to_string())
    } else {
        MarketError::transport(err)
    }
}

fn read_body(url: &Url, response: Response) -> Result<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        return Err(MarketError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    let bytes = response.bytes().map_err(|e| classify(url, e))?;
    Ok(bytes.to_vec())
}

impl MarketApi for HttpMarketApi {
    fn fetch_stocks(&self, token: &str) -> Result<Vec<Quote>> {
        let body = self.get(self.url(STOCKS_PATH)?, token)?;
        Quote::list_from_json(&body)
    }

    fn fetch_watchlist(&self, token: &str) -> Result<Vec<String>> {
        let body = self.get(self.url(WATCHLIST_PATH)?, token)?;
        watchlist_from_json(&body)
    }

    fn add_to_watchlist(&self, token: &str, symbol: &str) -> Result<()> {
        self.post(self.symbol_url(WATCHLIST_ADD_PATH, symbol)?, token)?;
        Ok(())
    }

    fn remove_from_watchlist(&self, token: &str, symbol: &str) -> Result<()> {
        self.post(self.symbol_url(WATCHLIST_REMOVE_PATH, symbol)?, token)?;
        Ok(())
    }

    fn ensure_user(&self, token: &str) -> Result<UserProfile> {
        let body = self.get(self.url(USER_ME_PATH)?, token)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serve exactly one HTTP request with `status` and `body`, reporting the
    /// request line and the Authorization header back through the channel.
    fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut auth = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if line.to_ascii_lowercase().starts_with("authorization:") {
                    auth = line["authorization:".len()..].trim().to_string();
                }
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
            stream.flush().unwrap();
            tx.send((request_line.trim().to_string(), auth)).unwrap();
        });
        (base, rx)
    }

    #[test]
    fn fetch_stocks_sends_bearer_and_decodes() {
        let (base, rx) = serve_once("200 OK", r#"[{"symbol":"AAPL","full_name":"Apple Inc.","price":189.5}]"#);
        let api = HttpMarketApi::new(&base, Duration::from_secs(5)).unwrap();

        let quotes = api.fetch_stocks("tok-1").unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "AAPL");

        let (line, auth) = rx.recv().unwrap();
        assert_eq!(line, "GET /stocks HTTP/1.1");
        assert_eq!(auth, "Bearer tok-1");
    }

    #[test]
    fn mutation_posts_to_symbol_path() {
        let (base, rx) = serve_once("200 OK", r#"{"message":"Added BRK-B to watchlist"}"#);
        let api = HttpMarketApi::new(&base, Duration::from_secs(5)).unwrap();

        api.add_to_watchlist("tok-2", "BRK-B").unwrap();
        let (line, _) = rx.recv().unwrap();
        assert_eq!(line, "POST /watchlist/add/BRK-B HTTP/1.1");
    }

    #[test]
    fn non_success_status_is_an_error() {
        let (base, _rx) = serve_once("404 Not Found", r#"{"detail":"Stock not in watchlist"}"#);
        let api = HttpMarketApi::new(&base, Duration::from_secs(5)).unwrap();

        match api.remove_from_watchlist("tok", "ZZZ") {
            Err(MarketError::Status { status, url }) => {
                assert_eq!(status, 404);
                assert!(url.ends_with("/watchlist/remove/ZZZ"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_invalid_base() {
        assert!(matches!(
            HttpMarketApi::new("not a url", Duration::from_secs(1)),
            Err(MarketError::InvalidUrl(_))
        ));
    }

    #[test]
    fn watchlist_accepts_symbols_or_objects() {
        let symbols = watchlist_from_json(br#"["AAPL", {"symbol": "MSFT", "price": 410.0}]"#).unwrap();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
        assert!(watchlist_from_json(br#"[42]"#).is_err());
    }

    #[test]
    fn user_profile_tolerates_missing_fields() {
        let profile: UserProfile = serde_json::from_str(r#"{"uid": "u1", "email": null}"#).unwrap();
        assert_eq!(profile.uid, "u1");
        assert!(!profile.is_admin);
    }
}
