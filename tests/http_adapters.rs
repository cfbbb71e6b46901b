//! Directory and geolocation adapters against a loopback HTTP stub.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use peerscout::error::{DirectoryError, GeoError};
use peerscout::network::{GeoResolver, IpInfoResolver, PeerDirectory, PolkachuDirectory};

/// Status 0 means "never answer"
type Routes = HashMap<&'static str, (u16, String)>;

struct Stub {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Stub {
    async fn start(routes: Routes) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let routes = Arc::new(routes);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let routes = routes.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let mut read = 0;
                    loop {
                        let n = stream.read(&mut buf[read..]).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        read += n;
                        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    let head = String::from_utf8_lossy(&buf[..read]).to_string();
                    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    log.lock().unwrap().push(target.clone());

                    let path = target.split('?').next().unwrap_or("/");
                    let (status, body) = routes
                        .get(path)
                        .cloned()
                        .unwrap_or((404, r#"{"error":"not found"}"#.to_string()));

                    if status == 0 {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        return;
                    }

                    let response = format!(
                        "HTTP/1.1 {} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { base_url, requests }
    }

    fn hits(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.split('?').next() == Some(path))
            .count()
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn chain_details(name: &str, active: bool) -> String {
    format!(
        r#"{{"network":"{name}","name":"{name}","chain_id":"{name}-1","polkachu_services":{{"live_peers":{{"active":{active},"details":"https://polkachu.com/live_peers/{name}"}}}}}}"#
    )
}

fn directory_routes() -> Routes {
    let mut routes = Routes::new();
    routes.insert(
        "/api/v2/chains",
        (200, r#"["dydx","osmosis","cosmos","juno"]"#.to_string()),
    );
    routes.insert("/api/v2/chains/dydx", (200, chain_details("dydx", true)));
    routes.insert(
        "/api/v2/chains/dydx/live_peers",
        (
            200,
            r#"{"network":"dydx","polkachu_peer":"abc@65.108.0.1:23856","live_peers":["8a675a29f7ef@203.0.113.1:26656","91f8f5671140@127.0.0.1:26656","2e5b1ec612ea@198.51.100.9:26656","garbage"]}"#
                .to_string(),
        ),
    );
    routes.insert("/api/v2/chains/juno", (200, chain_details("juno", false)));
    routes.insert("/api/v2/chains/cosmos", (200, chain_details("cosmos", true)));
    routes.insert(
        "/api/v2/chains/cosmos/live_peers",
        (500, r#"{"error":"upstream"}"#.to_string()),
    );
    routes
}

fn directory(stub: &Stub) -> PolkachuDirectory {
    PolkachuDirectory::new(&stub.base_url, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_directory_returns_usable_live_peers() {
    let stub = Stub::start(directory_routes()).await;
    let peers = directory(&stub).fetch_candidates("dydx").await.unwrap();

    let rendered: Vec<_> = peers.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            "8a675a29f7ef@203.0.113.1:26656",
            "2e5b1ec612ea@198.51.100.9:26656"
        ]
    );
}

#[tokio::test]
async fn test_directory_caches_network_checks() {
    let stub = Stub::start(directory_routes()).await;
    let directory = directory(&stub);

    for _ in 0..3 {
        directory.fetch_candidates("dydx").await.unwrap();
    }

    assert_eq!(stub.hits("/api/v2/chains"), 1);
    assert_eq!(stub.hits("/api/v2/chains/dydx"), 1);
    assert_eq!(stub.hits("/api/v2/chains/dydx/live_peers"), 3);
}

#[tokio::test]
async fn test_directory_unknown_network_suggests_close_names() {
    let stub = Stub::start(directory_routes()).await;
    let err = directory(&stub)
        .fetch_candidates("osmosiss")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DirectoryError::UnknownNetwork {
            network: "osmosiss".to_string(),
            suggestions: vec!["osmosis".to_string()],
        }
    );
    assert_eq!(stub.hits("/api/v2/chains/osmosiss/live_peers"), 0);
}

#[tokio::test]
async fn test_directory_inactive_service() {
    let stub = Stub::start(directory_routes()).await;
    let err = directory(&stub).fetch_candidates("juno").await.unwrap_err();
    assert_eq!(
        err,
        DirectoryError::ServiceUnavailable {
            network: "juno".to_string()
        }
    );
}

#[tokio::test]
async fn test_directory_server_error_is_transient() {
    let stub = Stub::start(directory_routes()).await;
    let err = directory(&stub).fetch_candidates("cosmos").await.unwrap_err();
    assert!(matches!(err, DirectoryError::Transient(_)));
}

#[tokio::test]
async fn test_directory_unreachable_is_transient() {
    // Nothing listens on this port once the listener is dropped
    let base_url = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let directory = PolkachuDirectory::new(base_url, Duration::from_secs(2)).unwrap();

    let err = directory.fetch_candidates("dydx").await.unwrap_err();
    assert!(matches!(err, DirectoryError::Transient(_)));
}

const PEER_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1));

fn geo_routes() -> Routes {
    let mut routes = Routes::new();
    routes.insert(
        "/203.0.113.1/json",
        (
            200,
            r#"{"ip":"203.0.113.1","city":"Toronto","country":"CA"}"#.to_string(),
        ),
    );
    routes.insert(
        "/10.0.0.1/json",
        (200, r#"{"ip":"10.0.0.1","bogon":true}"#.to_string()),
    );
    routes.insert("/198.51.100.1/json", (429, r#"{"error":"rate limited"}"#.to_string()));
    routes.insert("/198.51.100.2/json", (0, String::new()));
    routes
}

#[tokio::test]
async fn test_geolocation_resolves_country_with_token() {
    let stub = Stub::start(geo_routes()).await;
    let geo = IpInfoResolver::new(&stub.base_url, Some("secret".into()), Duration::from_secs(2))
        .unwrap();

    let country = geo.resolve_country(PEER_IP).await.unwrap();
    assert_eq!(country.as_str(), "CA");
    assert_eq!(stub.requests(), vec!["/203.0.113.1/json?token=secret"]);
}

#[tokio::test]
async fn test_geolocation_without_token_sends_no_query() {
    let stub = Stub::start(geo_routes()).await;
    let geo = IpInfoResolver::new(&stub.base_url, Some(String::new()), Duration::from_secs(2))
        .unwrap();
    assert!(!geo.has_access_token());

    geo.resolve_country(PEER_IP).await.unwrap();
    assert_eq!(stub.requests(), vec!["/203.0.113.1/json"]);
}

#[tokio::test]
async fn test_geolocation_failures() {
    let stub = Stub::start(geo_routes()).await;
    let geo = IpInfoResolver::new(&stub.base_url, None, Duration::from_millis(300)).unwrap();

    let bogon = geo
        .resolve_country(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
        .await
        .unwrap_err();
    assert!(matches!(bogon, GeoError::Lookup(_)));

    let limited = geo
        .resolve_country(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1)))
        .await
        .unwrap_err();
    assert!(matches!(limited, GeoError::Lookup(_)));

    let hung_ip = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 2));
    let hung = geo.resolve_country(hung_ip).await.unwrap_err();
    assert_eq!(hung, GeoError::Timeout { ip: hung_ip });
}
