pub mod geolocation;
pub mod peer_discovery;
pub mod prober;

pub use geolocation::{GeoResolver, IpInfoResolver};
pub use peer_discovery::{PeerDirectory, PolkachuDirectory};
pub use prober::{LatencyProber, TcpProber};
