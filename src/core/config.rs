//! Service configuration for a2b
//!
//! Endpoints of the geocoding and routing services plus the HTTP policy
//! (timeouts, retries, concurrency) used to talk to them.

use std::time::Duration;

use crate::core::model::Location;

/// Public Nominatim instance
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// Public OSRM car profile hosted by openstreetmap.de
pub const DEFAULT_ROUTER_URL: &str = "https://routing.openstreetmap.de/routed-car";

/// Configuration for the external services
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the Nominatim-compatible geocoder
    pub geocoder_url: String,

    /// Base URL of the OSRM-compatible router
    pub router_url: String,

    /// User-Agent sent with every request (required by Nominatim's usage policy)
    pub user_agent: String,

    /// Overall request timeout
    pub request_timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Retries on network errors before giving up
    pub max_retries: u32,

    /// First backoff delay; doubled on every further attempt
    pub base_retry_delay: Duration,

    /// Upper bound on simultaneous routing requests
    pub max_concurrency: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            router_url: DEFAULT_ROUTER_URL.to_string(),
            user_agent: format!("a2b/{}", env!("A2B_VERSION")),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            base_retry_delay: Duration::from_millis(1000),
            max_concurrency: 8,
        }
    }
}

impl ServiceConfig {
    /// Geocoder search endpoint; query parameters are added by the caller
    pub fn search_url(&self) -> String {
        format!("{}/search", self.geocoder_url.trim_end_matches('/'))
    }

    /// Router endpoint for a directed pair of locations
    pub fn route_url(&self, origin: &Location, destination: &Location) -> String {
        format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.router_url.trim_end_matches('/'),
            origin.longitude(),
            origin.latitude(),
            destination.longitude(),
            destination.latitude(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let config = ServiceConfig::default();
        assert_eq!(
            config.search_url(),
            "https://nominatim.openstreetmap.org/search"
        );
        assert!(config.user_agent.starts_with("a2b/"));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_route_url() {
        let config = ServiceConfig {
            router_url: "http://localhost:5000/".to_string(),
            ..Default::default()
        };
        let paris = Location::new("Paris", 2.3522, 48.8566).unwrap();
        let lyon = Location::new("Lyon", 4.8357, 45.764).unwrap();

        assert_eq!(
            config.route_url(&paris, &lyon),
            "http://localhost:5000/route/v1/driving/2.3522,48.8566;4.8357,45.764"
        );
    }
}
