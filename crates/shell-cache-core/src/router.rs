//! Route classification
//!
//! Maps a request URL to a routing category using an ordered list of
//! predicate rules. The first matching rule wins, and the list always ends
//! with a catch-all so every interceptable request gets exactly one category.

use http::Method;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::config::{FaviconService, RouteConfig, host_matches};

/// Error type for parsing a route category
#[derive(Debug, Clone)]
pub struct ParseRouteCategoryError(String);

impl fmt::Display for ParseRouteCategoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid route category: {}", self.0)
    }
}

impl std::error::Error for ParseRouteCategoryError {}

/// Routing category of a request, derived purely from its URL
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RouteCategory {
    /// Same origin as the page
    OwnOrigin,
    /// Versioned icon package on a known CDN
    VersionedCdnIcon,
    /// Third-party favicon service
    FaviconService,
    /// Anything else
    GenericExternal,
}

impl RouteCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteCategory::OwnOrigin => "own-origin",
            RouteCategory::VersionedCdnIcon => "versioned-cdn-icon",
            RouteCategory::FaviconService => "favicon-service",
            RouteCategory::GenericExternal => "generic-external",
        }
    }
}

impl fmt::Display for RouteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteCategory {
    type Err = ParseRouteCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "own-origin" => Ok(RouteCategory::OwnOrigin),
            "versioned-cdn-icon" => Ok(RouteCategory::VersionedCdnIcon),
            "favicon-service" => Ok(RouteCategory::FaviconService),
            "generic-external" => Ok(RouteCategory::GenericExternal),
            _ => Err(ParseRouteCategoryError(s.to_string())),
        }
    }
}

/// A single URL predicate
#[derive(Debug, Clone)]
pub enum RouteMatcher {
    /// Host is one of `hosts` and a path segment names the `marker` package
    HostWithSegment { hosts: Vec<String>, marker: String },
    /// Same scheme, host and port as `origin`
    SameOrigin { origin: Url },
    /// Matches any of the listed favicon services
    Host { services: Vec<FaviconService> },
    /// Always matches
    Any,
}

impl RouteMatcher {
    pub fn matches(&self, url: &Url) -> bool {
        match self {
            RouteMatcher::HostWithSegment { hosts, marker } => {
                let Some(host) = url.host_str() else {
                    return false;
                };
                hosts.iter().any(|h| host_matches(host, h)) && has_package_segment(url, marker)
            }
            RouteMatcher::SameOrigin { origin } => url.origin() == origin.origin(),
            RouteMatcher::Host { services } => services.iter().any(|s| s.matches(url)),
            RouteMatcher::Any => true,
        }
    }
}

/// Whether a path segment is `marker`, or `marker@<version>` as CDNs
/// address versioned npm packages
fn has_package_segment(url: &Url, marker: &str) -> bool {
    let Some(segments) = url.path_segments() else {
        return false;
    };

    segments.into_iter().any(|segment| {
        segment == marker
            || segment
                .strip_prefix(marker)
                .is_some_and(|rest| rest.starts_with('@'))
    })
}

/// A predicate paired with the category it assigns
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub matcher: RouteMatcher,
    pub category: RouteCategory,
}

impl RouteRule {
    pub fn new(matcher: RouteMatcher, category: RouteCategory) -> Self {
        Self { matcher, category }
    }
}

/// Ordered rule list classifier
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    rules: Vec<RouteRule>,
}

impl RouteClassifier {
    /// Build the standard rule list:
    /// icon CDN, own origin, favicon services, then everything else.
    pub fn new(config: &RouteConfig) -> Self {
        Self::from_rules(vec![
            RouteRule::new(
                RouteMatcher::HostWithSegment {
                    hosts: config.icon_cdn_hosts.clone(),
                    marker: config.icon_path_marker.clone(),
                },
                RouteCategory::VersionedCdnIcon,
            ),
            RouteRule::new(
                RouteMatcher::SameOrigin {
                    origin: config.origin.clone(),
                },
                RouteCategory::OwnOrigin,
            ),
            RouteRule::new(
                RouteMatcher::Host {
                    services: config.favicon_services.clone(),
                },
                RouteCategory::FaviconService,
            ),
        ])
    }

    /// Build a classifier from explicit rules. A catch-all rule mapping to
    /// `GenericExternal` is appended.
    pub fn from_rules(mut rules: Vec<RouteRule>) -> Self {
        rules.push(RouteRule::new(RouteMatcher::Any, RouteCategory::GenericExternal));
        Self { rules }
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Classify a URL. First matching rule wins.
    pub fn classify(&self, url: &Url) -> RouteCategory {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(url))
            .map(|rule| rule.category)
            .unwrap_or(RouteCategory::GenericExternal)
    }
}

/// Only GET requests over http(s) are intercepted; everything else goes
/// straight to the network.
pub fn is_interceptable(method: &Method, url: &Url) -> bool {
    *method == Method::GET && matches!(url.scheme(), "http" | "https")
}
