// Host identity resolution and first/third-party classification

use flowgraph_source::RequestRecord;
use std::fmt;
use std::net::IpAddr;
use url::{Host, Url};

/// How a hostname is turned into a node key. Fixed for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentityMode {
    /// Full hostname (`img.cdn.tracker.com`)
    #[default]
    Fqdn,
    /// Registrable domain (`tracker.com`)
    Sld,
}

impl IdentityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityMode::Fqdn => "fqdn",
            IdentityMode::Sld => "sld",
        }
    }
}

/// Why a record did not make it into the graph. This is a filtering
/// outcome, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rejection {
    MissingTarget,
    MissingSource,
    InvalidUrl,
    MissingHost,
    FirstParty,
    SelfLoop,
}

impl Rejection {
    pub const ALL: [Rejection; 6] = [
        Rejection::MissingTarget,
        Rejection::MissingSource,
        Rejection::InvalidUrl,
        Rejection::MissingHost,
        Rejection::FirstParty,
        Rejection::SelfLoop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::MissingTarget => "missing_target",
            Rejection::MissingSource => "missing_source",
            Rejection::InvalidUrl => "invalid_url",
            Rejection::MissingHost => "missing_host",
            Rejection::FirstParty => "first_party",
            Rejection::SelfLoop => "self_loop",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that passed identity resolution, with everything feature
/// extraction needs already parsed.
#[derive(Debug, Clone)]
pub struct ResolvedRequest<'r> {
    pub record: &'r RequestRecord,
    pub target_url: Url,
    pub source_host: String,
    pub target_host: String,
    pub source_sld: String,
    pub target_sld: String,
    /// Node key of the edge source (hostname or SLD, depending on mode)
    pub source: String,
    /// Node key of the edge target
    pub target: String,
    pub is_first_party: bool,
}

impl ResolvedRequest<'_> {
    /// Labels of the target hostname left of its SLD, without the joining dot.
    pub fn target_subdomain(&self) -> &str {
        subdomain(&self.target_host, &self.target_sld)
    }

    /// Number of target-host labels strictly below the SLD.
    pub fn target_subdomain_depth(&self) -> usize {
        match self.target_subdomain() {
            "" => 0,
            sub => sub.split('.').count(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HostResolver {
    mode: IdentityMode,
    include_first_party: bool,
}

impl HostResolver {
    pub fn new(mode: IdentityMode, include_first_party: bool) -> Self {
        Self {
            mode,
            include_first_party,
        }
    }

    pub fn resolve<'r>(&self, record: &'r RequestRecord) -> Result<ResolvedRequest<'r>, Rejection> {
        let target = record.target_url().ok_or(Rejection::MissingTarget)?;
        let source = record.source_url().ok_or(Rejection::MissingSource)?;

        let target_url = parse_web_url(target)?;
        let source_url = parse_web_url(source)?;

        let target_host = hostname(&target_url)?;
        let source_host = hostname(&source_url)?;

        let target_sld = second_level_domain(&target_host);
        let source_sld = second_level_domain(&source_host);

        let is_first_party = source_sld == target_sld;
        if is_first_party && !self.include_first_party {
            return Err(Rejection::FirstParty);
        }

        let (source, target) = match self.mode {
            IdentityMode::Fqdn => (source_host.clone(), target_host.clone()),
            IdentityMode::Sld => (source_sld.clone(), target_sld.clone()),
        };
        if source == target {
            return Err(Rejection::SelfLoop);
        }

        Ok(ResolvedRequest {
            record,
            target_url,
            source_host,
            target_host,
            source_sld,
            target_sld,
            source,
            target,
            is_first_party,
        })
    }
}

/// Parse an absolute `http`/`https` URL. The scheme must be spelled out;
/// `url` alone would accept `http:example.com`.
pub fn parse_web_url(raw: &str) -> Result<Url, Rejection> {
    let raw = raw.trim();
    let explicit = ["http://", "https://"].iter().any(|scheme| {
        raw.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    });
    if !explicit {
        return Err(Rejection::InvalidUrl);
    }

    let url = Url::parse(raw).map_err(|_| Rejection::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(Rejection::InvalidUrl),
    }
}

fn hostname(url: &Url) -> Result<String, Rejection> {
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.trim_end_matches('.').to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => return Err(Rejection::MissingHost),
    };

    if host.is_empty() {
        return Err(Rejection::MissingHost);
    }
    Ok(host)
}

/// Registrable domain of `hostname` per the public suffix list. IP literals
/// and hosts without a registrable part are their own SLD.
pub fn second_level_domain(hostname: &str) -> String {
    if hostname.parse::<IpAddr>().is_ok() {
        return hostname.to_string();
    }

    psl::domain_str(hostname).unwrap_or(hostname).to_string()
}

pub fn subdomain<'h>(hostname: &'h str, sld: &str) -> &'h str {
    hostname
        .strip_suffix(sld)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or("")
}
