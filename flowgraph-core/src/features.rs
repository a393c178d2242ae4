// Feature catalog: how a request folds into an edge value, how edge values
// merge into a node, and how the node value is finally reported.

use crate::identity::ResolvedRequest;
use std::collections::BTreeMap;

/// Resource types reported by the browser's request instrumentation.
pub const REQUEST_TYPES: [&str; 13] = [
    "main_frame",
    "sub_frame",
    "stylesheet",
    "script",
    "image",
    "font",
    "object",
    "xmlhttprequest",
    "ping",
    "csp_report",
    "media",
    "websocket",
    "other",
];

pub const REQUEST_METHODS: [&str; 9] = [
    "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
];

pub const COUNT: &str = "count";
pub const COOKIES_SET: &str = "cookiesSet";
pub const INDEGREE: &str = "indegree";

/// One value per feature name.
pub type FeatureValues = BTreeMap<String, f64>;

/// `dividend / divisor`, or 0 when there is nothing to divide by.
pub fn ratio(dividend: f64, divisor: f64) -> f64 {
    if divisor > 0.0 { dividend / divisor } else { 0.0 }
}

/// Per-request quantity summed into an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    UrlLength,
    SubdomainLength,
    PathLength,
    QueryParams,
    RequestHeaders,
    ResponseHeaders,
    CookieFields,
}

impl Scalar {
    pub fn measure(&self, req: &ResolvedRequest) -> f64 {
        let n = match self {
            Scalar::UrlLength => req
                .record
                .target_url()
                .unwrap_or(req.target_url.as_str())
                .chars()
                .count(),
            Scalar::SubdomainLength => req.target_subdomain().len(),
            Scalar::PathLength => req.target_url.path().len(),
            Scalar::QueryParams => req.target_url.query_pairs().count(),
            Scalar::RequestHeaders => req.record.request_headers().len(),
            Scalar::ResponseHeaders => req.record.response_headers().len(),
            Scalar::CookieFields => req.record.cookie_field_count(),
        };
        n as f64
    }
}

/// Edge-level fold of one request into the running value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extract {
    ResourceType(&'static str),
    Method(&'static str),
    Count,
    Tracking,
    FirstPartyDisclosed,
    CookiesSet,
    ThirdPartyCookie,
    Sum(Scalar),
    MaxSubdomainDepth,
    Nothing,
}

/// Node-level merge of two edge values. Must be commutative and associative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Combine {
    #[default]
    Sum,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// The feature's own accumulated total
    Own,
    /// Another feature's accumulated total
    Feature(&'static str),
    Indegree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalize {
    Raw,
    Ratio { dividend: Operand, divisor: Operand },
}

/// Accumulated totals of one node, as seen by [`Feature::set`].
#[derive(Debug, Clone, Copy)]
pub struct NodeTotals<'a> {
    pub values: &'a FeatureValues,
    pub indegree: usize,
}

impl NodeTotals<'_> {
    pub fn get(&self, name: &str) -> f64 {
        if name == INDEGREE {
            return self.indegree as f64;
        }
        self.values.get(name).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    name: String,
    extract: Extract,
    combine: Combine,
    finalize: Finalize,
}

impl Feature {
    pub fn new(name: impl Into<String>, extract: Extract) -> Self {
        Self {
            name: name.into(),
            extract,
            combine: Combine::Sum,
            finalize: Finalize::Raw,
        }
    }

    pub fn combined_with(mut self, combine: Combine) -> Self {
        self.combine = combine;
        self
    }

    pub fn finalized_as(mut self, finalize: Finalize) -> Self {
        self.finalize = finalize;
        self
    }

    /// Reported as a share of the requests seen by the node.
    pub fn per_request(self) -> Self {
        self.finalized_as(Finalize::Ratio {
            dividend: Operand::Own,
            divisor: Operand::Feature(COUNT),
        })
    }

    /// Reported as an average over the node's in-neighbors.
    pub fn per_neighbor(self) -> Self {
        self.finalized_as(Finalize::Ratio {
            dividend: Operand::Own,
            divisor: Operand::Indegree,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn combine(&self) -> Combine {
        self.combine
    }

    pub fn finalize(&self) -> &Finalize {
        &self.finalize
    }

    pub fn extract(&self, req: &ResolvedRequest, current: f64) -> f64 {
        let record = req.record;
        let hit = |cond: bool| if cond { current + 1.0 } else { current };

        match &self.extract {
            Extract::ResourceType(value) => hit(record
                .resource_type()
                .is_some_and(|t| t.eq_ignore_ascii_case(value))),
            Extract::Method(value) => {
                hit(record.method().is_some_and(|m| m.eq_ignore_ascii_case(value)))
            }
            Extract::Count => current + 1.0,
            Extract::Tracking => hit(record.is_tracking()),
            Extract::FirstPartyDisclosed => {
                hit(record.has_request_header("referer") || record.has_request_header("origin"))
            }
            Extract::CookiesSet => hit(record.has_response_header("set-cookie")),
            Extract::ThirdPartyCookie => hit(
                record.has_response_header("set-cookie") && req.target_sld != req.source_sld,
            ),
            Extract::Sum(scalar) => current + scalar.measure(req),
            Extract::MaxSubdomainDepth => current.max(req.target_subdomain_depth() as f64),
            Extract::Nothing => current,
        }
    }

    pub fn accumulate(&self, x: f64, y: f64) -> f64 {
        match self.combine {
            Combine::Sum => x + y,
            Combine::Max => x.max(y),
        }
    }

    pub fn set(&self, totals: &NodeTotals) -> f64 {
        match &self.finalize {
            Finalize::Raw => totals.get(&self.name),
            Finalize::Ratio { dividend, divisor } => {
                ratio(self.operand(dividend, totals), self.operand(divisor, totals))
            }
        }
    }

    fn operand(&self, operand: &Operand, totals: &NodeTotals) -> f64 {
        match operand {
            Operand::Own => totals.get(&self.name),
            Operand::Feature(name) => totals.get(name),
            Operand::Indegree => totals.indegree as f64,
        }
    }
}

/// The fixed, name-ordered set of features computed for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRegistry {
    features: Vec<Feature>,
}

impl FeatureRegistry {
    /// Build a registry from arbitrary features. Sorted by name; when a name
    /// repeats, the first definition wins.
    pub fn from_features(mut features: Vec<Feature>) -> Self {
        features.sort_by(|a, b| a.name.cmp(&b.name));
        features.dedup_by(|later, earlier| later.name == earlier.name);
        Self { features }
    }

    pub fn standard() -> Self {
        let mut features = Vec::new();

        for value in REQUEST_TYPES {
            features.push(Feature::new(value, Extract::ResourceType(value)).per_request());
        }
        for value in REQUEST_METHODS {
            features.push(Feature::new(value, Extract::Method(value)).per_request());
        }

        features.push(Feature::new(COUNT, Extract::Count));
        features.push(Feature::new("tracking", Extract::Tracking).per_request());
        features.push(
            Feature::new("firstPartyDisclosed", Extract::FirstPartyDisclosed).per_request(),
        );
        features.push(Feature::new(COOKIES_SET, Extract::CookiesSet).per_neighbor());
        features.push(
            Feature::new("thirdPartyCookie", Extract::ThirdPartyCookie).finalized_as(
                Finalize::Ratio {
                    dividend: Operand::Own,
                    divisor: Operand::Feature(COOKIES_SET),
                },
            ),
        );

        let per_request = [
            ("avgUrlLength", Scalar::UrlLength),
            ("avgSubdomainLength", Scalar::SubdomainLength),
            ("avgPathLength", Scalar::PathLength),
            ("avgQpPerReq", Scalar::QueryParams),
            ("avgRhPerRq", Scalar::RequestHeaders),
            ("avgRespHPerRq", Scalar::ResponseHeaders),
            ("avgCookieFieldsPerRq", Scalar::CookieFields),
        ];
        for (name, scalar) in per_request {
            features.push(Feature::new(name, Extract::Sum(scalar)).per_request());
        }

        let per_neighbor = [
            ("avgQpPerNeighbor", Scalar::QueryParams),
            ("avgRhPerNeighbor", Scalar::RequestHeaders),
            ("avgRespHPerNeighbor", Scalar::ResponseHeaders),
            ("avgCookieFieldsPerNeighbor", Scalar::CookieFields),
        ];
        for (name, scalar) in per_neighbor {
            features.push(Feature::new(name, Extract::Sum(scalar)).per_neighbor());
        }

        features.push(
            Feature::new("avgReqPerNeighbor", Extract::Nothing).finalized_as(Finalize::Ratio {
                dividend: Operand::Feature(COUNT),
                divisor: Operand::Indegree,
            }),
        );
        features.push(
            Feature::new("maxSubdomainDepth", Extract::MaxSubdomainDepth)
                .combined_with(Combine::Max),
        );

        Self::from_features(features)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features
            .binary_search_by(|f| f.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.features[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name())
    }

    /// A fresh map with every feature at its zero state.
    pub fn zero_values(&self) -> FeatureValues {
        self.names().map(|name| (name.to_string(), 0.0)).collect()
    }

    /// Fold one request into an edge's values, feature by feature.
    pub fn extract_into(&self, values: &mut FeatureValues, req: &ResolvedRequest) {
        for feature in &self.features {
            match values.get_mut(feature.name()) {
                Some(slot) => *slot = feature.extract(req, *slot),
                None => {
                    values.insert(feature.name.clone(), feature.extract(req, 0.0));
                }
            }
        }
    }

    /// Merge an in-edge's values into a node's running totals.
    pub fn accumulate_into(&self, totals: &mut FeatureValues, edge: &FeatureValues) {
        for feature in &self.features {
            let incoming = edge.get(feature.name()).copied().unwrap_or(0.0);
            match totals.get_mut(feature.name()) {
                Some(slot) => *slot = feature.accumulate(*slot, incoming),
                None => {
                    totals.insert(feature.name.clone(), feature.accumulate(0.0, incoming));
                }
            }
        }
    }

    /// Final reported value of every feature for one node.
    pub fn finalize(&self, totals: &FeatureValues, indegree: usize) -> FeatureValues {
        let view = NodeTotals {
            values: totals,
            indegree,
        };
        self.features
            .iter()
            .map(|f| (f.name.clone(), f.set(&view)))
            .collect()
    }
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
