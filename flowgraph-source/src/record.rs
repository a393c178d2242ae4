use serde::{Deserialize, Serialize};

/// One observed HTTP/S exchange, as captured by the browser instrumentation.
///
/// Every field is optional on the wire. Missing fields read as "not present"
/// so that downstream feature extraction never has to fail on them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestRecord {
    pub request: HttpRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<HttpResponse>,
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    pub request_headers: Vec<Header>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub response_headers: Vec<Header>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Tracking annotation attached by a filter list or classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Label {
    pub is_labeled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl Header {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value.to_string()),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// First non-empty value of a header, matching the name case-insensitively.
fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .filter(|h| h.is(name))
        .filter_map(|h| h.value.as_deref())
        .find(|v| !v.is_empty())
}

impl RequestRecord {
    /// The request's own URL, falling back to the URL of its response.
    pub fn target_url(&self) -> Option<&str> {
        self.request
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| {
                self.response
                    .as_ref()
                    .and_then(|r| r.url.as_deref())
                    .filter(|u| !u.is_empty())
            })
    }

    /// Initiator, then `Referer`, then `Origin`.
    pub fn source_url(&self) -> Option<&str> {
        self.request
            .initiator
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.request_header("referer"))
            .or_else(|| self.request_header("origin"))
    }

    pub fn request_header(&self, name: &str) -> Option<&str> {
        find_header(&self.request.request_headers, name)
    }

    pub fn has_request_header(&self, name: &str) -> bool {
        self.request.request_headers.iter().any(|h| h.is(name))
    }

    pub fn has_response_header(&self, name: &str) -> bool {
        self.response_headers().iter().any(|h| h.is(name))
    }

    pub fn request_headers(&self) -> &[Header] {
        &self.request.request_headers
    }

    pub fn response_headers(&self) -> &[Header] {
        self.response
            .as_ref()
            .map(|r| r.response_headers.as_slice())
            .unwrap_or(&[])
    }

    pub fn method(&self) -> Option<&str> {
        self.request.method.as_deref()
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.request.resource_type.as_deref()
    }

    pub fn is_tracking(&self) -> bool {
        self.labels.iter().any(|l| l.is_labeled)
    }

    /// Number of `name=value` fields sent across all `Cookie` request headers.
    pub fn cookie_field_count(&self) -> usize {
        self.request
            .request_headers
            .iter()
            .filter(|h| h.is("cookie"))
            .filter_map(|h| h.value.as_deref())
            .flat_map(|v| v.split(';'))
            .filter(|field| !field.trim().is_empty())
            .count()
    }
}
