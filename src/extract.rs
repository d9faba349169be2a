//! Token lookup: where on the request the bearer token lives.

use crate::context::RequestContext;
use crate::error::AuthError;

/// One configured token-lookup strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenSource {
    Header { name: String, scheme: String },
    Query { name: String },
    Param { name: String },
    Cookie { name: String },
}

/// Parse a comma-separated `source:name` lookup list.
///
/// Unrecognized sources are silently skipped. The auth scheme only
/// applies to header sources.
pub(crate) fn parse_token_lookup(lookup: &str, scheme: &str) -> Vec<TokenSource> {
    let mut sources = Vec::new();
    for part in lookup.split(',') {
        let Some((kind, name)) = part.trim().split_once(':') else {
            continue;
        };
        let name = name.to_owned();
        match kind {
            "header" => sources.push(TokenSource::Header {
                name,
                scheme: scheme.to_owned(),
            }),
            "query" => sources.push(TokenSource::Query { name }),
            "param" => sources.push(TokenSource::Param { name }),
            "cookie" => sources.push(TokenSource::Cookie { name }),
            _ => {}
        }
    }
    sources
}

impl TokenSource {
    /// Pull a token from the request, or the missing-token sentinel.
    fn extract(&self, ctx: &dyn RequestContext) -> Result<String, AuthError> {
        let found = match self {
            TokenSource::Header { name, scheme } => ctx
                .header(name)
                .and_then(|value| strip_scheme(&value, scheme)),
            TokenSource::Query { name } => ctx.query(name),
            TokenSource::Param { name } => ctx.route_param(name),
            TokenSource::Cookie { name } => ctx.cookie(name),
        };
        match found {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(AuthError::MissingOrMalformedToken),
        }
    }
}

/// Walk the chain in configured order and accept the first extraction.
pub(crate) fn extract_token(
    sources: &[TokenSource],
    ctx: &dyn RequestContext,
) -> Result<String, AuthError> {
    for source in sources {
        if let Ok(token) = source.extract(ctx) {
            return Ok(token);
        }
    }
    Err(AuthError::MissingOrMalformedToken)
}

/// Strip the auth scheme prefix case-insensitively plus one separator
/// character. The scheme must be followed by at least one further
/// character beyond the separator.
fn strip_scheme(value: &str, scheme: &str) -> Option<String> {
    let prefix_len = scheme.len();
    if value.len() <= prefix_len + 1 {
        return None;
    }
    if !value.as_bytes()[..prefix_len].eq_ignore_ascii_case(scheme.as_bytes()) {
        return None;
    }
    Some(value.get(prefix_len..)?.trim().to_owned())
}
