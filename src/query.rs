//! Named-query resolution.
//!
//! A request that names a configured query is rewritten into a concrete
//! request: the query's filter template is resolved through token
//! substitution against the request's additional parameters, and the
//! query's default sort keys and field projection are applied. Requests
//! without a named query pass through unchanged. The backend is never
//! contacted from here.

use crate::config::{QueryConfig, StringOrList};
use crate::error::{RepoError, RepoResult};
use crate::filter::Filter;
use crate::request::{QueryRequest, SortKey};
use crate::token;
use log::trace;
use std::collections::HashMap;

/// Resolves named-query references against the configured query table.
#[derive(Debug, Clone, Default)]
pub struct QueryNormalizer {
    queries: HashMap<String, QueryConfig>,
}

impl QueryNormalizer {
    /// Create a normalizer over a validated query table.
    pub fn new(queries: HashMap<String, QueryConfig>) -> Self {
        Self { queries }
    }

    /// Whether a query id is configured.
    pub fn contains(&self, query_id: &str) -> bool {
        self.queries.contains_key(query_id)
    }

    /// Resolve a request's named-query reference, if any.
    ///
    /// Returns the request unchanged when it carries no query id. Fails
    /// with a bad request when the id is unknown, a configured sort key or
    /// field value is malformed, or a filter-template token has no matching
    /// additional parameter on the request.
    pub fn normalize(&self, request: &QueryRequest) -> RepoResult<QueryRequest> {
        let query_id = match request.query_id.as_deref() {
            Some(query_id) if !query_id.is_empty() => query_id,
            _ => return Ok(request.clone()),
        };
        let config = self.queries.get(query_id).ok_or_else(|| {
            RepoError::bad_request(format!("Requested query {query_id} does not exist"))
        })?;

        // the reference is resolved into a concrete filter, not left dangling
        let mut normalized = request.clone();
        normalized.query_id = None;

        if let Some(spec) = &config.sort_keys {
            normalized.sort_keys.extend(parse_sort_keys(spec)?);
        }
        if let Some(spec) = &config.fields {
            normalized.fields.extend(parse_fields(spec)?);
        }

        let template = config.query_filter.as_deref().ok_or_else(|| {
            RepoError::internal(format!("query '{query_id}' has no filter template"))
        })?;
        let mut replacements = HashMap::new();
        for name in token::extract_tokens(template) {
            match request.additional_parameters.get(&name) {
                Some(value) => {
                    replacements.insert(name, value.clone());
                }
                None => {
                    return Err(RepoError::bad_request(format!(
                        "Query expected additional parameter {name}"
                    )));
                }
            }
        }
        let concrete = token::replace_tokens(template, &replacements);
        trace!("resolved query '{query_id}' to filter: {concrete}");
        normalized.filter = Some(Filter::parse(&concrete)?);
        Ok(normalized)
    }
}

fn parse_sort_keys(spec: &StringOrList) -> RepoResult<Vec<SortKey>> {
    split_spec(spec)
        .into_iter()
        .map(|raw| {
            raw.parse::<SortKey>().map_err(|_| {
                RepoError::bad_request(format!(
                    "The value '{raw}' for 'sortKeys' could not be parsed as a comma separated list of sort keys"
                ))
            })
        })
        .collect()
}

fn parse_fields(spec: &StringOrList) -> RepoResult<Vec<String>> {
    split_spec(spec)
        .into_iter()
        .map(|raw| {
            let field = raw.trim();
            if field.is_empty() {
                Err(RepoError::bad_request(format!(
                    "The value '{raw}' for 'fields' could not be parsed as a comma separated list of fields"
                )))
            } else {
                Ok(field.to_string())
            }
        })
        .collect()
}

fn split_spec(spec: &StringOrList) -> Vec<&str> {
    match spec {
        StringOrList::One(joined) => joined.split(',').collect(),
        StringOrList::Many(items) => items.iter().map(String::as_str).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TypeHandlerConfig;
    use serde_json::json;

    fn normalizer_from(value: serde_json::Value) -> QueryNormalizer {
        let config: TypeHandlerConfig = serde_json::from_value(value).unwrap();
        config.validate().unwrap();
        QueryNormalizer::new(config.queries)
    }

    fn by_email() -> QueryNormalizer {
        normalizer_from(json!({
            "queries": {
                "byEmail": {"queryFilter": "mail eq \"${email}\""}
            }
        }))
    }

    #[test]
    fn test_pass_through_without_query_id() {
        let normalizer = by_email();
        let request = QueryRequest::new()
            .with_filter(Filter::parse("sn pr").unwrap())
            .with_parameter("unused", "x");
        assert_eq!(normalizer.normalize(&request).unwrap(), request);
    }

    #[test]
    fn test_unknown_query_id_is_bad_request() {
        let normalizer = by_email();
        let request = QueryRequest::new().with_query_id("nope");
        assert!(matches!(
            normalizer.normalize(&request),
            Err(RepoError::BadRequest { .. })
        ));
    }

    #[test]
    fn test_token_substitution_resolves_filter() {
        let normalizer = by_email();
        let request = QueryRequest::new()
            .with_query_id("byEmail")
            .with_parameter("email", "a@b.com");
        let normalized = normalizer.normalize(&request).unwrap();
        assert_eq!(normalized.query_id, None);
        assert_eq!(
            normalized.filter,
            Some(Filter::parse("mail eq \"a@b.com\"").unwrap())
        );
    }

    #[test]
    fn test_missing_token_parameter_is_bad_request() {
        let normalizer = by_email();
        let request = QueryRequest::new().with_query_id("byEmail");
        match normalizer.normalize(&request) {
            Err(RepoError::BadRequest { message }) => assert!(message.contains("email")),
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn test_sort_key_encodings_equivalent() {
        let string_form = normalizer_from(json!({
            "queries": {"q": {"queryFilter": "uid pr", "sortKeys": "sn,-givenName,+mail"}}
        }));
        let list_form = normalizer_from(json!({
            "queries": {"q": {"queryFilter": "uid pr", "sortKeys": ["sn", "-givenName", "+mail"]}}
        }));
        let request = QueryRequest::new().with_query_id("q");
        assert_eq!(
            string_form.normalize(&request).unwrap().sort_keys,
            list_form.normalize(&request).unwrap().sort_keys
        );
        assert_eq!(
            string_form.normalize(&request).unwrap().sort_keys,
            vec![
                SortKey::ascending("sn"),
                SortKey::descending("givenName"),
                SortKey::ascending("mail"),
            ]
        );
    }

    #[test]
    fn test_malformed_sort_key_is_bad_request() {
        let normalizer = normalizer_from(json!({
            "queries": {"q": {"queryFilter": "uid pr", "sortKeys": "sn,,mail"}}
        }));
        let request = QueryRequest::new().with_query_id("q");
        assert!(matches!(
            normalizer.normalize(&request),
            Err(RepoError::BadRequest { .. })
        ));
    }

    #[test]
    fn test_configured_fields_appended() {
        let normalizer = normalizer_from(json!({
            "queries": {"q": {"queryFilter": "uid pr", "fields": "uid, mail"}}
        }));
        let request = QueryRequest::new().with_query_id("q").with_field("sn");
        let normalized = normalizer.normalize(&request).unwrap();
        assert_eq!(normalized.fields, vec!["sn", "uid", "mail"]);
    }

    #[test]
    fn test_request_sort_keys_kept_when_config_has_none() {
        let normalizer = normalizer_from(json!({
            "queries": {"q": {"queryFilter": "uid pr"}}
        }));
        let request = QueryRequest::new()
            .with_query_id("q")
            .with_sort_key(SortKey::ascending("sn"));
        let normalized = normalizer.normalize(&request).unwrap();
        assert_eq!(normalized.sort_keys, vec![SortKey::ascending("sn")]);
    }

    #[test]
    fn test_bad_template_filter_is_bad_request() {
        let normalizer = normalizer_from(json!({
            "queries": {"q": {"queryFilter": "mail eq ${email}"}}
        }));
        // unquoted substitution yields an unparseable filter
        let request = QueryRequest::new()
            .with_query_id("q")
            .with_parameter("email", "not a literal");
        assert!(matches!(
            normalizer.normalize(&request),
            Err(RepoError::BadRequest { .. })
        ));
    }
}
