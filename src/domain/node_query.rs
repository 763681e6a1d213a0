//! One (source, node) query: interpolate, fetch, extract, decide.
//!
//! Returns `Ok(None)` for "do not touch this node's property" and
//! `Ok(Some(prop))` for "write this". The write itself happens in the
//! fan-out executor so storage access stays centralized.

use super::data_source::{HttpSource, MissingNodeBehavior};
use super::error::NodeQueryError;
use super::http_fetch::{FetchOutcome, HttpFetcher};
use super::interpolate::Interpolator;
use super::json_select::{self, render_scalar};
use super::node::{NodeInfo, NodeProperty, Parameter};

pub async fn query_node(
    source_id: &str,
    http: &HttpSource,
    fetcher: &HttpFetcher,
    node: &NodeInfo,
    policy_server: &NodeInfo,
    parameters: &[Parameter],
) -> Result<Option<NodeProperty>, NodeQueryError> {
    let interpolator = Interpolator::new(node, policy_server, parameters);

    let url = interpolator
        .expand(&http.url)
        .map_err(NodeQueryError::Interpolation)?;
    let path = interpolator
        .expand(&http.path)
        .map_err(NodeQueryError::Interpolation)?;
    let headers = interpolator
        .expand_pairs(&http.headers)
        .map_err(NodeQueryError::Interpolation)?;
    let params = interpolator
        .expand_pairs(&http.params)
        .map_err(NodeQueryError::Interpolation)?;

    let outcome = fetcher.fetch(http.method, &url, &headers, &params).await;

    let value = match outcome {
        FetchOutcome::Success(body) => {
            let matches = json_select::from_path(&path, &body)?;
            // First match wins; an empty selection clears the property.
            matches.into_iter().next().unwrap_or_default()
        }
        FetchOutcome::NotFound => match &http.missing_node_behavior {
            MissingNodeBehavior::Delete => String::new(),
            MissingNodeBehavior::DefaultValue(v) => render_scalar(v),
            MissingNodeBehavior::NoChange => return Ok(None),
        },
        FetchOutcome::HttpError { code, body } => {
            return Err(NodeQueryError::Http { code, body });
        }
        FetchOutcome::TransportError(reason) => {
            return Err(NodeQueryError::Transport(reason));
        }
    };

    Ok(Some(NodeProperty::owned_by_us(source_id, value)))
}
