//! `${…}` expansion of templated descriptor fields.
//!
//! One `Interpolator` is built per (source, node) pair and applied to the
//! url, the JSON path, and every header/param name and value. The token
//! vocabulary is closed; an unknown token fails that node's query instead
//! of leaking the literal `${…}` to the upstream service.
//!
//! Tokens: `${node.id}`, `${node.hostname}`, `${node.policy_server.id}`,
//! `${node.policy_server.hostname}`, `${node.properties[key]}`,
//! `${param[name]}`.

use std::collections::HashMap;

use super::json_select::render_scalar;
use super::node::{NodeInfo, Parameter};

pub struct Interpolator<'a> {
    node: &'a NodeInfo,
    policy_server: &'a NodeInfo,
    parameters: HashMap<&'a str, &'a Parameter>,
}

impl<'a> Interpolator<'a> {
    pub fn new(
        node: &'a NodeInfo,
        policy_server: &'a NodeInfo,
        parameters: &'a [Parameter],
    ) -> Self {
        Self {
            node,
            policy_server,
            parameters: parameters.iter().map(|p| (p.name.as_str(), p)).collect(),
        }
    }

    /// Expand every `${…}` token in `input`. Errors carry the offending
    /// token so the per-node failure message names it.
    pub fn expand(&self, input: &str) -> Result<String, String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| format!("unterminated token in '{input}'"))?;
            out.push_str(&self.resolve(&after[..end])?);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Expand a list of (name, value) pairs, both sides templated.
    pub fn expand_pairs(
        &self,
        pairs: &[(String, String)],
    ) -> Result<Vec<(String, String)>, String> {
        pairs
            .iter()
            .map(|(name, value)| Ok((self.expand(name)?, self.expand(value)?)))
            .collect()
    }

    fn resolve(&self, token: &str) -> Result<String, String> {
        match token.trim() {
            "node.id" => Ok(self.node.id.clone()),
            "node.hostname" => Ok(self.node.hostname.clone()),
            "node.policy_server.id" => Ok(self.policy_server.id.clone()),
            "node.policy_server.hostname" => Ok(self.policy_server.hostname.clone()),
            t => {
                if let Some(key) = bracket_arg(t, "node.properties") {
                    return self
                        .node
                        .properties
                        .get(key)
                        .map(render_scalar)
                        .ok_or_else(|| format!("node '{}' has no property '{key}'", self.node.id));
                }
                if let Some(name) = bracket_arg(t, "param") {
                    return self
                        .parameters
                        .get(name)
                        .map(|p| render_scalar(&p.value))
                        .ok_or_else(|| format!("unknown parameter '{name}'"));
                }
                Err(format!("unknown token '${{{t}}}'"))
            }
        }
    }
}

/// `prefix[arg]` → `arg`.
fn bracket_arg<'t>(token: &'t str, prefix: &str) -> Option<&'t str> {
    token
        .strip_prefix(prefix)?
        .strip_prefix('[')?
        .strip_suffix(']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node() -> NodeInfo {
        NodeInfo {
            id: "node1".to_string(),
            hostname: "web01.example.com".to_string(),
            policy_server_id: "root".to_string(),
            is_policy_server: false,
            properties: [("env".to_string(), json!("prod"))].into_iter().collect(),
        }
    }

    fn root() -> NodeInfo {
        NodeInfo {
            id: "root".to_string(),
            hostname: "policy.example.com".to_string(),
            policy_server_id: "root".to_string(),
            is_policy_server: true,
            properties: HashMap::new(),
        }
    }

    #[test]
    fn expands_node_and_policy_server_tokens() {
        let n = node();
        let ps = root();
        let it = Interpolator::new(&n, &ps, &[]);
        let got = it
            .expand("https://cmdb/${node.id}?fqdn=${node.hostname}&ps=${node.policy_server.id}")
            .unwrap();
        assert_eq!(got, "https://cmdb/node1?fqdn=web01.example.com&ps=root");
    }

    #[test]
    fn expands_properties_and_parameters() {
        let n = node();
        let ps = root();
        let params = vec![Parameter {
            name: "cmdb_token".to_string(),
            value: json!("s3cret"),
        }];
        let it = Interpolator::new(&n, &ps, &params);
        assert_eq!(it.expand("${node.properties[env]}").unwrap(), "prod");
        assert_eq!(it.expand("Bearer ${param[cmdb_token]}").unwrap(), "Bearer s3cret");
    }

    #[test]
    fn non_string_values_render_as_json() {
        let mut n = node();
        n.properties.insert("tags".to_string(), json!(["a", "b"]));
        let ps = root();
        let it = Interpolator::new(&n, &ps, &[]);
        assert_eq!(it.expand("${node.properties[tags]}").unwrap(), r#"["a","b"]"#);
    }

    #[test]
    fn unknown_token_fails() {
        let n = node();
        let ps = root();
        let it = Interpolator::new(&n, &ps, &[]);
        let err = it.expand("${node.nope}").unwrap_err();
        assert!(err.contains("${node.nope}"));
    }

    #[test]
    fn unterminated_token_fails() {
        let n = node();
        let ps = root();
        let it = Interpolator::new(&n, &ps, &[]);
        assert!(it.expand("${node.id").is_err());
    }

    #[test]
    fn plain_strings_pass_through() {
        let n = node();
        let ps = root();
        let it = Interpolator::new(&n, &ps, &[]);
        assert_eq!(it.expand("no tokens here").unwrap(), "no tokens here");
    }
}
