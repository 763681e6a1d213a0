//! Data source descriptor — what to fetch, how to extract, when to run.
//!
//! The in-memory model is what the engine consumes; the wire form (used by
//! the repository and the admin API) is the JSON schema in `wire` below.
//! Serialization is symmetric: everything written can be read back.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A named descriptor of an external JSON endpoint plus extraction and
/// scheduling policy. `id` doubles as the node property name it populates.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    /// Hard upper bound on a full fleet-wide refresh.
    pub update_timeout: Duration,
    pub run_param: RunParam,
    pub source_type: DataSourceType,
}

impl DataSource {
    /// The HTTP descriptor. Today `HTTP` is the only variant; the sum type
    /// stays so new source kinds slot in without reshaping callers.
    pub fn http(&self) -> &HttpSource {
        match &self.source_type {
            DataSourceType::Http(h) => h,
        }
    }
}

/// Which events fire this source, and its periodic schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParam {
    pub on_generation: bool,
    pub on_new_node: bool,
    pub schedule: Schedule,
}

/// The period is recorded in both variants so scheduling can be switched
/// back on without losing the configured value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Schedule {
    Scheduled(Duration),
    NoSchedule(Duration),
}

impl Schedule {
    pub fn period(&self) -> Duration {
        match self {
            Schedule::Scheduled(p) | Schedule::NoSchedule(p) => *p,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, Schedule::Scheduled(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataSourceType {
    Http(HttpSource),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// How many HTTP calls one fan-out issues.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestMode {
    /// One call per node.
    ByNode,
    /// One call total; the JSON array response is split per node by
    /// `attribute`. Parsed and persisted, not yet executed (the executor
    /// falls back to per-node semantics).
    AllNodes { path: String, attribute: String },
}

/// Policy applied when the endpoint replies 404 for a node.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingNodeBehavior {
    /// Clear the property (empty-string write).
    Delete,
    /// Leave the property untouched.
    NoChange,
    /// Write this value instead.
    DefaultValue(serde_json::Value),
}

/// The `type.parameters` block: endpoint, extraction, and request shape.
/// `url`, `path`, header names/values, and param names/values are all
/// templated and expanded per node.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSource {
    pub url: String,
    pub path: String,
    pub method: HttpMethod,
    pub check_ssl: bool,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    /// Applied as both connect and read timeout of each request.
    pub request_timeout: Duration,
    pub request_mode: RequestMode,
    pub missing_node_behavior: MissingNodeBehavior,
}

// ── Wire schema ────────────────────────────────────────────
//
// Mirror structs matching the persisted JSON exactly. Conversions to the
// model validate what serde's shape checks cannot (e.g. `defaultValue`
// requires `value`, `allNodes` requires `path` and `attribute`).

mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    pub struct DataSourceWire {
        pub name: String,
        pub id: String,
        pub description: String,
        pub enabled: bool,
        #[serde(rename = "updateTimeout")]
        pub update_timeout: u64,
        #[serde(rename = "runParameters")]
        pub run_parameters: RunParametersWire,
        #[serde(rename = "type")]
        pub source_type: SourceTypeWire,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RunParametersWire {
        #[serde(rename = "onGeneration")]
        pub on_generation: bool,
        #[serde(rename = "onNewNode")]
        pub on_new_node: bool,
        pub schedule: ScheduleWire,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ScheduleWire {
        #[serde(rename = "type")]
        pub kind: String,
        pub duration: u64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SourceTypeWire {
        pub name: String,
        pub parameters: HttpParametersWire,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct HttpParametersWire {
        pub url: String,
        pub path: String,
        #[serde(rename = "requestMethod")]
        pub request_method: String,
        #[serde(rename = "checkSsl")]
        pub check_ssl: bool,
        #[serde(rename = "requestTimeout")]
        pub request_timeout: u64,
        pub headers: Vec<NamedValueWire>,
        pub params: Vec<NamedValueWire>,
        #[serde(rename = "requestMode")]
        pub request_mode: RequestModeWire,
        #[serde(rename = "onMissing", skip_serializing_if = "Option::is_none")]
        pub on_missing: Option<OnMissingWire>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct NamedValueWire {
        pub name: String,
        pub value: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct RequestModeWire {
        pub name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub attribute: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct OnMissingWire {
        pub name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub value: Option<serde_json::Value>,
    }
}

impl From<&DataSource> for wire::DataSourceWire {
    fn from(ds: &DataSource) -> Self {
        let DataSourceType::Http(http) = &ds.source_type;
        let (schedule_kind, period) = match ds.run_param.schedule {
            Schedule::Scheduled(p) => ("scheduled", p),
            Schedule::NoSchedule(p) => ("notscheduled", p),
        };
        let request_mode = match &http.request_mode {
            RequestMode::ByNode => wire::RequestModeWire {
                name: "byNode".to_string(),
                path: None,
                attribute: None,
            },
            RequestMode::AllNodes { path, attribute } => wire::RequestModeWire {
                name: "allNodes".to_string(),
                path: Some(path.clone()),
                attribute: Some(attribute.clone()),
            },
        };
        let on_missing = match &http.missing_node_behavior {
            MissingNodeBehavior::Delete => wire::OnMissingWire {
                name: "delete".to_string(),
                value: None,
            },
            MissingNodeBehavior::NoChange => wire::OnMissingWire {
                name: "noChange".to_string(),
                value: None,
            },
            MissingNodeBehavior::DefaultValue(v) => wire::OnMissingWire {
                name: "defaultValue".to_string(),
                value: Some(v.clone()),
            },
        };
        let named = |pairs: &[(String, String)]| -> Vec<wire::NamedValueWire> {
            pairs
                .iter()
                .map(|(name, value)| wire::NamedValueWire {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect()
        };

        wire::DataSourceWire {
            name: ds.name.clone(),
            id: ds.id.clone(),
            description: ds.description.clone(),
            enabled: ds.enabled,
            update_timeout: ds.update_timeout.as_secs(),
            run_parameters: wire::RunParametersWire {
                on_generation: ds.run_param.on_generation,
                on_new_node: ds.run_param.on_new_node,
                schedule: wire::ScheduleWire {
                    kind: schedule_kind.to_string(),
                    duration: period.as_secs(),
                },
            },
            source_type: wire::SourceTypeWire {
                name: "HTTP".to_string(),
                parameters: wire::HttpParametersWire {
                    url: http.url.clone(),
                    path: http.path.clone(),
                    request_method: match http.method {
                        HttpMethod::Get => "GET".to_string(),
                        HttpMethod::Post => "POST".to_string(),
                    },
                    check_ssl: http.check_ssl,
                    request_timeout: http.request_timeout.as_secs(),
                    headers: named(&http.headers),
                    params: named(&http.params),
                    request_mode,
                    on_missing: Some(on_missing),
                },
            },
        }
    }
}

impl TryFrom<wire::DataSourceWire> for DataSource {
    type Error = String;

    fn try_from(w: wire::DataSourceWire) -> Result<Self, Self::Error> {
        if w.source_type.name != "HTTP" {
            return Err(format!("unknown data source type '{}'", w.source_type.name));
        }
        let p = w.source_type.parameters;

        let schedule = match w.run_parameters.schedule.kind.as_str() {
            "scheduled" => Schedule::Scheduled(Duration::from_secs(w.run_parameters.schedule.duration)),
            "notscheduled" => {
                Schedule::NoSchedule(Duration::from_secs(w.run_parameters.schedule.duration))
            }
            other => return Err(format!("unknown schedule type '{other}'")),
        };

        let method = match p.request_method.as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            other => return Err(format!("unknown request method '{other}'")),
        };

        let request_mode = match p.request_mode.name.as_str() {
            "byNode" => RequestMode::ByNode,
            "allNodes" => RequestMode::AllNodes {
                path: p
                    .request_mode
                    .path
                    .ok_or("request mode 'allNodes' requires 'path'")?,
                attribute: p
                    .request_mode
                    .attribute
                    .ok_or("request mode 'allNodes' requires 'attribute'")?,
            },
            other => return Err(format!("unknown request mode '{other}'")),
        };

        // Historical descriptors predate `onMissing`; they behaved as delete.
        let missing_node_behavior = match p.on_missing {
            None => MissingNodeBehavior::Delete,
            Some(m) => match m.name.as_str() {
                "delete" => MissingNodeBehavior::Delete,
                "noChange" => MissingNodeBehavior::NoChange,
                "defaultValue" => MissingNodeBehavior::DefaultValue(
                    m.value.ok_or("missing node behavior 'defaultValue' requires 'value'")?,
                ),
                other => return Err(format!("unknown missing node behavior '{other}'")),
            },
        };

        let pairs = |items: Vec<wire::NamedValueWire>| -> Vec<(String, String)> {
            items.into_iter().map(|nv| (nv.name, nv.value)).collect()
        };

        Ok(DataSource {
            id: w.id,
            name: w.name,
            description: w.description,
            enabled: w.enabled,
            update_timeout: Duration::from_secs(w.update_timeout),
            run_param: RunParam {
                on_generation: w.run_parameters.on_generation,
                on_new_node: w.run_parameters.on_new_node,
                schedule,
            },
            source_type: DataSourceType::Http(HttpSource {
                url: p.url,
                path: p.path,
                method,
                check_ssl: p.check_ssl,
                headers: pairs(p.headers),
                params: pairs(p.params),
                request_timeout: Duration::from_secs(p.request_timeout),
                request_mode,
                missing_node_behavior,
            }),
        })
    }
}

impl Serialize for DataSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        wire::DataSourceWire::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DataSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let w = wire::DataSourceWire::deserialize(deserializer)?;
        DataSource::try_from(w).map_err(serde::de::Error::custom)
    }
}
