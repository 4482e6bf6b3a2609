//! Metric source integrations
//!
//! Each [`Source`] lists its agent settings, its direct (agentless)
//! settings and the fields of a metric query. A `None` table means the
//! integration has no agent or no direct variant.

use super::fields::{Field, FieldKind};

pub struct Source {
    /// Terraform name, e.g. `splunk_observability`
    pub name: &'static str,
    /// JSON key in agent, direct and metric specs, e.g. `splunkObservability`
    pub json: &'static str,
    pub title: &'static str,
    pub agent: Option<&'static [Field]>,
    pub direct: Option<&'static [Field]>,
    pub metric: &'static [Field],
}

impl Source {
    pub fn has_agent(&self) -> bool {
        self.agent.is_some()
    }
}

const fn int(name: &'static str, json: &'static str) -> Field {
    Field::new(name, json, FieldKind::Int)
}

const fn number(name: &'static str, json: &'static str) -> Field {
    Field::new(name, json, FieldKind::Number)
}

const fn boolean(name: &'static str, json: &'static str) -> Field {
    Field::new(name, json, FieldKind::Bool)
}

const fn s(name: &'static str, json: &'static str) -> Field {
    Field::string(name, json)
}

const URL_ONLY: &[Field] = &[s("url", "url").required().describe("Base URL of the source API.")];
const NONE: &[Field] = &[];
const PROMQL: &[Field] = &[s("promql", "promql").required().describe("Prometheus query.")];
const QUERY: &[Field] = &[s("query", "query").required()];

const SERVICE_ACCOUNT_KEY: &[Field] = &[s("service_account_key", "serviceAccountKey")
    .secret()
    .describe("Service account key in JSON format.")];

const NAME_VALUE: &[Field] = &[s("name", "name").required(), s("value", "value").required()];

const AZURE_WORKSPACE: &[Field] = &[
    s("subscription_id", "subscriptionId").required(),
    s("resource_group", "resourceGroup").required(),
    s("workspace_id", "workspaceId").required(),
];

const INSTANA_GROUP_BY: &[Field] = &[
    s("tag", "tag").required(),
    s("tag_entity", "tagEntity").required(),
    s("tag_second_level_key", "tagSecondLevelKey"),
];

const INSTANA_INFRASTRUCTURE: &[Field] = &[
    s("metric_retrieval_method", "metricRetrievalMethod").required(),
    s("query", "query"),
    s("snapshot_id", "snapshotId"),
    s("metric_id", "metricId").required(),
    s("plugin_id", "pluginId").required(),
];

const INSTANA_APPLICATION: &[Field] = &[
    s("metric_id", "metricId").required(),
    s("aggregation", "aggregation").required(),
    Field::new("group_by", "groupBy", FieldKind::Block(INSTANA_GROUP_BY)).required(),
    s("api_query", "apiQuery").required(),
    boolean("include_internal", "includeInternal"),
    boolean("include_synthetic", "includeSynthetic"),
];

pub static SOURCES: &[Source] = &[
    Source {
        name: "amazon_prometheus",
        json: "amazonPrometheus",
        title: "Amazon Prometheus",
        agent: Some(&[
            s("url", "url").required(),
            s("region", "region").required(),
        ]),
        direct: None,
        metric: PROMQL,
    },
    Source {
        name: "appdynamics",
        json: "appDynamics",
        title: "AppDynamics",
        agent: Some(URL_ONLY),
        direct: Some(&[
            s("url", "url").required(),
            s("account_name", "accountName").required(),
            s("client_name", "clientName").required(),
            s("client_secret", "clientSecret").secret(),
        ]),
        metric: &[
            s("application_name", "applicationName").required(),
            s("metric_path", "metricPath").required(),
        ],
    },
    Source {
        name: "azure_monitor",
        json: "azureMonitor",
        title: "Azure Monitor",
        agent: Some(&[s("tenant_id", "tenantId").required()]),
        direct: Some(&[
            s("tenant_id", "tenantId").required(),
            s("client_id", "clientId").secret(),
            s("client_secret", "clientSecret").secret(),
        ]),
        metric: &[
            s("data_type", "dataType").required().describe("Either metrics or logs."),
            s("resource_id", "resourceId"),
            s("metric_namespace", "metricNamespace"),
            s("metric_name", "metricName"),
            s("aggregation", "aggregation"),
            s("kql_query", "kqlQuery"),
            Field::new("workspace", "workspace", FieldKind::Block(AZURE_WORKSPACE)),
            Field::new("dimensions", "dimensions", FieldKind::BlockList(NAME_VALUE)),
        ],
    },
    Source {
        name: "azure_prometheus",
        json: "azurePrometheus",
        title: "Azure Prometheus",
        agent: Some(&[
            s("url", "url").required(),
            s("tenant_id", "tenantId").required(),
        ]),
        direct: None,
        metric: PROMQL,
    },
    Source {
        name: "bigquery",
        json: "bigQuery",
        title: "BigQuery",
        agent: Some(NONE),
        direct: Some(SERVICE_ACCOUNT_KEY),
        metric: &[
            s("query", "query").required(),
            s("project_id", "projectId").required(),
            s("location", "location").required(),
        ],
    },
    Source {
        name: "cloudwatch",
        json: "cloudWatch",
        title: "Amazon CloudWatch",
        agent: Some(NONE),
        direct: Some(&[s("role_arn", "roleARN").secret()]),
        metric: &[
            s("region", "region"),
            s("namespace", "namespace"),
            s("metric_name", "metricName"),
            s("stat", "stat"),
            s("account_id", "accountId"),
            s("sql", "sql"),
            s("json", "json"),
            Field::new("dimensions", "dimensions", FieldKind::BlockList(NAME_VALUE)),
        ],
    },
    Source {
        name: "datadog",
        json: "datadog",
        title: "Datadog",
        agent: Some(&[s("site", "site").required()]),
        direct: Some(&[
            s("site", "site").required(),
            s("api_key", "apiKey").secret(),
            s("application_key", "applicationKey").secret(),
        ]),
        metric: QUERY,
    },
    Source {
        name: "dynatrace",
        json: "dynatrace",
        title: "Dynatrace",
        agent: Some(URL_ONLY),
        direct: Some(&[
            s("url", "url").required(),
            s("dynatrace_token", "dynatraceToken").secret(),
        ]),
        metric: &[s("metric_selector", "metricSelector").required()],
    },
    Source {
        name: "elasticsearch",
        json: "elasticsearch",
        title: "Elasticsearch",
        agent: Some(URL_ONLY),
        direct: None,
        metric: &[s("index", "index").required(), s("query", "query").required()],
    },
    Source {
        name: "gcm",
        json: "gcm",
        title: "Google Cloud Monitoring",
        agent: Some(NONE),
        direct: Some(SERVICE_ACCOUNT_KEY),
        metric: &[
            s("project_id", "projectId").required(),
            s("query", "query"),
            s("promql", "promql"),
        ],
    },
    Source {
        name: "generic",
        json: "generic",
        title: "Generic",
        agent: Some(NONE),
        direct: None,
        metric: QUERY,
    },
    Source {
        name: "grafana_loki",
        json: "grafanaLoki",
        title: "Grafana Loki",
        agent: Some(URL_ONLY),
        direct: None,
        metric: &[s("logql", "logql").required()],
    },
    Source {
        name: "graphite",
        json: "graphite",
        title: "Graphite",
        agent: Some(URL_ONLY),
        direct: None,
        metric: &[s("metric_path", "metricPath").required()],
    },
    Source {
        name: "honeycomb",
        json: "honeycomb",
        title: "Honeycomb",
        agent: None,
        direct: Some(&[s("api_key", "apiKey").secret()]),
        metric: &[
            s("calculation", "calculation").required(),
            s("attribute", "attribute"),
        ],
    },
    Source {
        name: "influxdb",
        json: "influxdb",
        title: "InfluxDB",
        agent: Some(URL_ONLY),
        direct: None,
        metric: QUERY,
    },
    Source {
        name: "instana",
        json: "instana",
        title: "Instana",
        agent: Some(URL_ONLY),
        direct: Some(&[s("url", "url").required(), s("api_token", "apiToken").secret()]),
        metric: &[
            s("metric_type", "metricType").required(),
            Field::new(
                "infrastructure",
                "infrastructure",
                FieldKind::Block(INSTANA_INFRASTRUCTURE),
            ),
            Field::new("application", "application", FieldKind::Block(INSTANA_APPLICATION)),
        ],
    },
    Source {
        name: "lightstep",
        json: "lightstep",
        title: "Lightstep",
        agent: Some(&[
            s("organization", "organization").required(),
            s("project", "project").required(),
        ]),
        direct: Some(&[
            s("lightstep_organization", "lightstepOrganization").required(),
            s("lightstep_project", "lightstepProject").required(),
            s("app_token", "appToken").secret(),
        ]),
        metric: &[
            s("stream_id", "streamId"),
            s("type_of_data", "typeOfData").required(),
            number("percentile", "percentile"),
            s("uql", "uql"),
        ],
    },
    Source {
        name: "logic_monitor",
        json: "logicMonitor",
        title: "LogicMonitor",
        agent: Some(&[s("account", "account").required()]),
        direct: Some(&[
            s("account", "account").required(),
            s("account_id", "accountId").secret(),
            s("access_key", "accessKey").secret(),
        ]),
        metric: &[
            s("query_type", "queryType").required(),
            int("device_data_source_instance_id", "deviceDataSourceInstanceId"),
            int("graph_id", "graphId"),
            s("website_id", "websiteId"),
            s("checkpoint_id", "checkpointId"),
            s("graph_name", "graphName"),
            s("line", "line").required(),
        ],
    },
    Source {
        name: "new_relic",
        json: "newRelic",
        title: "New Relic",
        agent: Some(&[int("account_id", "accountId").required()]),
        direct: Some(&[
            int("account_id", "accountId").required(),
            s("insights_query_key", "insightsQueryKey").secret(),
        ]),
        metric: &[s("nrql", "nrql").required()],
    },
    Source {
        name: "opentsdb",
        json: "opentsdb",
        title: "OpenTSDB",
        agent: Some(URL_ONLY),
        direct: None,
        metric: QUERY,
    },
    Source {
        name: "pingdom",
        json: "pingdom",
        title: "Pingdom",
        agent: Some(NONE),
        direct: Some(&[s("api_token", "apiToken").secret()]),
        metric: &[
            s("check_id", "checkId").required(),
            s("check_type", "checkType"),
            s("status", "status"),
        ],
    },
    Source {
        name: "prometheus",
        json: "prometheus",
        title: "Prometheus",
        agent: Some(URL_ONLY),
        direct: None,
        metric: PROMQL,
    },
    Source {
        name: "redshift",
        json: "redshift",
        title: "Amazon Redshift",
        agent: Some(NONE),
        direct: Some(&[
            s("secret_arn", "secretARN").secret(),
            s("role_arn", "roleARN").secret(),
        ]),
        metric: &[
            s("region", "region").required(),
            s("cluster_id", "clusterId").required(),
            s("database_name", "databaseName").required(),
            s("query", "query").required(),
        ],
    },
    Source {
        name: "splunk",
        json: "splunk",
        title: "Splunk",
        agent: Some(URL_ONLY),
        direct: Some(&[s("url", "url").required(), s("access_token", "accessToken").secret()]),
        metric: QUERY,
    },
    Source {
        name: "splunk_observability",
        json: "splunkObservability",
        title: "Splunk Observability",
        agent: Some(&[s("realm", "realm").required()]),
        direct: Some(&[
            s("realm", "realm").required(),
            s("access_token", "accessToken").secret(),
        ]),
        metric: &[s("program", "program").required()],
    },
    Source {
        name: "sumologic",
        json: "sumoLogic",
        title: "Sumo Logic",
        agent: Some(URL_ONLY),
        direct: Some(&[
            s("url", "url").required(),
            s("access_id", "accessId").secret(),
            s("access_key", "accessKey").secret(),
        ]),
        metric: &[
            s("type", "type").required(),
            s("query", "query").required(),
            s("rollup", "rollup"),
            s("quantization", "quantization"),
        ],
    },
    Source {
        name: "thousandeyes",
        json: "thousandEyes",
        title: "ThousandEyes",
        agent: Some(NONE),
        direct: Some(&[s("oauth_bearer_token", "oauthBearerToken").secret()]),
        metric: &[
            int("test_id", "testID").required(),
            s("test_type", "testType"),
        ],
    },
];

pub fn find(name: &str) -> Option<&'static Source> {
    SOURCES.iter().find(|source| source.name == name)
}

pub fn find_by_json(json: &str) -> Option<&'static Source> {
    SOURCES.iter().find(|source| source.json == json)
}

pub fn agent_sources() -> impl Iterator<Item = &'static Source> {
    SOURCES.iter().filter(|source| source.has_agent())
}

pub fn direct_sources() -> impl Iterator<Item = &'static Source> {
    SOURCES.iter().filter(|source| source.direct.is_some())
}
