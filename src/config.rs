use std::time::Duration;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct StoreCredentials {
    pub base_url: String,
    pub service_key: String,
}

#[derive(Debug, Clone)]
pub struct ServiceCredentials {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Knobs the pipeline reads on every run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub text_model: String,
    pub vision_model: String,
    pub text_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            text_model: DEFAULT_MODEL.into(),
            vision_model: DEFAULT_MODEL.into(),
            text_attempts: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Environment snapshot taken at start-up.
///
/// Credentials stay optional here; the pipeline's guard turns a missing
/// required credential into a configuration error on each invocation.
#[derive(Debug, Clone, Default)]
pub struct EnrichConfig {
    pub store: Option<StoreCredentials>,
    pub text: Option<ServiceCredentials>,
    pub vision: Option<ServiceCredentials>,
    pub http: HttpSettings,
    pub pipeline: PipelineSettings,
    pub deadline: Duration,
    pub deadline_retries: u32,
    pub queue_capacity: usize,
    /// Finished jobs kept for status lookups; older ones are evicted first.
    pub job_history: usize,
}

impl EnrichConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let parse_u64 = |key: &str| get(key).and_then(|value| value.parse::<u64>().ok());

        let store = match (
            get("SUPABASE_URL"),
            get("SUPABASE_SERVICE_ROLE_KEY")
                .or_else(|| get("SUPABASE_SERVICE_KEY"))
                .or_else(|| get("SUPABASE_KEY")),
        ) {
            (Some(base_url), Some(service_key)) => Some(StoreCredentials {
                base_url: base_url.trim_end_matches('/').to_string(),
                service_key,
            }),
            _ => None,
        };

        let text_base = get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into());
        let text = get("OPENAI_API_KEY").map(|api_key| ServiceCredentials {
            base_url: text_base.clone(),
            api_key,
        });
        let vision = get("VISION_API_KEY").map(|api_key| ServiceCredentials {
            base_url: get("VISION_BASE_URL").unwrap_or_else(|| text_base.clone()),
            api_key,
        });

        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            text_model: get("TEXT_MODEL").unwrap_or(defaults.text_model),
            vision_model: get("VISION_MODEL").unwrap_or(defaults.vision_model),
            text_attempts: defaults.text_attempts,
            retry_backoff: parse_u64("TEXT_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
        };

        let http_defaults = HttpSettings::default();
        let http = HttpSettings {
            timeout: parse_u64("HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(http_defaults.timeout),
            connect_timeout: parse_u64("HTTP_CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(http_defaults.connect_timeout),
        };

        Self {
            store,
            text,
            vision,
            http,
            pipeline,
            deadline: parse_u64("ENRICH_DEADLINE_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(120)),
            deadline_retries: parse_u64("ENRICH_DEADLINE_RETRIES")
                .map(|n| n as u32)
                .unwrap_or(1),
            queue_capacity: parse_u64("QUEUE_CAPACITY")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(64),
            job_history: parse_u64("JOB_HISTORY")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(1000),
        }
    }
}
