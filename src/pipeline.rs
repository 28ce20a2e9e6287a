use crate::config::{EnrichConfig, PipelineSettings};
use crate::enrich::analysis::{AnalysisInput, AnalysisOutcome, RetryPolicy, analyze};
use crate::enrich::dimensions::{DimensionMatch, extract_dimensions};
use crate::enrich::merge::{MergeInputs, merge};
use crate::enrich::models::{CatalogRecord, EnrichmentOutcome, EnrichmentStatus, ImageRef};
use crate::enrich::sanitize::sanitize_description;
use crate::enrich::score::{ScoreSignals, confidence_score};
use crate::enrich::seo::{SeoOutcome, SeoRequest, generate};
use crate::enrich::vision::{VisionOutcome, analyze_images};
use crate::http::build_client;
use crate::llm::{ChatCompletion, OpenAiClient};
use crate::metrics;
use crate::models::{EnrichRequest, EnrichResponse, StageReport};
use crate::supabase::{CatalogStore, SupabaseClient};
use chrono::Utc;
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{info, warn};

/// Images read from the store per product; only the first two reach the
/// vision service.
pub const MAX_LOADED_IMAGES: usize = 3;

#[derive(Clone)]
pub struct Pipeline {
    store: Option<Arc<dyn CatalogStore>>,
    text: Option<Arc<dyn ChatCompletion>>,
    vision: Option<Arc<dyn ChatCompletion>>,
    settings: Arc<PipelineSettings>,
}

impl Pipeline {
    pub fn from_config(config: &EnrichConfig) -> Self {
        let http = build_client(&config.http);
        let store = config.store.as_ref().map(|credentials| {
            Arc::new(SupabaseClient::new(credentials, http.clone())) as Arc<dyn CatalogStore>
        });
        let text = config.text.as_ref().map(|credentials| {
            Arc::new(OpenAiClient::new(
                http.clone(),
                &credentials.base_url,
                &credentials.api_key,
            )) as Arc<dyn ChatCompletion>
        });
        let vision = config.vision.as_ref().map(|credentials| {
            Arc::new(OpenAiClient::new(
                http.clone(),
                &credentials.base_url,
                &credentials.api_key,
            )) as Arc<dyn ChatCompletion>
        });
        Self::with_services(store, text, vision, config.pipeline.clone())
    }

    pub fn with_services(
        store: Option<Arc<dyn CatalogStore>>,
        text: Option<Arc<dyn ChatCompletion>>,
        vision: Option<Arc<dyn ChatCompletion>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            text,
            vision,
            settings: Arc::new(settings),
        }
    }

    /// Both the catalog store and the text service are required; vision is not.
    fn guard(&self) -> Result<(Arc<dyn CatalogStore>, Arc<dyn ChatCompletion>), PipelineError> {
        let store = self.store.clone().ok_or_else(|| {
            PipelineError::configuration("config_check", "catalog store credentials are not set")
        })?;
        let text = self.text.clone().ok_or_else(|| {
            PipelineError::configuration("config_check", "text service credentials are not set")
        })?;
        Ok((store, text))
    }

    pub async fn run(&self, request: EnrichRequest) -> Result<EnrichResponse, PipelineError> {
        let product_id = request.product_id.trim().to_string();
        if product_id.is_empty() {
            return Err(PipelineError::invalid_input(
                "validate_input",
                "product_id must not be empty",
            ));
        }
        info!(target = "enrich.pipeline", product_id = %product_id, dry_run = request.dry_run, "enrichment_started");

        let mut stages = Vec::new();

        let (store, text) = self
            .capture_stage("config_check", &mut stages, async {
                let services = self.guard()?;
                let output = json!({ "vision_enabled": self.vision.is_some() });
                Ok(StageOutcome::new(services, output))
            })
            .await?;

        let (record, images) = self
            .capture_stage("load_product", &mut stages, async {
                let record = store
                    .fetch_product(&product_id)
                    .await
                    .map_err(|err| PipelineError::persistence("load_product", err.to_string()))?
                    .ok_or_else(|| {
                        PipelineError::not_found(
                            "load_product",
                            format!("no product with id `{product_id}`"),
                        )
                    })?;
                let (images, images_degraded) =
                    match store.fetch_images(&product_id, MAX_LOADED_IMAGES).await {
                        Ok(images) => (images, false),
                        Err(err) => {
                            warn!(target = "enrich.store", product_id = %product_id, error = %err, "image_load_failed");
                            metrics::stage_degraded("load_product", "image_load_failed");
                            (Vec::new(), true)
                        }
                    };
                // Read and write are not coordinated across runs; the record id
                // on both ends makes overlapping runs visible in logs.
                info!(target = "enrich.store", product_id = %product_id, image_count = images.len(), "product_loaded");
                let output = json!({
                    "title": record.title(),
                    "image_count": images.len(),
                    "images_degraded": images_degraded,
                    "previous_status": record.enrichment_status,
                });
                Ok(StageOutcome::new((record, images), output))
            })
            .await?;

        let prepared = self
            .capture_stage("prepare_text", &mut stages, async {
                let description = sanitize_description(record.description());
                let dimensions = extract_dimensions(record.title(), &description);
                let output = json!({
                    "description_chars": description.chars().count(),
                    "dimensions": dimensions,
                });
                Ok(StageOutcome::new(
                    PreparedText {
                        description,
                        dimensions,
                    },
                    output,
                ))
            })
            .await?;

        let retry = RetryPolicy {
            max_attempts: self.settings.text_attempts.max(1),
            backoff_unit: self.settings.retry_backoff,
        };
        let analysis = self
            .capture_stage("text_analysis", &mut stages, async {
                let input = AnalysisInput {
                    title: record.title(),
                    description: &prepared.description,
                    product_type: record.product_type(),
                    vendor: record.vendor(),
                };
                let outcome = analyze(&*text, &self.settings.text_model, &input, retry).await;
                if outcome.degraded {
                    warn!(target = "enrich.pipeline", product_id = %product_id, attempts = outcome.attempts, "text_analysis_degraded");
                    metrics::stage_degraded("text_analysis", "fallback_defaults");
                }
                let output = json!({
                    "attempts": outcome.attempts,
                    "degraded": outcome.degraded,
                    "category": outcome.analysis.category,
                    "keywords": outcome.analysis.keywords.len(),
                });
                Ok(StageOutcome::new(outcome, output))
            })
            .await?;

        let seo_request = seo_request_for(&record, &prepared, &analysis);
        let (vision_outcome, seo) = self
            .fan_out(&mut stages, &text, &seo_request, &images)
            .await;
        let vision = vision_outcome.into_analysis();

        let status = if request.dry_run {
            EnrichmentStatus::Preview
        } else {
            EnrichmentStatus::Enriched
        };
        let mut outcome = self
            .capture_stage("merge", &mut stages, async {
                let merged = merge(
                    &MergeInputs {
                        record: &record,
                        analysis: &analysis.analysis,
                        vision: &vision,
                        seo: &seo.content,
                        regex_dimensions: prepared.dimensions.as_ref(),
                    },
                    status,
                    Utc::now(),
                );
                let output = json!({
                    "category": merged.category,
                    "color": merged.color,
                    "material": merged.material,
                    "tags": merged.tags,
                });
                Ok(StageOutcome::new(merged, output))
            })
            .await?;

        let score = self
            .capture_stage("score", &mut stages, async {
                let signals = ScoreSignals::collect(
                    &analysis,
                    outcome.dimensions_text.is_some(),
                    &vision,
                    images.len(),
                );
                let score = confidence_score(&signals);
                let output = json!({ "confidence_score": score, "signals": signals });
                Ok(StageOutcome::new(score, output))
            })
            .await?;
        outcome.confidence_score = score;

        if !request.dry_run {
            self.capture_stage("database_update", &mut stages, async {
                store
                    .update_enrichment(&product_id, &outcome)
                    .await
                    .map_err(|err| PipelineError::persistence("database_update", err.to_string()))?;
                info!(target = "enrich.store", product_id = %product_id, "enrichment_written");
                Ok(StageOutcome::new((), json!({ "status": outcome.enrichment_status })))
            })
            .await?;
        }

        info!(
            target = "enrich.pipeline",
            product_id = %product_id,
            confidence_score = outcome.confidence_score,
            status = ?outcome.enrichment_status,
            "enrichment_completed"
        );
        Ok(into_response(product_id, outcome, stages))
    }

    /// Vision and SEO run on their own tasks and are always both awaited.
    /// A branch that errors or panics contributes its empty/default output.
    /// Both tasks are aborted if this future is dropped before they finish,
    /// which is what happens when the deadline policy abandons an attempt.
    async fn fan_out(
        &self,
        stages: &mut Vec<StageReport>,
        text: &Arc<dyn ChatCompletion>,
        seo_request: &SeoRequest,
        images: &[ImageRef],
    ) -> (VisionOutcome, SeoOutcome) {
        let started = Instant::now();
        let seo_fallback = SeoOutcome {
            content: seo_request.fallback(),
            generated: false,
        };

        let vision_task = {
            let vision = self.vision.clone();
            let model = self.settings.vision_model.clone();
            let images = images.to_vec();
            tokio::spawn(async move {
                let started = Instant::now();
                let outcome = analyze_images(vision.as_deref(), &model, &images).await;
                (outcome, started.elapsed().as_millis())
            })
        };
        let seo_task = {
            let text = text.clone();
            let model = self.settings.text_model.clone();
            let seo_request = seo_request.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let outcome = generate(&*text, &model, &seo_request).await;
                (outcome, started.elapsed().as_millis())
            })
        };

        let _vision_guard = AbortOnDrop(vision_task.abort_handle());
        let _seo_guard = AbortOnDrop(seo_task.abort_handle());
        let (vision_joined, seo_joined) = tokio::join!(vision_task, seo_task);

        let (vision, vision_ms) = vision_joined.unwrap_or_else(|err| {
            (
                VisionOutcome::Degraded {
                    reason: format!("vision task aborted: {err}"),
                },
                started.elapsed().as_millis(),
            )
        });
        if let VisionOutcome::Degraded { reason } = &vision {
            warn!(target = "enrich.pipeline", reason = %reason, "vision_analysis_degraded");
            metrics::stage_degraded("vision_analysis", reason);
        }
        record_stage(
            stages,
            "vision_analysis",
            vision_ms,
            serde_json::to_value(&vision).unwrap_or(Value::Null),
        );

        let (seo, seo_ms) = match seo_joined {
            Ok(joined) => joined,
            Err(err) => {
                warn!(target = "enrich.pipeline", error = %err, "seo_task_aborted");
                (seo_fallback, started.elapsed().as_millis())
            }
        };
        if !seo.generated {
            warn!(target = "enrich.pipeline", "seo_content_degraded");
            metrics::stage_degraded("seo_content", "fallback_title");
        }
        record_stage(
            stages,
            "seo_content",
            seo_ms,
            json!({
                "generated": seo.generated,
                "title": seo.content.title,
                "description_chars": seo.content.description.chars().count(),
            }),
        );

        (vision, seo)
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        record_stage(stages, name, started.elapsed().as_millis(), outcome.output);
        Ok(outcome.value)
    }
}

fn record_stage(stages: &mut Vec<StageReport>, name: &'static str, elapsed_ms: u128, output: Value) {
    metrics::stage_elapsed(name, elapsed_ms);
    stages.push(StageReport::new(name, elapsed_ms, output));
}

struct PreparedText {
    description: String,
    dimensions: Option<DimensionMatch>,
}

/// SEO generation is seeded with the text analysis, never with vision output.
fn seo_request_for(
    record: &CatalogRecord,
    prepared: &PreparedText,
    analysis: &AnalysisOutcome,
) -> SeoRequest {
    SeoRequest {
        title: record.title().to_string(),
        description: prepared.description.clone(),
        category: analysis
            .analysis
            .category
            .clone()
            .or_else(|| record.product_type().map(str::to_string))
            .unwrap_or_else(|| "uncategorized".into()),
        material: analysis.analysis.material.clone(),
        style: analysis.analysis.style.clone(),
        vendor: record.vendor().map(str::to_string),
    }
}

fn into_response(
    product_id: String,
    outcome: EnrichmentOutcome,
    stages: Vec<StageReport>,
) -> EnrichResponse {
    EnrichResponse {
        success: true,
        product_id,
        category: outcome.category,
        material: outcome.material,
        color: outcome.color,
        dimensions: outcome.dimensions_text,
        dimension_source: outcome.dimensions_source,
        confidence_score: outcome.confidence_score,
        status: outcome.enrichment_status,
        enriched_at: outcome.enriched_at,
        stages,
    }
}

#[derive(Debug, Error)]
#[error("phase `{phase}` failed: {message}")]
pub struct PipelineError {
    phase: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    Configuration,
    InvalidInput,
    NotFound,
    Persistence,
    Timeout,
    Internal,
}

impl PipelineErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Persistence => "persistence",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

impl PipelineError {
    fn with_kind(kind: PipelineErrorKind, phase: &'static str, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            kind,
        }
    }

    pub fn configuration(phase: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(PipelineErrorKind::Configuration, phase, message)
    }

    pub fn invalid_input(phase: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(PipelineErrorKind::InvalidInput, phase, message)
    }

    pub fn not_found(phase: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(PipelineErrorKind::NotFound, phase, message)
    }

    pub fn persistence(phase: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(PipelineErrorKind::Persistence, phase, message)
    }

    pub fn timeout(phase: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(PipelineErrorKind::Timeout, phase, message)
    }

    pub fn internal(phase: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(PipelineErrorKind::Internal, phase, message)
    }

    pub fn phase(&self) -> &'static str {
        self.phase
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
