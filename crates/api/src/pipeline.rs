use catalog::{ContextStore, ImageLocator, SpecCatalog};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use vision::{AnalysisRequest, AnalysisResponse, ModelError, MultimodalModel};

use crate::error::AnalysisError;
use crate::metrics::{Metrics, TimedOperation};
use crate::retry::RetryPolicy;

/// Successful analysis plus the diagnostics reported alongside it.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub response: AnalysisResponse,
    pub model: String,
    pub fingerprint: String,
    pub latency: Duration,
}

/// Runs one request end to end: catalog, image, contexts, prompt, model.
pub struct Analyzer {
    catalog: Arc<SpecCatalog>,
    contexts: ContextStore,
    images: ImageLocator,
    model: Arc<dyn MultimodalModel>,
    retry: RetryPolicy,
    model_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl Analyzer {
    pub fn new(
        catalog: Arc<SpecCatalog>,
        contexts: ContextStore,
        model: Arc<dyn MultimodalModel>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            catalog,
            contexts,
            images: ImageLocator::default(),
            model,
            retry: RetryPolicy::default(),
            model_timeout: Duration::from_secs(60),
            metrics,
        }
    }

    pub fn with_image_locator(mut self, images: ImageLocator) -> Self {
        self.images = images;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_model_timeout(mut self, model_timeout: Duration) -> Self {
        self.model_timeout = model_timeout;
        self
    }

    pub fn catalog(&self) -> &SpecCatalog {
        &self.catalog
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, AnalysisError> {
        let timer = TimedOperation::start();
        request.validate()?;

        let spec = self.catalog.get(request.sku.trim())?;
        let image = self.images.locate(spec)?;
        let contexts = self.contexts.fetch_all(&request.context_ids).await?;
        tracing::debug!(
            image = %image.uri,
            contexts = contexts.len(),
            "Inputs resolved"
        );

        let payload = vision::compose(spec, &contexts, &request.question, &image);

        let model = self.model.as_ref();
        let payload_ref = &payload;
        let limit = self.model_timeout;
        let model_timer = TimedOperation::start();
        let raw = self
            .retry
            .retry(
                "model.generate",
                || async move {
                    match timeout(limit, model.generate(payload_ref)).await {
                        Ok(result) => result,
                        Err(_) => Err(ModelError::Timeout(limit)),
                    }
                },
                ModelError::is_transient,
            )
            .await;
        self.metrics.record_model_call(model_timer.elapsed());

        let response = vision::parse_reply(&raw?)?;

        Ok(Analysis {
            response,
            model: self.model.name().to_string(),
            fingerprint: payload.fingerprint,
            latency: timer.elapsed(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use catalog::{LocalStore, ObjectStore};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vision::ComposedPayload;

    pub const CATALOG_CSV: &str = "\
sku,material,color,image_gcs_uri
SH-001,leather,brown,gs://alara-bucket/images/SH-001.jpg
SH-002,canvas,white,
";

    pub const BRAND_RULES: &str = r#"{
  "brand_voice": "confident, plain",
  "rules": [{"id": "brand_rule_X", "text": "Never claim orthopedic benefits", "mandatory": true}]
}"#;

    /// Replays canned replies in order, repeating the last one.
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, ModelError>>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn replying(text: &str) -> Arc<Self> {
            Self::new(vec![Ok(text.to_string())])
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MultimodalModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _payload: &ComposedPayload) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                match replies.front().unwrap() {
                    Ok(text) => Ok(text.clone()),
                    Err(e) => Err(clone_error(e)),
                }
            }
        }
    }

    fn clone_error(e: &ModelError) -> ModelError {
        match e {
            ModelError::Upstream { message, transient } => ModelError::Upstream {
                message: message.clone(),
                transient: *transient,
            },
            ModelError::Timeout(d) => ModelError::Timeout(*d),
            ModelError::InvalidReply { message } => ModelError::invalid_reply(message.clone()),
        }
    }

    /// Never answers; every call hangs until the caller gives up.
    pub struct StalledModel {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl MultimodalModel for StalledModel {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn generate(&self, _payload: &ComposedPayload) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    /// Bucket laid out on disk with the spec catalog and one brand rules document.
    pub fn fixture_store() -> (tempfile::TempDir, Arc<dyn ObjectStore>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(catalog::SPEC_CATALOG_KEY), CATALOG_CSV).unwrap();
        std::fs::create_dir_all(dir.path().join("context")).unwrap();
        std::fs::write(
            dir.path().join("context/brand_rules_shoes_v1.json"),
            BRAND_RULES,
        )
        .unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalStore::new(dir.path()));
        (dir, store)
    }

    pub async fn analyzer_with(model: Arc<dyn MultimodalModel>) -> (tempfile::TempDir, Analyzer) {
        let (dir, store) = fixture_store();
        let catalog = catalog::load_catalog(&store, catalog::SPEC_CATALOG_KEY)
            .await
            .unwrap();
        let analyzer = Analyzer::new(
            Arc::new(catalog),
            ContextStore::new(store),
            model,
            Metrics::new(),
        )
        .with_retry(RetryPolicy::new(2, 1, 2));
        (dir, analyzer)
    }

    fn request(sku: &str, context_ids: &[&str]) -> AnalysisRequest {
        AnalysisRequest {
            sku: sku.to_string(),
            question: "Is this compliant with brand rule X?".to_string(),
            context_ids: context_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    const YES_REPLY: &str =
        r#"{"answer":"yes","attributes":{},"compliance":{"brand_rule_X":true}}"#;

    #[tokio::test]
    async fn returns_model_object_verbatim() {
        let model = ScriptedModel::replying(YES_REPLY);
        let (_dir, analyzer) = analyzer_with(model.clone()).await;

        let analysis = analyzer
            .analyze(&request("SH-001", &["brand_rules_shoes_v1"]))
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&analysis.response).unwrap(),
            json!({"answer": "yes", "attributes": {}, "compliance": {"brand_rule_X": true}})
        );
        assert_eq!(analysis.model, "scripted");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_sku_never_reaches_model() {
        let model = ScriptedModel::replying(YES_REPLY);
        let (_dir, analyzer) = analyzer_with(model.clone()).await;

        let err = analyzer
            .analyze(&request("SH-404", &["brand_rules_shoes_v1"]))
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::NotFound(_)));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn missing_context_never_reaches_model() {
        let model = ScriptedModel::replying(YES_REPLY);
        let (_dir, analyzer) = analyzer_with(model.clone()).await;

        let err = analyzer
            .analyze(&request("SH-001", &["brand_rules_shoes_v1", "policy_v404"]))
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::NotFound(_)));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn product_without_image_is_not_found() {
        let model = ScriptedModel::replying(YES_REPLY);
        let (_dir, analyzer) = analyzer_with(model.clone()).await;

        let err = analyzer.analyze(&request("SH-002", &[])).await.unwrap_err();

        assert!(matches!(err, AnalysisError::NotFound(_)));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let model = ScriptedModel::replying(YES_REPLY);
        let (_dir, analyzer) = analyzer_with(model.clone()).await;
        let mut req = request("SH-001", &[]);
        req.question = " ".to_string();

        let err = analyzer.analyze(&req).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }

    #[tokio::test]
    async fn non_json_reply_is_invalid_reply() {
        let model = ScriptedModel::replying("Sorry, I can't help with that.");
        let (_dir, analyzer) = analyzer_with(model.clone()).await;

        let err = analyzer.analyze(&request("SH-001", &[])).await.unwrap_err();

        assert!(matches!(err, AnalysisError::InvalidReply(_)));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::transient("503 overloaded")),
            Ok(YES_REPLY.to_string()),
        ]);
        let (_dir, analyzer) = analyzer_with(model.clone()).await;

        let analysis = analyzer.analyze(&request("SH-001", &[])).await.unwrap();

        assert_eq!(analysis.response.answer, "yes");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn persistent_outage_is_upstream_unavailable() {
        let model = ScriptedModel::new(vec![Err(ModelError::transient("connection refused"))]);
        let (_dir, analyzer) = analyzer_with(model.clone()).await;

        let err = analyzer.analyze(&request("SH-001", &[])).await.unwrap_err();

        assert!(matches!(err, AnalysisError::UpstreamUnavailable(_)));
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let model = ScriptedModel::new(vec![Err(ModelError::permanent("403 forbidden"))]);
        let (_dir, analyzer) = analyzer_with(model.clone()).await;

        let err = analyzer.analyze(&request("SH-001", &[])).await.unwrap_err();

        assert!(matches!(err, AnalysisError::UpstreamUnavailable(_)));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_model_times_out_on_every_attempt() {
        let model = Arc::new(StalledModel {
            calls: AtomicUsize::new(0),
        });
        let (_dir, analyzer) = analyzer_with(model.clone()).await;
        let analyzer = analyzer.with_model_timeout(Duration::from_millis(50));

        let err = analyzer.analyze(&request("SH-001", &[])).await.unwrap_err();

        match err {
            AnalysisError::UpstreamUnavailable(message) => assert!(message.contains("timed out")),
            other => panic!("expected upstream_unavailable, got {:?}", other),
        }
        // One attempt plus two retries.
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn same_request_same_fingerprint() {
        let model = ScriptedModel::replying(YES_REPLY);
        let (_dir, analyzer) = analyzer_with(model).await;
        let req = request("SH-001", &["brand_rules_shoes_v1"]);

        let first = analyzer.analyze(&req).await.unwrap();
        let second = analyzer.analyze(&req).await.unwrap();

        assert_eq!(first.fingerprint, second.fingerprint);
    }
}
