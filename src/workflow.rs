use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{CacheEntry, CacheStats, CachedTranslation, ResultCache};
use crate::cancel::{CancelToken, CancellationRegistry};
use crate::completion::{CompletionPool, CompletionService, CompletionServiceFactory};
use crate::config::Config;
use crate::context::{ContextBuilder, TranslationContext};
use crate::error::{Result, CaytError};
use crate::language::{primary_code, LanguagePair};
use crate::source::{FragmentExtractor, LocalCaptionSource, SourceType, WhisperCppRecognizer};
use crate::subtitle::{full_text, merge_duplicate_fragments, Fragment};
use crate::translate::{merge, LocalizationRefiner, TranslatedSegment, TranslationEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// State of one translation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationJob {
    pub item_id: String,
    pub task_id: String,
    pub title: String,
    pub source_language: String,
    pub target_language: String,
    pub source_type: SourceType,
    pub context: TranslationContext,
    pub segments: Vec<TranslatedSegment>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    /// Served from the result cache
    pub cached: bool,
}

impl TranslationJob {
    fn new(request: &TranslationRequest, task_id: String) -> Self {
        Self {
            item_id: request.item_id.clone(),
            task_id,
            title: request.title.clone().unwrap_or_else(|| request.item_id.clone()),
            source_language: request.languages.source.clone(),
            target_language: request.languages.target.clone(),
            source_type: request.source_type,
            context: TranslationContext::default(),
            segments: Vec::new(),
            status: JobStatus::Pending,
            error_message: None,
            cached: false,
        }
    }

    fn from_cache(task_id: String, entry: CacheEntry) -> Self {
        let payload = entry.payload;
        Self {
            item_id: entry.item_id,
            task_id,
            title: payload.title,
            source_language: payload.source_language,
            target_language: payload.target_language,
            source_type: payload.source_type,
            context: payload.context,
            segments: payload.segments,
            status: JobStatus::Completed,
            error_message: None,
            cached: true,
        }
    }

    /// Move to a terminal state. Only the first call has an effect.
    fn finish(&mut self, status: JobStatus, error_message: Option<String>) {
        if self.status.is_terminal() {
            warn!(
                "Job {} already {:?}, ignoring transition to {:?}",
                self.task_id, self.status, status
            );
            return;
        }
        self.status = status;
        self.error_message = error_message;
    }

    fn to_cached(&self) -> CachedTranslation {
        CachedTranslation {
            title: self.title.clone(),
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            source_type: self.source_type,
            context: self.context.clone(),
            segments: self.segments.clone(),
        }
    }
}

/// Input of [`Workflow::request_translation`]
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub item_id: String,
    pub fragments: Vec<Fragment>,
    pub languages: LanguagePair,
    pub use_context_analysis: bool,
    /// Ignore a cached result
    pub force_refresh: bool,
    pub refine: bool,
    pub title: Option<String>,
    pub source_type: SourceType,
    /// Caller-chosen task id; generated when absent
    pub task_id: Option<String>,
}

/// Options of [`Workflow::translate_item`]
#[derive(Debug, Clone)]
pub struct ItemOptions {
    /// Caption language to look for, or `auto` to let speech recognition detect it
    pub source_language: String,
    pub target_language: String,
    pub use_context_analysis: bool,
    pub force_refresh: bool,
    pub force_speech: bool,
    pub refine: bool,
}

impl ItemOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_language: config.translate.source_language.clone(),
            target_language: config.translate.target_language.clone(),
            use_context_analysis: config.translate.use_context_analysis,
            force_refresh: false,
            force_speech: false,
            refine: config.refine.enabled,
        }
    }
}

/// Clears the in-flight marker and the cancellation entry of a job when dropped
struct InFlightGuard<'a> {
    cache: &'a ResultCache,
    registry: &'a CancellationRegistry,
    item_id: String,
    task_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.unregister(&self.task_id, &self.item_id);
        self.cache.set_in_progress(&self.item_id, false);
    }
}

/// Service context shared by every request
pub struct Workflow {
    config: Config,
    pool: CompletionPool,
    cache: ResultCache,
    registry: CancellationRegistry,
    context_builder: ContextBuilder,
    engine: TranslationEngine,
    refiner: LocalizationRefiner,
    extractor: FragmentExtractor,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let service = CompletionServiceFactory::create_default(config.completion.clone())?;
        let extractor = FragmentExtractor::new(
            Arc::new(LocalCaptionSource::new(config.source.caption_dir.clone())),
            Some(Arc::new(WhisperCppRecognizer::new(config.transcriber.clone()))),
            config.source.enable_speech_fallback,
        );
        Ok(Self::with_services(config, service, extractor))
    }

    pub fn with_services(
        config: Config,
        service: Arc<dyn CompletionService>,
        extractor: FragmentExtractor,
    ) -> Self {
        let pool = CompletionPool::new(service, config.completion.pool_size);
        info!("Completion pool ready with {} workers", pool.size());

        Self {
            cache: ResultCache::from_config(&config.cache),
            registry: CancellationRegistry::new(),
            context_builder: ContextBuilder::new(pool.clone()),
            engine: TranslationEngine::new(pool.clone(), config.translate.clone()),
            refiner: LocalizationRefiner::new(pool.clone(), config.refine.clone()),
            extractor,
            pool,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Request with the configured defaults for `item_id`
    pub fn default_request(&self, item_id: impl Into<String>, fragments: Vec<Fragment>) -> TranslationRequest {
        TranslationRequest {
            item_id: item_id.into(),
            fragments,
            languages: LanguagePair::new(
                self.config.translate.source_language.clone(),
                self.config.translate.target_language.clone(),
            ),
            use_context_analysis: self.config.translate.use_context_analysis,
            force_refresh: false,
            refine: self.config.refine.enabled,
            title: None,
            source_type: SourceType::Provided,
            task_id: None,
        }
    }

    /// Translate the fragments of one item.
    ///
    /// A cached result for the same target language is returned at once
    /// unless `force_refresh` is set. Fails with
    /// [`CaytError::DuplicateInFlight`] when the item is already being
    /// processed and with [`CaytError::Unreachable`] when the completion
    /// service does not answer. Anything that goes wrong after that is
    /// reported through the job status.
    pub async fn request_translation(&self, request: TranslationRequest) -> Result<TranslationJob> {
        let task_id = request.task_id.clone().unwrap_or_else(new_task_id);

        if !request.force_refresh {
            if let Some(job) = self.cached_job(&request.item_id, &request.languages.target, &task_id) {
                return Ok(job);
            }
        }

        let (cancel, _guard) = self.begin(&request.item_id, &task_id)?;
        self.ensure_reachable().await?;
        Ok(self.run_job(request, task_id, &cancel).await)
    }

    /// Extract fragments for `item_ref` through the source collaborators and
    /// translate them. The item is marked in flight before extraction starts.
    pub async fn translate_item(&self, item_ref: &str, options: ItemOptions) -> Result<TranslationJob> {
        let task_id = new_task_id();

        if !options.force_refresh {
            if let Some(job) = self.cached_job(item_ref, &options.target_language, &task_id) {
                return Ok(job);
            }
        }

        let (cancel, _guard) = self.begin(item_ref, &task_id)?;
        self.ensure_reachable().await?;

        let transcript = self
            .extractor
            .extract(item_ref, &options.source_language, options.force_speech)
            .await?;
        info!(
            "Extracted {} fragments for {} ({}, {})",
            transcript.fragments.len(), item_ref, transcript.language, transcript.source_type.as_str()
        );

        let title = (!transcript.title.is_empty()).then_some(transcript.title);
        let request = TranslationRequest {
            item_id: transcript.item_id,
            fragments: transcript.fragments,
            languages: LanguagePair::new(transcript.language, options.target_language),
            use_context_analysis: options.use_context_analysis,
            force_refresh: options.force_refresh,
            refine: options.refine,
            title,
            source_type: transcript.source_type,
            task_id: Some(task_id.clone()),
        };
        Ok(self.run_job(request, task_id, &cancel).await)
    }

    /// Cached job for `item_id` when it was translated into `target`
    fn cached_job(&self, item_id: &str, target: &str, task_id: &str) -> Option<TranslationJob> {
        let entry = self.cache.get(item_id)?;
        if primary_code(&entry.payload.target_language) != primary_code(target) {
            info!(
                "Cached translation of {} is in {}, not {}",
                item_id, entry.payload.target_language, target
            );
            return None;
        }
        info!("Cache hit for {}", item_id);
        Some(TranslationJob::from_cache(task_id.to_string(), entry))
    }

    /// Take the in-flight marker of `item_id` and register the job for
    /// cancellation. Both are released when the guard drops.
    fn begin(&self, item_id: &str, task_id: &str) -> Result<(CancelToken, InFlightGuard<'_>)> {
        if !self.cache.try_begin(item_id) {
            warn!("Item {} is already being translated", item_id);
            return Err(CaytError::DuplicateInFlight(item_id.to_string()));
        }

        let cancel = match self.registry.register(task_id, item_id) {
            Ok(cancel) => cancel,
            Err(e) => {
                self.cache.set_in_progress(item_id, false);
                return Err(e);
            }
        };

        let guard = InFlightGuard {
            cache: &self.cache,
            registry: &self.registry,
            item_id: item_id.to_string(),
            task_id: task_id.to_string(),
        };
        Ok((cancel, guard))
    }

    async fn ensure_reachable(&self) -> Result<()> {
        if self.pool.check_reachable().await {
            Ok(())
        } else {
            Err(CaytError::Unreachable(format!(
                "no answer from {}", self.config.completion.endpoint
            )))
        }
    }

    /// Run the stages of a job whose in-flight marker is held by the caller
    async fn run_job(&self, request: TranslationRequest, task_id: String, cancel: &CancelToken) -> TranslationJob {
        let mut job = TranslationJob::new(&request, task_id);
        job.status = JobStatus::Running;
        info!(
            "Translating {} ({} fragments, {} -> {}, task {})",
            job.item_id, request.fragments.len(), job.source_language, job.target_language, job.task_id
        );

        match self.run_stages(&request, &mut job, cancel).await {
            Ok(status) => job.finish(status, None),
            Err(e) => {
                warn!("Translation of {} failed: {}", job.item_id, e);
                job.finish(JobStatus::Failed, Some(e.to_string()));
            }
        }

        match job.status {
            JobStatus::Completed => {
                self.cache.set(&job.item_id, job.to_cached());
                info!("Translation of {} completed: {} segments cached", job.item_id, job.segments.len());
            }
            JobStatus::Cancelled => {
                info!("Translation of {} cancelled after {} segments", job.item_id, job.segments.len());
            }
            _ => {}
        }

        job
    }

    /// Context, merge, translate and refine. Returns the terminal status.
    async fn run_stages(
        &self,
        request: &TranslationRequest,
        job: &mut TranslationJob,
        cancel: &CancelToken,
    ) -> Result<JobStatus> {
        let fragments = merge_duplicate_fragments(request.fragments.clone());
        if fragments.is_empty() {
            info!("No fragments for {}, nothing to translate", job.item_id);
            return Ok(JobStatus::Completed);
        }
        if cancel.is_cancelled() {
            return Ok(JobStatus::Cancelled);
        }

        job.context = self
            .context_builder
            .build_context(&full_text(&fragments), request.use_context_analysis)
            .await;
        job.context.restrict_glossary(&request.languages);
        if cancel.is_cancelled() {
            return Ok(JobStatus::Cancelled);
        }

        let sentences = merge(&fragments);
        info!("Merged {} fragments into {} sentences", fragments.len(), sentences.len());

        let translated = self
            .engine
            .translate(&sentences, &job.context, &request.languages, &fragments, cancel)
            .await?;
        job.segments = translated.items;
        if translated.cancelled {
            return Ok(JobStatus::Cancelled);
        }

        if request.refine {
            let refined = self.refiner.refine(&job.segments, &request.languages, cancel).await;
            if refined.cancelled {
                return Ok(JobStatus::Cancelled);
            }
            job.segments = refined.items.into_iter().map(TranslatedSegment::from).collect();
        }

        Ok(JobStatus::Completed)
    }

    /// Flag the running job matching `task_id` or `item_id`
    pub fn cancel(&self, task_id: Option<&str>, item_id: Option<&str>) -> bool {
        self.registry.cancel(task_id, item_id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop the cached result of `item_id`, or every result when `None`.
    /// Returns the number of entries removed.
    pub fn invalidate(&self, item_id: Option<&str>) -> usize {
        let removed = match item_id {
            Some(item_id) => usize::from(self.cache.remove(item_id)),
            None => self.cache.clear(),
        };
        info!("Invalidated {} cache entries", removed);
        removed
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.pool.list_models().await
    }

    pub async fn check_connection(&self) -> bool {
        self.pool.check_reachable().await
    }
}

fn new_task_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionRequest, MockCompletionService};
    use crate::source::{Recognition, SpeechRecognizer};
    use assert_fs::prelude::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn config() -> Config {
        let mut config = Config::default();
        config.translate.retry_delay_ms = 1;
        config.translate.chunk_pause_ms = 1;
        config.translate.use_context_analysis = false;
        config.refine.retry_delay_ms = 1;
        config
    }

    fn extractor(dir: &std::path::Path) -> FragmentExtractor {
        FragmentExtractor::new(Arc::new(LocalCaptionSource::new(dir)), None, false)
    }

    fn workflow(mock: MockCompletionService) -> Workflow {
        Workflow::with_services(config(), Arc::new(mock), extractor(std::path::Path::new(".")))
    }

    fn reachable_mock() -> MockCompletionService {
        let mut mock = MockCompletionService::new();
        mock.expect_check_reachable().returning(|| true);
        mock
    }

    fn hello_world() -> Vec<Fragment> {
        vec![
            Fragment::new(0.0, 2.0, "Hello."),
            Fragment::new(2.0, 4.0, "World is big."),
        ]
    }

    /// Replies to every call with 30 numbered lines. The first call blocks
    /// until `release` is notified.
    struct GatedService {
        calls: AtomicUsize,
        started: Notify,
        release: Notify,
    }

    impl GatedService {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                started: Notify::new(),
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl CompletionService for GatedService {
        async fn complete(&self, _request: CompletionRequest) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.started.notify_one();
                self.release.notified().await;
            }
            Ok((1..=30).map(|n| format!("[{}] 문장 {}.", n, n)).collect::<Vec<_>>().join("\n"))
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn check_reachable(&self) -> bool {
            true
        }
    }

    fn gated_workflow(service: Arc<GatedService>) -> Arc<Workflow> {
        Arc::new(Workflow::with_services(config(), service, extractor(std::path::Path::new("."))))
    }

    #[tokio::test]
    async fn test_end_to_end_translation() {
        let mut mock = reachable_mock();
        mock.expect_complete()
            .times(1)
            .returning(|_| Ok("[1] 안녕.\n[2] 세상은 크다.".to_string()));
        let workflow = workflow(mock);

        let job = workflow
            .request_translation(workflow.default_request("greeting", hello_world()))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert!(!job.cached);
        assert_eq!(job.title, "greeting");
        assert_eq!(job.segments, vec![
            TranslatedSegment {
                start: 0.0,
                end: 2.0,
                source_text: "Hello.".to_string(),
                translated_text: "안녕.".to_string(),
            },
            TranslatedSegment {
                start: 2.0,
                end: 4.0,
                source_text: "World is big.".to_string(),
                translated_text: "세상은 크다.".to_string(),
            },
        ]);

        let stats = workflow.cache_stats();
        assert_eq!(stats.item_ids, vec!["greeting"]);
        assert_eq!(stats.in_progress_count, 0);
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let mut mock = reachable_mock();
        mock.expect_complete()
            .times(1)
            .returning(|_| Ok("[1] 안녕.\n[2] 세상은 크다.".to_string()));
        let workflow = workflow(mock);

        let first = workflow
            .request_translation(workflow.default_request("greeting", hello_world()))
            .await
            .unwrap();
        let second = workflow
            .request_translation(workflow.default_request("greeting", hello_world()))
            .await
            .unwrap();

        assert!(second.cached);
        assert_eq!(second.status, JobStatus::Completed);
        assert_eq!(second.segments, first.segments);
        assert_ne!(second.task_id, first.task_id);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let mut mock = reachable_mock();
        mock.expect_complete()
            .times(2)
            .returning(|_| Ok("[1] 안녕.\n[2] 세상은 크다.".to_string()));
        let workflow = workflow(mock);

        workflow
            .request_translation(workflow.default_request("greeting", hello_world()))
            .await
            .unwrap();
        let mut request = workflow.default_request("greeting", hello_world());
        request.force_refresh = true;
        let job = workflow.request_translation(request).await.unwrap();

        assert!(!job.cached);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_rejected() {
        let mut mock = MockCompletionService::new();
        mock.expect_check_reachable().returning(|| false);
        mock.expect_complete().never();
        let workflow = workflow(mock);

        let result = workflow
            .request_translation(workflow.default_request("greeting", hello_world()))
            .await;

        assert!(matches!(result, Err(CaytError::Unreachable(_))));
        assert_eq!(workflow.cache_stats().in_progress_count, 0);
        assert_eq!(workflow.registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_is_rejected() {
        let service = GatedService::new();
        let workflow = gated_workflow(service.clone());

        let running = {
            let workflow = Arc::clone(&workflow);
            tokio::spawn(async move {
                workflow
                    .request_translation(workflow.default_request("greeting", hello_world()))
                    .await
            })
        };
        service.started.notified().await;

        let second = workflow
            .request_translation(workflow.default_request("greeting", hello_world()))
            .await;
        assert!(matches!(second, Err(CaytError::DuplicateInFlight(_))));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        service.release.notify_one();
        let job = running.await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(workflow.cache_stats().in_progress_count, 0);
    }

    #[tokio::test]
    async fn test_cancel_by_item_keeps_finished_chunks_only() {
        let service = GatedService::new();
        let workflow = gated_workflow(service.clone());
        let fragments: Vec<Fragment> = (0..70)
            .map(|i| Fragment::new(i as f64, i as f64 + 1.0, format!("Sentence {}.", i)))
            .collect();

        let running = {
            let workflow = Arc::clone(&workflow);
            tokio::spawn(async move {
                workflow
                    .request_translation(workflow.default_request("long", fragments))
                    .await
            })
        };
        service.started.notified().await;

        assert!(workflow.cancel(None, Some("long")));
        service.release.notify_one();
        let job = running.await.unwrap().unwrap();

        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.segments.len(), 30);
        assert_eq!(job.segments[29].translated_text, "문장 30.");
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        let stats = workflow.cache_stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.in_progress_count, 0);
        assert_eq!(workflow.registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let workflow = workflow(MockCompletionService::new());
        assert!(!workflow.cancel(Some("nope"), None));
        assert!(!workflow.cancel(None, Some("nothing")));
    }

    #[tokio::test]
    async fn test_refine_replaces_first_pass_text() {
        let mut mock = reachable_mock();
        mock.expect_complete()
            .times(2)
            .returning(|request: CompletionRequest| {
                if request.system_prompt.is_some() {
                    Ok("#1: 안녕하세요.\n#2: 세상은 넓어요.".to_string())
                } else {
                    Ok("[1] 안녕.\n[2] 세상은 크다.".to_string())
                }
            });
        let workflow = workflow(mock);

        let mut request = workflow.default_request("greeting", hello_world());
        request.refine = true;
        let job = workflow.request_translation(request).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        let texts: Vec<&str> = job.segments.iter().map(|s| s.translated_text.as_str()).collect();
        assert_eq!(texts, vec!["안녕하세요.", "세상은 넓어요."]);
        assert_eq!(job.segments[1].start, 2.0);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let mut mock = reachable_mock();
        mock.expect_complete().returning(|_| Ok("[1] 안녕.\n[2] 세상은 크다.".to_string()));
        let workflow = workflow(mock);

        for item in ["a", "b", "c"] {
            workflow
                .request_translation(workflow.default_request(item, hello_world()))
                .await
                .unwrap();
        }

        assert_eq!(workflow.invalidate(Some("a")), 1);
        assert_eq!(workflow.invalidate(Some("a")), 0);
        assert_eq!(workflow.invalidate(None), 2);
        assert_eq!(workflow.cache_stats().count, 0);
    }

    #[tokio::test]
    async fn test_duplicate_fragments_are_merged_first() {
        let mut mock = reachable_mock();
        mock.expect_complete().times(1).returning(|_| Ok("[1] 안녕.".to_string()));
        let workflow = workflow(mock);
        let fragments = vec![
            Fragment::new(0.0, 1.0, "Hello."),
            Fragment::new(1.2, 2.0, "Hello."),
        ];

        let job = workflow
            .request_translation(workflow.default_request("echo", fragments))
            .await
            .unwrap();

        assert_eq!(job.segments.len(), 1);
        assert_eq!(job.segments[0].start, 0.0);
        assert_eq!(job.segments[0].end, 2.0);
    }

    #[tokio::test]
    async fn test_empty_input_completes_without_segments() {
        let mut mock = reachable_mock();
        mock.expect_complete().never();
        let workflow = workflow(mock);

        let job = workflow
            .request_translation(workflow.default_request("empty", Vec::new()))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error_message.is_none());
        assert!(job.segments.is_empty());
        assert_eq!(workflow.cache_stats().in_progress_count, 0);
    }

    #[tokio::test]
    async fn test_cached_result_for_other_target_is_a_miss() {
        let mut mock = reachable_mock();
        mock.expect_complete()
            .times(2)
            .returning(|request: CompletionRequest| {
                if request.user_prompt.contains("Write the translation in Japanese only.") {
                    Ok("[1] こんにちは。\n[2] 世界は広い。".to_string())
                } else {
                    Ok("[1] 안녕.\n[2] 세상은 크다.".to_string())
                }
            });
        let workflow = workflow(mock);

        let korean = workflow
            .request_translation(workflow.default_request("greeting", hello_world()))
            .await
            .unwrap();
        assert_eq!(korean.segments[0].translated_text, "안녕.");

        let mut request = workflow.default_request("greeting", hello_world());
        request.languages = LanguagePair::new("en", "ja");
        let japanese = workflow.request_translation(request.clone()).await.unwrap();

        assert!(!japanese.cached);
        assert_eq!(japanese.target_language, "ja");
        assert_eq!(japanese.segments[0].translated_text, "こんにちは。");

        let again = workflow.request_translation(request).await.unwrap();
        assert!(again.cached);
        assert_eq!(again.segments[1].translated_text, "世界は広い。");
    }

    #[tokio::test]
    async fn test_glossary_dropped_for_other_target() {
        let mut mock = reachable_mock();
        mock.expect_complete()
            .times(1)
            .returning(|_| Ok("[1] 関数がサーバーとデータベースのAPIを呼びます。".to_string()));
        let workflow = workflow(mock);

        let mut request = workflow.default_request(
            "it-talk",
            vec![Fragment::new(0.0, 3.0, "The function calls the server and the database api.")],
        );
        request.languages = LanguagePair::new("en", "ja");
        let job = workflow.request_translation(request).await.unwrap();

        assert_eq!(job.context.domain, "IT");
        assert!(job.context.glossary.is_empty());
    }

    #[tokio::test]
    async fn test_reused_task_id_releases_item_marker() {
        let service = GatedService::new();
        let workflow = gated_workflow(service.clone());

        let running = {
            let workflow = Arc::clone(&workflow);
            tokio::spawn(async move {
                let mut request = workflow.default_request("first", hello_world());
                request.task_id = Some("fixed".to_string());
                workflow.request_translation(request).await
            })
        };
        service.started.notified().await;

        let mut request = workflow.default_request("second", hello_world());
        request.task_id = Some("fixed".to_string());
        let result = workflow.request_translation(request).await;
        assert!(matches!(result, Err(CaytError::DuplicateInFlight(_))));
        assert_eq!(workflow.cache_stats().in_progress_count, 1);

        assert!(workflow.cancel(Some("fixed"), None));
        service.release.notify_one();
        let job = running.await.unwrap().unwrap();
        assert_eq!(job.item_id, "first");
        assert_eq!(workflow.cache_stats().in_progress_count, 0);
    }

    /// Recognizer whose first call blocks until `release` is notified
    struct GatedRecognizer {
        calls: AtomicUsize,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SpeechRecognizer for GatedRecognizer {
        async fn transcribe(&self, _audio: &std::path::Path, _language_hint: Option<&str>) -> Result<Recognition> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.started.notify_one();
                self.release.notified().await;
            }
            Ok(Recognition {
                fragments: hello_world(),
                language: "en".to_string(),
                confidence: 0.9,
            })
        }
    }

    #[tokio::test]
    async fn test_item_in_flight_during_extraction_is_rejected() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("talk.wav").touch().unwrap();

        let recognizer = Arc::new(GatedRecognizer {
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        });
        let mut mock = reachable_mock();
        mock.expect_complete()
            .times(1)
            .returning(|_| Ok("[1] 안녕.\n[2] 세상은 크다.".to_string()));
        let config = config();
        let options = ItemOptions::from_config(&config);
        let extractor = FragmentExtractor::new(
            Arc::new(LocalCaptionSource::new(dir.path())),
            Some(recognizer.clone()),
            true,
        );
        let workflow = Arc::new(Workflow::with_services(config, Arc::new(mock), extractor));

        let running = {
            let workflow = Arc::clone(&workflow);
            let options = options.clone();
            tokio::spawn(async move { workflow.translate_item("talk", options).await })
        };
        recognizer.started.notified().await;

        let second = workflow.translate_item("talk", options).await;
        assert!(matches!(second, Err(CaytError::DuplicateInFlight(_))));
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);

        recognizer.release.notify_one();
        let job = running.await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.source_type, SourceType::Speech);
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(workflow.cache_stats().in_progress_count, 0);
    }

    #[tokio::test]
    async fn test_failed_extraction_releases_item() {
        let dir = assert_fs::TempDir::new().unwrap();
        let mut mock = reachable_mock();
        mock.expect_complete().never();
        let config = config();
        let options = ItemOptions::from_config(&config);
        let workflow = Workflow::with_services(config, Arc::new(mock), extractor(dir.path()));

        let result = workflow.translate_item("missing", options).await;
        assert!(matches!(result, Err(CaytError::Extraction(_))));
        assert_eq!(workflow.cache_stats().in_progress_count, 0);
        assert_eq!(workflow.registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_translate_item_from_caption_directory() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("talk.en.vtt")
            .write_str("WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nHello.\n\n00:00:02.000 --> 00:00:04.000\nWorld is big.\n")
            .unwrap();

        let mut mock = reachable_mock();
        mock.expect_complete()
            .times(1)
            .returning(|_| Ok("[1] 안녕.\n[2] 세상은 크다.".to_string()));
        let config = config();
        let options = ItemOptions::from_config(&config);
        let workflow = Workflow::with_services(config, Arc::new(mock), extractor(dir.path()));

        let job = workflow.translate_item("talk", options.clone()).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.source_type, SourceType::Manual);
        assert_eq!(job.source_language, "en");
        assert_eq!(job.segments.len(), 2);

        let again = workflow.translate_item("talk", options).await.unwrap();
        assert!(again.cached);
    }
}
