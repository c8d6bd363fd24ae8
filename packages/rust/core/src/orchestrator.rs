//! Pipeline orchestration: extract → validate → transform → load, per kind.
//!
//! A run never fails as a whole. Each stage that cannot do its job degrades
//! to an empty payload, the run still reaches [`PipelineStage::Done`], and
//! the result carries an ingested count of 0 and a `degraded` status.

use std::collections::BTreeMap;
use std::sync::Arc;

use govdata_extract::{DataGovClient, Extraction};
use govdata_schema::validate;
use govdata_shared::{
    GovDataError, PipelineRunResult, RawRecord, RunStatus, SchemeKind, TransformedRecord,
};
use govdata_storage::Storage;
use govdata_transform::{TransformContext, transform};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::progress::ProgressReporter;
use crate::sample::sample_records;
use crate::stage::PipelineStage;

/// Resource id recorded in run history for seeded data.
const SAMPLE_RESOURCE_ID: &str = "sample";

/// Runs scheme pipelines against one source client and one store.
#[derive(Clone)]
pub struct Orchestrator {
    storage: Arc<Storage>,
    client: DataGovClient,
    ctx: Arc<TransformContext>,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(storage: Arc<Storage>, client: DataGovClient, ctx: TransformContext) -> Self {
        Self {
            storage,
            client,
            ctx: Arc::new(ctx),
            concurrency: 1,
        }
    }

    /// Maximum number of scheme pipelines [`run_all`](Self::run_all) runs at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Run one scheme end to end.
    pub async fn run_pipeline(
        &self,
        kind: SchemeKind,
        resource_id: &str,
        progress: &dyn ProgressReporter,
    ) -> PipelineRunResult {
        self.run_pipeline_with(kind, resource_id, &BTreeMap::new(), progress)
            .await
    }

    /// Like [`run_pipeline`](Self::run_pipeline), with extra query parameters
    /// for the fetch.
    #[instrument(skip_all, fields(kind = %kind, resource_id = %resource_id))]
    pub async fn run_pipeline_with(
        &self,
        kind: SchemeKind,
        resource_id: &str,
        params: &BTreeMap<String, String>,
        progress: &dyn ProgressReporter,
    ) -> PipelineRunResult {
        self.init_storage().await;
        let run_id = self.begin_run(kind, resource_id).await;
        self.run_source(kind, resource_id, params, run_id, progress)
            .await
    }

    /// Init → Done for a run whose history entry already exists.
    async fn run_source(
        &self,
        kind: SchemeKind,
        resource_id: &str,
        params: &BTreeMap<String, String>,
        run_id: Option<String>,
        progress: &dyn ProgressReporter,
    ) -> PipelineRunResult {
        enter(progress, kind, PipelineStage::Init, 0);
        let Extraction { records, failure } = self.client.extract(resource_id, params).await;
        enter(progress, kind, PipelineStage::Extracted, records.len());

        self.finish(kind, records, failure.as_ref(), run_id, progress)
            .await
    }

    /// Run every scheme in `mapping`, independently.
    ///
    /// One task per kind, at most `concurrency` at a time. A task that panics
    /// reports an ingested count of 0 for its own kind only.
    #[instrument(skip_all, fields(schemes = mapping.len(), concurrency = self.concurrency))]
    pub async fn run_all(
        &self,
        mapping: &BTreeMap<SchemeKind, String>,
        progress: Arc<dyn ProgressReporter>,
    ) -> BTreeMap<SchemeKind, PipelineRunResult> {
        self.init_storage().await;
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(mapping.len());

        for (&kind, resource_id) in mapping {
            // Opened here so a task that dies can still be closed below.
            let run_id = self.begin_run(kind, resource_id).await;
            let this = self.clone();
            let sem = semaphore.clone();
            let progress = progress.clone();
            let resource_id = resource_id.clone();
            let task_run_id = run_id.clone();

            let handle = tokio::spawn(async move {
                // The semaphore is never closed.
                let _permit = sem.acquire_owned().await.ok();
                this.run_source(
                    kind,
                    &resource_id,
                    &BTreeMap::new(),
                    task_run_id,
                    progress.as_ref(),
                )
                .await
            });
            handles.push((kind, run_id, handle));
        }

        let mut results = BTreeMap::new();
        for (kind, run_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(%kind, error = %e, "pipeline task failed");
                    let result = PipelineRunResult {
                        run_id,
                        ..PipelineRunResult::degraded(kind)
                    };
                    let error = format!("pipeline task failed: {e}");
                    self.record_result(&result, Some(&error)).await;
                    result
                }
            };
            results.insert(kind, result);
        }

        let ingested: usize = results.values().map(|r| r.ingested).sum();
        info!(
            ingested,
            degraded = results
                .values()
                .filter(|r| r.status == RunStatus::Degraded)
                .count(),
            "all pipelines finished"
        );
        results
    }

    /// Validate, transform and load records that were already extracted.
    #[instrument(skip_all, fields(kind = %kind, records = records.len()))]
    pub async fn ingest_records(
        &self,
        kind: SchemeKind,
        source: &str,
        records: Vec<RawRecord>,
        progress: &dyn ProgressReporter,
    ) -> PipelineRunResult {
        self.init_storage().await;
        let run_id = self.begin_run(kind, source).await;

        enter(progress, kind, PipelineStage::Init, 0);
        enter(progress, kind, PipelineStage::Extracted, records.len());

        self.finish(kind, records, None, run_id, progress).await
    }

    /// Load the deterministic sample set for every kind.
    pub async fn seed(
        &self,
        progress: &dyn ProgressReporter,
    ) -> BTreeMap<SchemeKind, PipelineRunResult> {
        let mut results = BTreeMap::new();
        for kind in SchemeKind::ALL {
            let result = self
                .ingest_records(kind, SAMPLE_RESOURCE_ID, sample_records(kind), progress)
                .await;
            results.insert(kind, result);
        }
        results
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Extracted → Done.
    async fn finish(
        &self,
        kind: SchemeKind,
        records: Vec<RawRecord>,
        extract_failure: Option<&GovDataError>,
        run_id: Option<String>,
        progress: &dyn ProgressReporter,
    ) -> PipelineRunResult {
        let extracted = records.len();

        let validated = validate(kind, &records);
        let validated_count = validated.len();
        enter(progress, kind, PipelineStage::Validated, validated_count);

        let transformed = transform(kind, validated, &self.ctx);
        enter(progress, kind, PipelineStage::Transformed, transformed.len());

        let (ingested, load_failure) = self.load(kind, &transformed).await;
        enter(progress, kind, PipelineStage::Loaded, ingested);

        let failure = extract_failure
            .map(ToString::to_string)
            .or_else(|| load_failure.map(|e| e.to_string()));
        let result = PipelineRunResult {
            kind,
            ingested,
            extracted,
            validated: validated_count,
            status: if failure.is_some() {
                RunStatus::Degraded
            } else {
                RunStatus::Completed
            },
            run_id,
        };

        self.record_result(&result, failure.as_deref()).await;

        enter(progress, kind, PipelineStage::Done, ingested);
        progress.finished(&result);
        info!(
            %kind,
            extracted,
            validated = validated_count,
            ingested,
            status = %result.status,
            "pipeline finished"
        );
        result
    }

    /// Persist one batch. Returns the committed row count (0 on rollback)
    /// and the failure, if any.
    async fn load(
        &self,
        kind: SchemeKind,
        records: &[TransformedRecord],
    ) -> (usize, Option<GovDataError>) {
        match self.storage.upsert_records(kind, records).await {
            Ok(rows) => (rows, None),
            Err(e) => {
                error!(%kind, records = records.len(), error = %e, "load failed, batch rolled back");
                (0, Some(e))
            }
        }
    }

    /// Write a run's final counts and status to the history table.
    async fn record_result(&self, result: &PipelineRunResult, error: Option<&str>) {
        let Some(run_id) = &result.run_id else {
            return;
        };
        if let Err(e) = self.storage.finish_run(run_id, result, error).await {
            warn!(kind = %result.kind, %run_id, error = %e, "failed to record run result");
        }
    }

    async fn init_storage(&self) {
        if let Err(e) = self.storage.init_schemes().await {
            warn!(error = %e, "failed to initialize scheme tables");
        }
    }

    async fn begin_run(&self, kind: SchemeKind, resource_id: &str) -> Option<String> {
        match self.storage.insert_run(kind, resource_id).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(%kind, error = %e, "failed to record run start");
                None
            }
        }
    }
}

/// Log a stage transition and forward it to the reporter.
fn enter(progress: &dyn ProgressReporter, kind: SchemeKind, stage: PipelineStage, count: usize) {
    debug!(%kind, %stage, count, "stage transition");
    progress.stage(kind, stage, count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use govdata_shared::FetchConfig;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;
    use url::Url;
    use uuid::Uuid;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn temp_db() -> PathBuf {
        std::env::temp_dir().join(format!("govdata_core_{}.db", Uuid::now_v7()))
    }

    async fn orchestrator(server_uri: &str) -> Orchestrator {
        orchestrator_at(server_uri, &temp_db()).await
    }

    async fn orchestrator_at(server_uri: &str, db: &Path) -> Orchestrator {
        let storage = Storage::open(db).await.expect("open test db");
        let client = DataGovClient::new(FetchConfig {
            base_url: Url::parse(&format!("{server_uri}/resource.json")).unwrap(),
            api_key: Some("k".into()),
            timeout: Duration::from_secs(5),
            retries: 1,
            retry_delay: Duration::ZERO,
            params: BTreeMap::new(),
        })
        .unwrap();
        Orchestrator::new(Arc::new(storage), client, TransformContext::default())
    }

    fn pmay_records(n: usize) -> serde_json::Value {
        let records: Vec<_> = (0..n)
            .map(|i| {
                json!({
                    "state_code": format!("S{i}"),
                    "state_name": format!("State {i}"),
                    "year": 2023,
                    "beneficiaries": 100,
                    "houses_completed": 50
                })
            })
            .collect();
        json!({ "records": records })
    }

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<(SchemeKind, PipelineStage)>>,
    }

    impl ProgressReporter for Recorder {
        fn stage(&self, kind: SchemeKind, stage: PipelineStage, _count: usize) {
            self.stages.lock().unwrap().push((kind, stage));
        }
        fn finished(&self, _result: &PipelineRunResult) {}
    }

    /// Panics as soon as an mnrega run starts.
    struct FailingMnrega;

    impl ProgressReporter for FailingMnrega {
        fn stage(&self, kind: SchemeKind, _stage: PipelineStage, _count: usize) {
            if kind == SchemeKind::Mnrega {
                panic!("reporter blew up");
            }
        }
        fn finished(&self, _result: &PipelineRunResult) {}
    }

    #[tokio::test]
    async fn run_all_isolates_a_failing_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("resource_id", "rid-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pmay_records(5)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("resource_id", "rid-2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let orch = orchestrator(&server.uri()).await.with_concurrency(2);
        let mapping = BTreeMap::from([
            (SchemeKind::Pmay, "rid-1".to_string()),
            (SchemeKind::Mnrega, "rid-2".to_string()),
        ]);

        let results = orch.run_all(&mapping, Arc::new(SilentProgress)).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[&SchemeKind::Pmay].ingested, 5);
        assert_eq!(results[&SchemeKind::Pmay].status, RunStatus::Completed);
        assert_eq!(results[&SchemeKind::Mnrega].ingested, 0);
        assert_eq!(results[&SchemeKind::Mnrega].status, RunStatus::Degraded);

        assert_eq!(orch.storage().count_rows(SchemeKind::Pmay).await.unwrap(), 5);
        assert_eq!(orch.storage().count_rows(SchemeKind::Mnrega).await.unwrap(), 0);

        let runs = orch.storage().list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.finished_at.is_some()));
    }

    #[tokio::test]
    async fn run_pipeline_walks_every_stage_on_empty_input() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": 1})))
            .mount(&server)
            .await;

        let orch = orchestrator(&server.uri()).await;
        let recorder = Recorder::default();
        let result = orch
            .run_pipeline(SchemeKind::Saubhagya, "rid-x", &recorder)
            .await;

        assert_eq!(result.ingested, 0);
        assert_eq!(result.status, RunStatus::Degraded);
        let stages: Vec<_> = recorder
            .stages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, s)| *s)
            .collect();
        assert_eq!(
            stages,
            [
                PipelineStage::Init,
                PipelineStage::Extracted,
                PipelineStage::Validated,
                PipelineStage::Transformed,
                PipelineStage::Loaded,
                PipelineStage::Done,
            ]
        );
    }

    #[tokio::test]
    async fn invalid_records_are_dropped_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"state_code": "MH", "state_name": "Maharashtra", "year": 2023, "job_cards": 10},
                {"state_name": "Nowhere", "year": 2023},
                {"state_code": "KA", "state_name": "Karnataka", "year": 1999}
            ])))
            .mount(&server)
            .await;

        let orch = orchestrator(&server.uri()).await;
        let result = orch
            .run_pipeline(SchemeKind::Mnrega, "rid", &SilentProgress)
            .await;

        assert_eq!(result.extracted, 3);
        assert_eq!(result.validated, 1);
        assert_eq!(result.ingested, 1);
        assert_eq!(result.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn rerunning_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pmay_records(3)))
            .mount(&server)
            .await;

        let orch = orchestrator(&server.uri()).await;
        for _ in 0..2 {
            let result = orch.run_pipeline(SchemeKind::Pmay, "rid", &SilentProgress).await;
            assert_eq!(result.ingested, 3);
        }
        assert_eq!(orch.storage().count_rows(SchemeKind::Pmay).await.unwrap(), 3);

        let row = orch
            .storage()
            .get_row(SchemeKind::Pmay, "S0", 2023)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            row.value("houses_per_beneficiary"),
            Some(govdata_shared::FieldValue::Float(0.5))
        );
    }

    #[tokio::test]
    async fn panicking_task_degrades_only_its_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pmay_records(2)))
            .mount(&server)
            .await;

        let orch = orchestrator(&server.uri()).await;
        let mapping = BTreeMap::from([
            (SchemeKind::Pmay, "rid-1".to_string()),
            (SchemeKind::Mnrega, "rid-2".to_string()),
        ]);

        let results = orch.run_all(&mapping, Arc::new(FailingMnrega)).await;
        assert_eq!(results[&SchemeKind::Pmay].ingested, 2);

        let mnrega = &results[&SchemeKind::Mnrega];
        assert_eq!(mnrega.ingested, 0);
        assert_eq!(mnrega.status, RunStatus::Degraded);
        assert!(mnrega.run_id.is_some());

        // The interrupted run is closed, not left looking in progress.
        let runs = orch.storage().list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        let run = runs
            .iter()
            .find(|r| r.kind == SchemeKind::Mnrega)
            .expect("mnrega run recorded");
        assert_eq!(Some(&run.id), mnrega.run_id.as_ref());
        assert_eq!(run.status, Some(RunStatus::Degraded));
        assert!(run.finished_at.is_some());
        assert!(run.error.as_deref().unwrap().contains("pipeline task failed"));
    }

    #[tokio::test]
    async fn rolled_back_load_degrades_and_records_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pmay_records(3)))
            .mount(&server)
            .await;

        let db = temp_db();
        let orch = orchestrator_at(&server.uri(), &db).await;
        orch.storage().init_schemes().await.unwrap();

        // A second handle on the same file installs a trigger that rejects
        // every insert into pmay.
        let raw = libsql::Builder::new_local(&db).build().await.unwrap();
        raw.connect()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_pmay BEFORE INSERT ON pmay
                 BEGIN SELECT RAISE(ABORT, 'insert rejected'); END;",
            )
            .await
            .unwrap();

        let result = orch.run_pipeline(SchemeKind::Pmay, "rid", &SilentProgress).await;

        assert_eq!(result.extracted, 3);
        assert_eq!(result.validated, 3);
        assert_eq!(result.ingested, 0);
        assert_eq!(result.status, RunStatus::Degraded);
        assert_eq!(orch.storage().count_rows(SchemeKind::Pmay).await.unwrap(), 0);

        let runs = orch.storage().list_runs(1).await.unwrap();
        assert_eq!(runs[0].status, Some(RunStatus::Degraded));
        assert_eq!(runs[0].ingested, 0);
        let error = runs[0].error.as_deref().expect("load error recorded");
        assert!(error.contains("insert rejected"), "{error}");
    }

    #[tokio::test]
    async fn seed_loads_every_kind() {
        let orch = orchestrator("http://127.0.0.1:9").await;
        let results = orch.seed(&SilentProgress).await;

        assert_eq!(results.len(), 4);
        for kind in SchemeKind::ALL {
            assert_eq!(results[&kind].ingested, 40, "{kind}");
            assert_eq!(orch.storage().count_rows(kind).await.unwrap(), 40);
        }

        // Seeding again overwrites rather than duplicates.
        orch.seed(&SilentProgress).await;
        assert_eq!(orch.storage().count_rows(SchemeKind::Pmay).await.unwrap(), 40);
    }
}
