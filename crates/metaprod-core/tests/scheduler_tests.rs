//! Scheduler integration tests
//!
//! External programs are replaced by a scripted runner; ingestion,
//! inference and the pass gates run for real against an in-memory store.

use async_trait::async_trait;
use metaprod_core::config::PipelineConfig;
use metaprod_core::pipeline::{Pass, Scheduler, Status, Step, StepContext, StepOutcome, StepRunner};
use metaprod_core::settings::ProjectSettings;
use metaprod_core::store::{
    LedgerField, NewWorkItem, ProteinRow, Proteome, ReferenceProtein, Store, WorkItem,
};
use metaprod_core::{PipelineError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

const REPORT_HEADER: &str = "\tProtein(s)\tSequence\tModified Sequence\tVariable Modifications\tFixed Modifications\tSpectrum Title\tValidation\tPeak Area";

const REPORT_ROWS: [&str; 3] = [
    "1\tA1\tPEPTIDEK\tNH2-PEPTIDEK-COOH\t\t\ts1\tConfident\t",
    "2\tA1,A2\tGGHKR\tNH2-GGHKR-COOH\t\t\ts2\tConfident\t",
    "3\tA2\tLLAVK\tNH2-LLAVK-COOH\t\t\ts3\tDoubtful\t",
];

const UP1_FASTA: &str = ">tr|A1|Protein one OS=Bug one OX=1 PE=1 SV=1 UPId=UP1 PPId=UP1\nMKVLLAPEPTIDEK\n\
                         >tr|A2|Protein two OS=Bug one OX=1 PE=1 SV=1 UPId=UP1 PPId=UP1\nGGHKRLLAVK\n";

/// Stands in for the external programs. The scoring step writes a PSM
/// report so ingestion has something to read.
struct ScriptedRunner {
    config: PipelineConfig,
    /// Remaining failures per `filename:step`
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
    report_rows: usize,
    broken: bool,
}

impl ScriptedRunner {
    fn new(config: &PipelineConfig) -> Self {
        Self {
            config: config.clone(),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            report_rows: REPORT_ROWS.len(),
            broken: false,
        }
    }

    fn fail(self, key: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(key.to_string(), times);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, key: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == key).count()
    }

    fn write_report(&self, ctx: &StepContext<'_>, pass: Pass) {
        let path = self.config.psm_report(
            &ctx.item.project,
            &ctx.item.filename,
            pass,
            ctx.settings.multiplex,
        );
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut text = format!("{}\n", REPORT_HEADER);
        for row in REPORT_ROWS.iter().take(self.report_rows) {
            text.push_str(row);
            text.push('\n');
        }
        std::fs::write(path, text).unwrap();
    }
}

#[async_trait]
impl StepRunner for ScriptedRunner {
    async fn run(&self, ctx: StepContext<'_>) -> Result<StepOutcome> {
        let key = format!("{}:{}", ctx.item.filename, ctx.step);
        self.calls.lock().unwrap().push(key.clone());

        if self.broken {
            return Err(PipelineError::configuration("toolchain has no entry for this step"));
        }
        if let Some(remaining) = self.failures.lock().unwrap().get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(StepOutcome::failed(Duration::from_secs(1), "exit status 1"));
            }
        }
        if let Step::Score(pass) = ctx.step {
            self.write_report(&ctx, pass);
        }
        Ok(StepOutcome::success(Duration::from_secs(5)))
    }
}

struct Fixture {
    _dir: TempDir,
    config: PipelineConfig,
    store: Store,
}

impl Fixture {
    async fn new(settings: ProjectSettings) -> Self {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            data_folder: dir.path().join("data"),
            install_folder: dir.path().join("install"),
            fasta_folder: dir.path().join("fasta"),
            max_retries: 1,
            ..Default::default()
        };
        std::fs::create_dir_all(&config.fasta_folder).unwrap();
        std::fs::write(config.proteome_source("UP1"), UP1_FASTA).unwrap();

        let store = Store::open_in_memory().await.unwrap();
        store.create_project("soil", "integration").await.unwrap();
        store.save_settings("soil", &settings).await.unwrap();
        store
            .upsert_proteomes(&[Proteome {
                id: "UP1".to_string(),
                organism: "Bug one".to_string(),
                taxonomy_id: Some(1),
            }])
            .await
            .unwrap();
        store
            .upsert_reference_proteins(&[
                reference("A1", 14, "Protein one"),
                reference("A2", 10, "Protein two"),
            ])
            .await
            .unwrap();

        Self {
            _dir: dir,
            config,
            store,
        }
    }

    async fn add(&self, filename: &str, job: i64) -> WorkItem {
        self.store
            .insert_item(&NewWorkItem {
                project: "soil".to_string(),
                filename: filename.to_string(),
                raw_path: self
                    .config
                    .raw_dir("soil")
                    .join(format!("{}.raw", filename))
                    .display()
                    .to_string(),
                job,
                sample: None,
            })
            .await
            .unwrap()
    }

    async fn item(&self, id: i64) -> WorkItem {
        self.store.get_item(id).await.unwrap()
    }
}

fn reference(accession: &str, length: i64, description: &str) -> ReferenceProtein {
    ReferenceProtein {
        accession: accession.to_string(),
        proteome: "UP1".to_string(),
        length,
        description: description.to_string(),
        organism: "Bug one".to_string(),
        gene: None,
    }
}

#[tokio::test]
async fn test_two_partitions_run_to_finished() {
    let fx = Fixture::new(ProjectSettings::default()).await;
    let runner = ScriptedRunner::new(&fx.config);
    let a = fx.add("run01", 0).await;
    let b = fx.add("run02", 1).await;
    let scheduler = Scheduler::new(&fx.store, &fx.config, &runner);

    // job 0 finishes pass one and waits at the gate
    let first = scheduler.advance("soil", 0).await.unwrap();
    assert_eq!(first.succeeded, 6);
    assert_eq!(first.skipped, 2);
    assert_eq!(first.passes_completed, 0);
    assert_eq!(fx.item(a.id).await.status, Status::Pass1Done);
    assert_eq!(fx.item(b.id).await.status, Status::Added);

    // job 1 opens the pass-one gate, then waits at the pass-two gate
    let second = scheduler.advance("soil", 1).await.unwrap();
    assert_eq!(second.passes_completed, 1);
    assert_eq!(fx.item(a.id).await.status, Status::Search2);
    assert_eq!(fx.item(b.id).await.status, Status::Pass2Done);

    let generated = fx.config.item_proteome_fasta("soil", "run01");
    let text = std::fs::read_to_string(&generated).unwrap();
    assert_eq!(text.lines().filter(|l| l.starts_with('>')).count(), 2);
    assert!(fx.config.item_proteome_fasta("soil", "run02").exists());

    let third = scheduler.advance("soil", 0).await.unwrap();
    assert_eq!(third.passes_completed, 1);

    for id in [a.id, b.id] {
        let item = fx.item(id).await;
        assert_eq!(item.status, Status::ItemFinished);
        assert_eq!(item.error, 0);
        // convert, search and score of both passes at five seconds each
        assert_eq!(item.total_runtime, 25);

        let ledger = fx.store.ledger(id).await.unwrap();
        assert_eq!(ledger.get(LedgerField::Score(Pass::Proteome)), 5);
        assert_eq!(ledger.get(LedgerField::Quant(Pass::Profile)), 0);

        for pass in Pass::BOTH {
            let proteins = fx.store.proteins(id, pass).await.unwrap();
            let accessions: Vec<_> = proteins.iter().map(|p| p.accession.as_str()).collect();
            assert_eq!(accessions.len(), 2);
            assert!(accessions.contains(&"A1"));
            assert!(accessions.contains(&"A2"));
        }
    }

    let species = fx.store.species_summaries("soil", Pass::Proteome).await.unwrap();
    assert_eq!(species.len(), 1);
    assert_eq!(species[0].proteome, "UP1");

    assert_eq!(runner.count("run01:convert"), 1);
    assert_eq!(runner.count("run02:search_2"), 1);
}

#[tokio::test]
async fn test_retry_budget_freezes_item() {
    let fx = Fixture::new(ProjectSettings::default()).await;
    let runner = ScriptedRunner::new(&fx.config).fail("run01:score_1", 10);
    let item = fx.add("run01", 0).await;
    let scheduler = Scheduler::new(&fx.store, &fx.config, &runner);

    let summary = scheduler.advance("soil", 0).await.unwrap();
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.frozen, vec![item.id]);
    assert_eq!(runner.count("run01:score_1"), 2);

    let frozen = fx.item(item.id).await;
    assert_eq!(frozen.status, Status::Score1);
    assert_eq!(frozen.error, 2);

    // a frozen item is never picked again
    let idle = scheduler.advance("soil", 0).await.unwrap();
    assert_eq!(idle.steps(), 0);
    assert_eq!(runner.count("run01:score_1"), 2);

    // operator clears the counter and the tool recovers
    runner.failures.lock().unwrap().clear();
    fx.store.reset_item(item.id, false, true).await.unwrap();
    scheduler.advance("soil", 0).await.unwrap();
    assert_eq!(fx.item(item.id).await.status, Status::ItemFinished);
}

#[tokio::test]
async fn test_failure_then_success_resets_error() {
    let fx = Fixture::new(ProjectSettings::default()).await;
    let runner = ScriptedRunner::new(&fx.config).fail("run01:search_1", 1);
    let item = fx.add("run01", 0).await;

    let summary = Scheduler::new(&fx.store, &fx.config, &runner)
        .advance("soil", 0)
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert!(summary.frozen.is_empty());

    let item = fx.item(item.id).await;
    assert_eq!(item.status, Status::ItemFinished);
    assert_eq!(item.error, 0);
}

#[tokio::test]
async fn test_configuration_error_stops_without_counting() {
    let fx = Fixture::new(ProjectSettings::default()).await;
    let mut runner = ScriptedRunner::new(&fx.config);
    runner.broken = true;
    let item = fx.add("run01", 0).await;

    let leftover = fx.config.item_out_dir("soil", "run01").join("stale.mzML");
    std::fs::create_dir_all(leftover.parent().unwrap()).unwrap();
    std::fs::write(&leftover, b"old").unwrap();

    let err = Scheduler::new(&fx.store, &fx.config, &runner)
        .advance("soil", 0)
        .await
        .unwrap_err();
    assert!(err.is_configuration());

    let item = fx.item(item.id).await;
    assert_eq!(item.status, Status::ConvertedReady);
    assert_eq!(item.error, 0);
    assert!(!leftover.exists());
    assert_eq!(runner.calls(), vec!["run01:convert".to_string()]);
}

#[tokio::test]
async fn test_disabled_profile_pass_is_skipped() {
    let settings = ProjectSettings {
        profile_pass: false,
        ..Default::default()
    };
    let fx = Fixture::new(settings).await;
    let runner = ScriptedRunner::new(&fx.config);
    let item = fx.add("run01", 0).await;

    let summary = Scheduler::new(&fx.store, &fx.config, &runner)
        .advance("soil", 0)
        .await
        .unwrap();
    assert_eq!(summary.passes_completed, 2);
    assert_eq!(
        runner.calls(),
        vec![
            "run01:convert".to_string(),
            "run01:search_2".to_string(),
            "run01:score_2".to_string(),
        ]
    );

    let item = fx.item(item.id).await;
    assert_eq!(item.status, Status::ItemFinished);
    assert!(fx.store.proteins(item.id, Pass::Profile).await.unwrap().is_empty());
    assert!(!fx.config.item_proteome_fasta("soil", "run01").exists());

    let ledger = fx.store.ledger(item.id).await.unwrap();
    assert_eq!(ledger.get(LedgerField::Search(Pass::Profile)), 0);
    assert_eq!(ledger.get(LedgerField::Search(Pass::Proteome)), 5);
}

#[tokio::test]
async fn test_near_empty_report_skips_item() {
    let fx = Fixture::new(ProjectSettings::default()).await;
    let mut runner = ScriptedRunner::new(&fx.config);
    runner.report_rows = 1;
    let skipped = fx.add("run01", 0).await;
    let kept = fx.add("run02", 1).await;

    Scheduler::new(&fx.store, &fx.config, &runner)
        .advance("soil", 0)
        .await
        .unwrap();

    let item = fx.item(skipped.id).await;
    assert!(item.skip);
    assert_eq!(item.status, Status::Aggregate1);

    // the skipped item does not hold back the other partition
    let healthy = ScriptedRunner::new(&fx.config);
    Scheduler::new(&fx.store, &fx.config, &healthy)
        .advance("soil", 1)
        .await
        .unwrap();
    assert_eq!(fx.item(kept.id).await.status, Status::ItemFinished);
    assert_eq!(fx.item(skipped.id).await.status, Status::Aggregate1);
}

#[tokio::test]
async fn test_reset_to_added_reruns_from_scratch() {
    let fx = Fixture::new(ProjectSettings::default()).await;
    let runner = ScriptedRunner::new(&fx.config);
    let item = fx.add("run01", 0).await;
    let scheduler = Scheduler::new(&fx.store, &fx.config, &runner);

    scheduler.advance("soil", 0).await.unwrap();
    let before = fx.store.proteins(item.id, Pass::Proteome).await.unwrap();

    fx.store.reset_item(item.id, true, false).await.unwrap();
    scheduler.advance("soil", 0).await.unwrap();

    let item = fx.item(item.id).await;
    assert_eq!(item.status, Status::ItemFinished);
    assert_eq!(item.total_runtime, 25);
    assert_eq!(runner.count("run01:convert"), 2);

    let after = fx.store.proteins(item.id, Pass::Proteome).await.unwrap();
    let nsaf = |rows: &[ProteinRow]| {
        rows.iter()
            .map(|p| (p.accession.clone(), p.nsaf))
            .collect::<Vec<_>>()
    };
    assert_eq!(nsaf(&before), nsaf(&after));
}
