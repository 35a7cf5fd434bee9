use std::collections::HashMap;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use stat_collector::catalog::{JsonCatalog, ResourceCatalog};
use stat_collector::collector::{CollectOptions, CollectReport, Collector, SyncAction};
use stat_collector::config::SourceProfile;
use stat_collector::descriptor::{ResourceDescriptor, ResourceKey};
use stat_collector::domain::{DatasetId, MetadataType, SourceKind, VersionStamp};
use stat_collector::error::CollectError;
use stat_collector::output::JsonOutput;
use stat_collector::source::{DataFetcher, MetadataClient, MetadataFetch};
use stat_collector::store::Store;

const PARSE_FAILURE: &str = "!parse";

#[derive(Default)]
struct MockMetadata {
    versions: Mutex<HashMap<String, String>>,
    columns: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockMetadata {
    fn with_columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|column| column.to_string()).collect(),
            ..Self::default()
        }
    }

    fn set_version(&self, dataset: &str, version: &str) {
        self.versions
            .lock()
            .unwrap()
            .insert(dataset.to_string(), version.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MetadataClient for MockMetadata {
    fn fetch_version(&self, dataset: &DatasetId) -> Result<VersionStamp, CollectError> {
        self.record(format!("version:{dataset}"));
        match self.versions.lock().unwrap().get(dataset.as_str()) {
            Some(value) if value == PARSE_FAILURE => Err(CollectError::Parse {
                what: "conceptscheme".to_string(),
                message: "unexpected end of document".to_string(),
            }),
            Some(value) => Ok(VersionStamp::new(value.as_str())),
            None => Err(CollectError::MetadataUnavailable {
                dataset: dataset.to_string(),
                reason: "not listed".to_string(),
            }),
        }
    }

    fn fetch_columns(&self, dataset: &DatasetId) -> Result<Vec<String>, CollectError> {
        self.record(format!("columns:{dataset}"));
        Ok(self.columns.clone())
    }

    fn fetch_description(&self, dataset: &DatasetId) -> Result<String, CollectError> {
        self.record(format!("description:{dataset}"));
        Ok("  Waste batteries and accumulators  ".to_string())
    }
}

#[derive(Default)]
struct MockFetcher {
    calls: Mutex<Vec<String>>,
    failing: Vec<String>,
}

impl MockFetcher {
    fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, call: String, id: &str) -> Result<(), CollectError> {
        let fails = self.failing.iter().any(|failing| failing == &call || failing == id);
        self.calls.lock().unwrap().push(call);
        if fails {
            return Err(CollectError::Status {
                url: format!("https://example.org/{id}"),
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl DataFetcher for MockFetcher {
    fn fetch_dataset(
        &self,
        dataset: &DatasetId,
        target: &Utf8Path,
    ) -> Result<Utf8PathBuf, CollectError> {
        self.check(format!("data:{dataset}"), dataset.as_str())?;
        let path = target.join(format!("{dataset}.csv.gz"));
        Store::write_bytes_atomic(&path, b"payload")?;
        Ok(path)
    }

    fn fetch_metadata_document(
        &self,
        id: &str,
        metadata_type: MetadataType,
        target: &Utf8Path,
    ) -> Result<MetadataFetch, CollectError> {
        self.check(format!("{metadata_type}:{id}"), &format!("{metadata_type}:{id}"))?;
        if id == "UNLISTED" {
            return Ok(MetadataFetch::NotListed);
        }
        Ok(MetadataFetch::Saved(target.join(format!("dim_{id}.zip"))))
    }
}

/// Catalog wrapper counting the commits made through it.
struct CountingCatalog<'a> {
    inner: &'a JsonCatalog,
    commits: Mutex<usize>,
}

impl<'a> CountingCatalog<'a> {
    fn new(inner: &'a JsonCatalog) -> Self {
        Self {
            inner,
            commits: Mutex::new(0),
        }
    }

    fn commits(&self) -> usize {
        *self.commits.lock().unwrap()
    }
}

impl ResourceCatalog for CountingCatalog<'_> {
    fn latest_version(&self, key: &ResourceKey) -> Result<Option<VersionStamp>, CollectError> {
        self.inner.latest_version(key)
    }

    fn add_or_update(&self, descriptor: &ResourceDescriptor) -> Result<(), CollectError> {
        *self.commits.lock().unwrap() += 1;
        self.inner.add_or_update(descriptor)
    }

    fn list(&self) -> Result<Vec<ResourceDescriptor>, CollectError> {
        self.inner.list()
    }
}

/// Catalog rejecting commits of one resource name.
struct RejectingCatalog<'a> {
    inner: &'a JsonCatalog,
    rejected: &'a str,
}

impl ResourceCatalog for RejectingCatalog<'_> {
    fn latest_version(&self, key: &ResourceKey) -> Result<Option<VersionStamp>, CollectError> {
        self.inner.latest_version(key)
    }

    fn add_or_update(&self, descriptor: &ResourceDescriptor) -> Result<(), CollectError> {
        if descriptor.name == self.rejected {
            return Err(CollectError::CatalogWrite("disk quota exceeded".to_string()));
        }
        self.inner.add_or_update(descriptor)
    }

    fn list(&self) -> Result<Vec<ResourceDescriptor>, CollectError> {
        self.inner.list()
    }
}

struct Harness {
    _temp: tempfile::TempDir,
    store: Store,
    catalog: JsonCatalog,
}

impl Harness {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new_with_root(root);
        let catalog = JsonCatalog::open(store.catalog_path());
        Self {
            _temp: temp,
            store,
            catalog,
        }
    }

    fn run(
        &self,
        profile: &SourceProfile,
        metadata: &MockMetadata,
        fetcher: &MockFetcher,
        catalog: &CountingCatalog<'_>,
        options: CollectOptions,
    ) -> CollectReport {
        Collector::new(self.store.clone(), metadata, fetcher, catalog)
            .collect(profile, options, &JsonOutput)
            .unwrap()
    }
}

fn eurostat(datasets: &[&str]) -> SourceProfile {
    let mut profile = SourceProfile::builtin(SourceKind::Eurostat);
    profile.datasets = datasets.iter().map(|id| id.parse().unwrap()).collect();
    profile
}

fn commit(catalog: &JsonCatalog, profile: &SourceProfile, dataset: &str, version: &str) {
    let mut descriptor = profile.descriptor_for(&dataset.parse().unwrap());
    descriptor.set_version(VersionStamp::new(version));
    catalog.add_or_update(&descriptor).unwrap();
}

#[test]
fn new_dataset_is_downloaded_and_committed() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT"]);
    let metadata = MockMetadata::with_columns(&["COLUMN_ID_1", "COLUMN_ID_2"]);
    metadata.set_version("ENV_WASBAT", "20230810");
    let fetcher = MockFetcher::default();
    let catalog = CountingCatalog::new(&harness.catalog);

    let report = harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());

    assert!(report.did_update());
    let item = &report.items[0];
    assert_eq!(item.action, SyncAction::Created);
    assert_eq!(item.endpoint, profile.base_url);
    assert_eq!(item.recorded_version, None);
    assert_eq!(item.metadata_saved, 4);
    assert_eq!(
        fetcher.calls(),
        vec![
            "data:ENV_WASBAT",
            "dataflow:ENV_WASBAT",
            "codelist:COLUMN_ID_1",
            "codelist:COLUMN_ID_2",
            "conceptscheme:ENV_WASBAT",
        ]
    );

    let resources = harness.catalog.list().unwrap();
    assert_eq!(resources.len(), 1);
    let resource = &resources[0];
    assert_eq!(resource.name, "eurostat_waste_ENV_WASBAT");
    assert_eq!(resource.stage, "collect");
    assert_eq!(resource.task_name, "eurostat_waste_collect");
    assert_eq!(resource.data_version, VersionStamp::new("20230810"));
    assert_eq!(resource.location, "collect/eurostat/ENV_WASBAT/20230810");
    assert_eq!(resource.comment, "Waste batteries and accumulators");
    assert!(resource.recorded_at.is_some());

    let data_file = harness
        .store
        .root()
        .join("collect/eurostat/ENV_WASBAT/20230810/ENV_WASBAT.csv.gz");
    assert!(data_file.as_std_path().exists());
}

#[test]
fn matching_version_fetches_and_commits_nothing() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT"]);
    commit(&harness.catalog, &profile, "ENV_WASBAT", "20230810");

    let metadata = MockMetadata::with_columns(&["COLUMN_ID_1"]);
    metadata.set_version("ENV_WASBAT", "20230810");
    let fetcher = MockFetcher::default();
    let catalog = CountingCatalog::new(&harness.catalog);

    let report = harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());

    assert!(!report.did_update());
    assert_eq!(report.items[0].action, SyncAction::Skipped);
    assert!(fetcher.calls().is_empty());
    assert_eq!(catalog.commits(), 0);
    assert_eq!(metadata.calls(), vec!["version:ENV_WASBAT"]);
}

#[test]
fn second_run_without_remote_change_is_a_no_op() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT", "ENV_WASGEN"]);
    let metadata = MockMetadata::with_columns(&["UNIT"]);
    metadata.set_version("ENV_WASBAT", "20230810");
    metadata.set_version("ENV_WASGEN", "20230701");
    let fetcher = MockFetcher::default();
    let catalog = CountingCatalog::new(&harness.catalog);

    let first = harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());
    assert!(first.did_update());
    let fetches = fetcher.calls().len();
    let before = harness.catalog.list().unwrap();

    let second = harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());

    assert!(!second.did_update());
    assert!(second
        .items
        .iter()
        .all(|item| item.action == SyncAction::Skipped));
    assert_eq!(fetcher.calls().len(), fetches);
    assert_eq!(catalog.commits(), 2);
    assert_eq!(harness.catalog.list().unwrap(), before);
}

#[test]
fn changed_version_is_synced_into_a_new_location() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT"]);
    let metadata = MockMetadata::with_columns(&[]);
    metadata.set_version("ENV_WASBAT", "20230810");
    let fetcher = MockFetcher::default();
    let catalog = CountingCatalog::new(&harness.catalog);
    harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());

    metadata.set_version("ENV_WASBAT", "20240115");
    let report = harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());

    let item = &report.items[0];
    assert_eq!(item.action, SyncAction::Updated);
    assert_eq!(item.recorded_version, Some(VersionStamp::new("20230810")));
    assert_eq!(item.observed_version, Some(VersionStamp::new("20240115")));
    assert_eq!(
        item.location.as_deref(),
        Some("collect/eurostat/ENV_WASBAT/20240115")
    );

    let key = profile
        .descriptor_for(&"ENV_WASBAT".parse().unwrap())
        .key();
    assert_eq!(
        harness.catalog.latest_version(&key).unwrap(),
        Some(VersionStamp::new("20240115"))
    );
    assert_eq!(harness.catalog.list().unwrap().len(), 2);
}

#[test]
fn failing_dataset_does_not_stop_the_pass() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT", "ENV_WASGEN"]);
    let metadata = MockMetadata::with_columns(&[]);
    metadata.set_version("ENV_WASBAT", "20230810");
    metadata.set_version("ENV_WASGEN", "20230701");
    let fetcher = MockFetcher::failing(&["ENV_WASBAT"]);
    let catalog = CountingCatalog::new(&harness.catalog);

    let report = harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());

    assert_eq!(report.items[0].action, SyncAction::Failed);
    assert!(report.items[0].error.as_deref().unwrap().contains("503"));
    assert_eq!(report.items[1].action, SyncAction::Created);
    assert_eq!(report.failed(), 1);
    assert!(report.did_update());

    let resources = harness.catalog.list().unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].name, "eurostat_waste_ENV_WASGEN");
}

#[test]
fn metadata_failures_are_counted_not_fatal() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT"]);
    let metadata = MockMetadata::with_columns(&["COLUMN_ID_1", "UNLISTED"]);
    metadata.set_version("ENV_WASBAT", "20230810");
    let fetcher = MockFetcher::failing(&["codelist:COLUMN_ID_1"]);
    let catalog = CountingCatalog::new(&harness.catalog);

    let report = harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());

    let item = &report.items[0];
    assert_eq!(item.action, SyncAction::Created);
    assert_eq!(item.metadata_failed, 1);
    assert_eq!(item.metadata_missing, 1);
    assert_eq!(item.metadata_saved, 2);
    assert_eq!(catalog.commits(), 1);
}

#[test]
fn unknown_version_without_record_commits_sentinel() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT"]);
    let metadata = MockMetadata::with_columns(&[]);
    let fetcher = MockFetcher::default();
    let catalog = CountingCatalog::new(&harness.catalog);

    let report = harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());

    let item = &report.items[0];
    assert_eq!(item.action, SyncAction::Created);
    assert_eq!(item.observed_version, None);
    assert_eq!(
        item.location.as_deref(),
        Some("collect/eurostat/ENV_WASBAT/00000000")
    );
    assert_eq!(
        harness.catalog.list().unwrap()[0].data_version,
        VersionStamp::new(VersionStamp::DATE_SENTINEL)
    );
}

#[test]
fn unknown_version_with_record_is_left_alone() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT"]);
    commit(&harness.catalog, &profile, "ENV_WASBAT", "20230810");
    let metadata = MockMetadata::with_columns(&[]);
    let fetcher = MockFetcher::default();
    let catalog = CountingCatalog::new(&harness.catalog);

    let report = harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());

    assert_eq!(report.items[0].action, SyncAction::Unresolved);
    assert!(!report.did_update());
    assert!(fetcher.calls().is_empty());
    assert_eq!(catalog.commits(), 0);
}

#[test]
fn malformed_version_document_fails_only_that_dataset() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT", "ENV_WASGEN"]);
    let metadata = MockMetadata::with_columns(&[]);
    metadata.set_version("ENV_WASBAT", PARSE_FAILURE);
    metadata.set_version("ENV_WASGEN", "20230701");
    let fetcher = MockFetcher::default();
    let catalog = CountingCatalog::new(&harness.catalog);

    let report = harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());

    assert_eq!(report.items[0].action, SyncAction::Failed);
    assert_matches!(report.items[0].error.as_deref(), Some(message) if message.contains("conceptscheme"));
    assert_eq!(report.items[1].action, SyncAction::Created);
    assert!(!fetcher.calls().iter().any(|call| call.contains("ENV_WASBAT")));
}

#[test]
fn dry_run_plans_without_side_effects() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT"]);
    let metadata = MockMetadata::with_columns(&["COLUMN_ID_1"]);
    metadata.set_version("ENV_WASBAT", "20230810");
    let fetcher = MockFetcher::default();
    let catalog = CountingCatalog::new(&harness.catalog);
    let options = CollectOptions {
        dry_run: true,
        force: false,
    };

    let report = harness.run(&profile, &metadata, &fetcher, &catalog, options);

    let item = &report.items[0];
    assert_eq!(item.action, SyncAction::Planned);
    assert_eq!(
        item.location.as_deref(),
        Some("collect/eurostat/ENV_WASBAT/20230810")
    );
    assert!(!report.did_update());
    assert!(fetcher.calls().is_empty());
    assert_eq!(catalog.commits(), 0);
    assert!(!harness.catalog.path().as_std_path().exists());
}

#[test]
fn force_resyncs_same_version_in_place() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT"]);
    commit(&harness.catalog, &profile, "ENV_WASBAT", "20230810");
    let metadata = MockMetadata::with_columns(&[]);
    metadata.set_version("ENV_WASBAT", "20230810");
    let fetcher = MockFetcher::default();
    let catalog = CountingCatalog::new(&harness.catalog);
    let options = CollectOptions {
        dry_run: false,
        force: true,
    };

    let report = harness.run(&profile, &metadata, &fetcher, &catalog, options);

    assert_eq!(report.items[0].action, SyncAction::Updated);
    assert_eq!(fetcher.calls()[0], "data:ENV_WASBAT");
    assert_eq!(harness.catalog.list().unwrap().len(), 1);
}

#[test]
fn unido_profile_fetches_no_structure_documents() {
    let harness = Harness::new();
    let mut profile = SourceProfile::builtin(SourceKind::Unido);
    profile.datasets = vec!["INDSTAT".parse().unwrap()];
    let metadata = MockMetadata::with_columns(&["EMP"]);
    metadata.set_version("INDSTAT", "2023");
    let fetcher = MockFetcher::default();
    let catalog = CountingCatalog::new(&harness.catalog);

    let report = harness.run(&profile, &metadata, &fetcher, &catalog, CollectOptions::default());

    assert_eq!(report.items[0].action, SyncAction::Created);
    assert_eq!(fetcher.calls(), vec!["data:INDSTAT"]);
    assert_eq!(
        harness.catalog.list().unwrap()[0].location,
        "collect/unido/INDSTAT/2023"
    );
}

#[test]
fn failed_commit_is_reported_and_the_pass_continues() {
    let harness = Harness::new();
    let profile = eurostat(&["ENV_WASBAT", "ENV_WASGEN"]);
    let metadata = MockMetadata::with_columns(&[]);
    metadata.set_version("ENV_WASBAT", "20230810");
    metadata.set_version("ENV_WASGEN", "20230701");
    let fetcher = MockFetcher::default();
    let catalog = RejectingCatalog {
        inner: &harness.catalog,
        rejected: "eurostat_waste_ENV_WASBAT",
    };

    let report = Collector::new(harness.store.clone(), &metadata, &fetcher, &catalog)
        .collect(&profile, CollectOptions::default(), &JsonOutput)
        .unwrap();

    let failed = &report.items[0];
    assert_eq!(failed.action, SyncAction::Failed);
    assert_matches!(
        failed.error.as_deref(),
        Some(message) if message.contains("failed to write resource catalog")
            && message.contains("disk quota exceeded")
    );
    assert_eq!(report.items[1].action, SyncAction::Created);
    assert_eq!(report.failed(), 1);
    assert!(fetcher.calls().contains(&"data:ENV_WASGEN".to_string()));

    let only_failed = CollectReport {
        items: vec![failed.clone()],
    };
    assert!(!only_failed.did_update());

    let resources = harness.catalog.list().unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].name, "eurostat_waste_ENV_WASGEN");
}

#[test]
fn aborted_source_marks_every_dataset_failed() {
    let profile = eurostat(&["ENV_WASBAT", "ENV_WASGEN"]);
    let err = CollectError::Filesystem("permission denied".to_string());

    let report = CollectReport::source_failed(&profile, &err);

    assert_eq!(report.items.len(), 2);
    assert_eq!(report.failed(), 2);
    assert!(!report.did_update());
    assert_eq!(report.items[1].dataset, "ENV_WASGEN");
    assert_eq!(
        report.items[1].resource,
        "eurostat_waste_ENV_WASGEN/collect/eurostat_waste_collect"
    );
    assert_matches!(
        report.items[0].error.as_deref(),
        Some(message) if message.contains("permission denied")
    );
}
