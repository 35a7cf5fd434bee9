use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::ResourceCatalog;
use crate::config::{DatasetSpec, SourceProfile};
use crate::descriptor::ResourceDescriptor;
use crate::domain::{MetadataType, SourceKind, VersionStamp};
use crate::error::CollectError;
use crate::gate::{SyncDecision, decide};
use crate::source::{DataFetcher, MetadataClient, MetadataFetch};
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    /// Stop after the version decision and report what would happen.
    pub dry_run: bool,
    /// Re-sync datasets whose version is unchanged.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Skipped,
    Created,
    Updated,
    /// The remote version could not be determined and a version is already
    /// recorded; nothing was touched.
    Unresolved,
    Planned,
    Failed,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Skipped => "skipped",
            SyncAction::Created => "created",
            SyncAction::Updated => "updated",
            SyncAction::Unresolved => "unresolved",
            SyncAction::Planned => "planned",
            SyncAction::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectItem {
    pub source: SourceKind,
    pub dataset: String,
    pub endpoint: String,
    pub resource: String,
    pub action: SyncAction,
    pub recorded_version: Option<VersionStamp>,
    pub observed_version: Option<VersionStamp>,
    pub location: Option<String>,
    pub metadata_saved: usize,
    pub metadata_missing: usize,
    pub metadata_failed: usize,
    pub error: Option<String>,
}

impl CollectItem {
    fn pending(profile: &SourceProfile, spec: &DatasetSpec) -> Self {
        Self {
            source: spec.source,
            dataset: spec.dataset.to_string(),
            endpoint: spec.base_url.clone(),
            resource: profile.descriptor_for(&spec.dataset).key().to_string(),
            action: SyncAction::Failed,
            recorded_version: None,
            observed_version: None,
            location: None,
            metadata_saved: 0,
            metadata_missing: 0,
            metadata_failed: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectReport {
    pub items: Vec<CollectItem>,
}

impl CollectReport {
    /// Whether any dataset was committed during the pass.
    pub fn did_update(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item.action, SyncAction::Created | SyncAction::Updated))
    }

    pub fn failed(&self) -> usize {
        self.count(SyncAction::Failed)
    }

    pub fn count(&self, action: SyncAction) -> usize {
        self.items.iter().filter(|item| item.action == action).count()
    }

    pub fn extend(&mut self, other: CollectReport) {
        self.items.extend(other.items);
    }

    /// Every dataset of `profile` marked `failed` with `err`, for a source
    /// whose pass could not start.
    pub fn source_failed(profile: &SourceProfile, err: &CollectError) -> Self {
        error!(source = %profile.kind, "collection pass aborted: {err}");
        let items = profile
            .dataset_specs()
            .iter()
            .map(|spec| CollectItem {
                error: Some(err.to_string()),
                ..CollectItem::pending(profile, spec)
            })
            .collect();
        Self { items }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    fn phase(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Runs the version-gated sync of every dataset of a source profile.
pub struct Collector<M: MetadataClient, F: DataFetcher, C: ResourceCatalog> {
    store: Store,
    metadata: M,
    fetcher: F,
    catalog: C,
}

impl<M: MetadataClient, F: DataFetcher, C: ResourceCatalog> Collector<M, F, C> {
    pub fn new(store: Store, metadata: M, fetcher: F, catalog: C) -> Self {
        Self {
            store,
            metadata,
            fetcher,
            catalog,
        }
    }

    /// Processes the profile's datasets in order. A failing dataset is
    /// reported as `failed` and does not stop the remaining ones.
    pub fn collect(
        &self,
        profile: &SourceProfile,
        options: CollectOptions,
        sink: &dyn ProgressSink,
    ) -> Result<CollectReport, CollectError> {
        if !options.dry_run {
            self.store.ensure_root()?;
        }

        let mut report = CollectReport::default();
        for spec in profile.dataset_specs() {
            let start = Instant::now();
            let item = self.collect_dataset(profile, &spec, options, sink);
            sink.event(ProgressEvent {
                message: format!("{}/{}: {}", spec.source, spec.dataset, item.action.as_str()),
                elapsed: Some(start.elapsed()),
            });
            report.items.push(item);
        }

        info!(
            source = %profile.kind,
            datasets = report.items.len(),
            updated = report.did_update(),
            failed = report.failed(),
            "collection pass finished"
        );
        Ok(report)
    }

    fn collect_dataset(
        &self,
        profile: &SourceProfile,
        spec: &DatasetSpec,
        options: CollectOptions,
        sink: &dyn ProgressSink,
    ) -> CollectItem {
        let dataset = &spec.dataset;
        let mut descriptor = profile.descriptor_for(dataset);
        let mut item = CollectItem::pending(profile, spec);

        match self.sync(profile, spec, &mut descriptor, options, sink, &mut item) {
            Ok(action) => item.action = action,
            Err(err) => {
                error!(source = %spec.source, dataset = %dataset, "collection failed: {err}");
                item.action = SyncAction::Failed;
                item.error = Some(err.to_string());
            }
        }
        item
    }

    fn sync(
        &self,
        profile: &SourceProfile,
        spec: &DatasetSpec,
        descriptor: &mut ResourceDescriptor,
        options: CollectOptions,
        sink: &dyn ProgressSink,
        item: &mut CollectItem,
    ) -> Result<SyncAction, CollectError> {
        let dataset = &spec.dataset;
        sink.event(ProgressEvent::phase(format!(
            "phase=Version; {}/{dataset}",
            profile.kind
        )));
        debug!(dataset = %dataset, endpoint = %spec.base_url, "checking remote version");
        let observed = match self.metadata.fetch_version(dataset) {
            Ok(version) if !version.is_empty() => Some(version),
            Ok(_) => {
                warn!(dataset = %dataset, "remote version is empty");
                None
            }
            Err(err @ CollectError::MetadataUnavailable { .. }) => {
                warn!(dataset = %dataset, "remote version unavailable: {err}");
                None
            }
            Err(err) => return Err(err),
        };
        item.observed_version = observed.clone();

        let key = descriptor.key();
        let recorded = self.catalog.latest_version(&key)?;
        item.recorded_version = recorded.clone();

        let observed = match (observed, &recorded) {
            (Some(observed), _) => observed,
            (None, None) => profile.sentinel.clone(),
            (None, Some(recorded)) => {
                warn!(
                    dataset = %dataset,
                    version = %recorded,
                    "cannot compare with recorded version; leaving {key} untouched"
                );
                return Ok(SyncAction::Unresolved);
            }
        };

        let mut decision = decide(recorded.as_ref(), &observed);
        if decision == SyncDecision::Skip && options.force {
            decision = SyncDecision::SyncUpdate;
        }
        if !decision.needs_sync() {
            info!(dataset = %dataset, version = %observed, "dataset is up to date");
            return Ok(SyncAction::Skipped);
        }

        descriptor.set_version(observed);
        item.location = Some(descriptor.location.clone());
        if options.dry_run {
            info!(
                dataset = %dataset,
                version = %descriptor.data_version,
                "would sync into {}", descriptor.location
            );
            return Ok(SyncAction::Planned);
        }

        sink.event(ProgressEvent::phase(format!(
            "phase=Download; {}/{dataset} -> {}",
            profile.kind, descriptor.location
        )));
        let target = self.store.resource_dir(&descriptor.location);
        Store::ensure_dir(&target)?;
        self.fetcher.fetch_dataset(dataset, &target)?;

        match self.metadata.fetch_description(dataset) {
            Ok(description) => descriptor.set_description(&description),
            Err(err) => warn!(dataset = %dataset, "description unavailable: {err}"),
        }

        if !spec.metadata_types.is_empty() {
            sink.event(ProgressEvent::phase(format!(
                "phase=Metadata; {}/{dataset}",
                profile.kind
            )));
            self.fetch_metadata(spec, &descriptor.location, item);
        }

        sink.event(ProgressEvent::phase(format!("phase=Commit; {key}")));
        self.catalog.add_or_update(descriptor)?;
        info!(
            dataset = %dataset,
            version = %descriptor.data_version,
            "committed {key}"
        );

        Ok(match decision {
            SyncDecision::SyncNew => SyncAction::Created,
            _ => SyncAction::Updated,
        })
    }

    /// Best effort: failures are logged and counted, never propagated.
    fn fetch_metadata(&self, spec: &DatasetSpec, location: &str, item: &mut CollectItem) {
        let dataset = &spec.dataset;
        let target = self.store.metadata_dir(location);
        let mut columns: Option<Vec<String>> = None;

        for &metadata_type in &spec.metadata_types {
            let ids = match metadata_type {
                MetadataType::Codelist => {
                    if columns.is_none() {
                        match self.metadata.fetch_columns(dataset) {
                            Ok(found) => columns = Some(found),
                            Err(err) => {
                                warn!(
                                    dataset = %dataset,
                                    %metadata_type,
                                    "columns unavailable, skipping codelists: {err}"
                                );
                                item.metadata_failed += 1;
                                continue;
                            }
                        }
                    }
                    columns.clone().unwrap_or_default()
                }
                _ => vec![dataset.to_string()],
            };

            for id in ids {
                match self
                    .fetcher
                    .fetch_metadata_document(&id, metadata_type, &target)
                {
                    Ok(MetadataFetch::Saved(_)) => item.metadata_saved += 1,
                    Ok(MetadataFetch::NotListed) => item.metadata_missing += 1,
                    Err(err) => {
                        warn!(
                            dataset = %dataset,
                            %metadata_type,
                            id = %id,
                            "metadata fetch failed: {err}"
                        );
                        item.metadata_failed += 1;
                    }
                }
            }
        }
    }
}
