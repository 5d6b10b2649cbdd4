//! Reload coordinator for the private preview.
//!
//! Owns at most one linked graph at a time plus the active selection into
//! it. A reload with a new handle builds a complete replacement graph first
//! and only swaps it in once the build succeeded.
//!
//! # States
//! ```text
//! Idle -> Loading -> Linked -> Loading -> Linked ...
//!           |                    |
//!           +------ (Err) -------+-> previous state kept
//! ```
//!
//! `Idle` is only the initial state: once a graph has been linked the
//! coordinator never returns to it.
//!
//! # Drop order
//! The active guard is always released before the graph that owns the
//! selected scene is dropped, both on swap and on coordinator drop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::active::{ActiveSelection, register_active};
use crate::builder::{BuildPolicy, BuildReport, GraphBuilder, ListRole};
use crate::config::EngineConfig;
use crate::error::{Result, SceneGraftError};
use crate::graph::BuiltGraph;
use crate::host::{HostHandle, ObjectHost};
use crate::source::{DocumentSource, IdentityProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CoordinatorState {
    /// Nothing linked yet; never re-entered after the first link
    Idle,
    /// A rebuild is running
    Loading,
    /// A graph is linked
    Linked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Same handle as the linked graph; nothing was rebuilt
    Unchanged,
    Rebuilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    Selected,
    AlreadySelected,
    /// No scene by that name; the previous selection is kept
    NotFound,
}

/// Persisted settings of a preview consumer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub scene: String,
}

/// What an `update` did
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// `None` when `file` was empty
    pub reload: Option<Result<ReloadOutcome>>,
    /// `None` when `scene` was empty
    pub select: Option<SelectOutcome>,
}

struct Linked {
    handle: PathBuf,
    graph: BuiltGraph,
    report: BuildReport,
}

pub struct ReloadCoordinator {
    host: Arc<dyn ObjectHost>,
    documents: Box<dyn DocumentSource>,
    identity: Box<dyn IdentityProvider>,
    /// Consumer the active scene is registered under
    parent: HostHandle,
    config: EngineConfig,
    state: CoordinatorState,
    linked: Option<Linked>,
    selection: Option<ActiveSelection>,
    generation: u64,
}

impl ReloadCoordinator {
    pub fn new(
        host: Arc<dyn ObjectHost>,
        documents: Box<dyn DocumentSource>,
        identity: Box<dyn IdentityProvider>,
        parent: HostHandle,
        config: EngineConfig,
    ) -> Self {
        Self {
            host,
            documents,
            identity,
            parent,
            config,
            state: CoordinatorState::Idle,
            linked: None,
            selection: None,
            generation: 0,
        }
    }

    /// Rebuild from `handle` unless it is the handle already linked.
    ///
    /// On `Err` the previously linked graph, its handle and the active
    /// selection are exactly as before the call.
    pub fn reload(&mut self, handle: &Path) -> Result<ReloadOutcome> {
        if self
            .linked
            .as_ref()
            .is_some_and(|linked| linked.handle == handle)
        {
            tracing::debug!("Reload skipped, {} is already linked", handle.display());
            return Ok(ReloadOutcome::Unchanged);
        }

        let previous = self.state;
        self.state = CoordinatorState::Loading;
        let result = self.rebuild(handle);
        self.state = previous;

        let (graph, report) = match result {
            Ok(built) => built,
            Err(e) => {
                tracing::error!("Reload of {} failed: {}", handle.display(), e);
                return Err(e);
            }
        };

        // Release the selection before the graph owning it goes away
        if let Some(mut selection) = self.selection.take() {
            selection.guard.release();
        }
        self.linked = Some(Linked {
            handle: handle.to_path_buf(),
            graph,
            report,
        });
        self.state = CoordinatorState::Linked;
        self.generation += 1;

        tracing::info!(
            "Linked {} (generation {})",
            handle.display(),
            self.generation
        );
        Ok(ReloadOutcome::Rebuilt)
    }

    fn rebuild(&self, handle: &Path) -> Result<(BuiltGraph, BuildReport)> {
        let document = self.documents.load(handle)?;

        let absolute = std::path::absolute(handle)?;
        let base_dir = absolute
            .parent()
            .ok_or_else(|| {
                SceneGraftError::document(format!("{} has no parent directory", absolute.display()))
            })?
            .to_string_lossy()
            .into_owned();

        let tokens = self.config.token_set(base_dir, self.identity.identity());
        let policy = BuildPolicy::private_preview()
            .with_duplicate_policy(self.config.registry.duplicate_policy);

        let built = GraphBuilder::new(self.host.clone(), &tokens, policy)
            .with_list("sources", ListRole::Objects, &document.sources)
            .with_list("groups", ListRole::Objects, &document.groups)
            .build()?;
        Ok((built.graph, built.report))
    }

    /// Make the scene called `name` the active selection
    pub fn select(&mut self, name: &str) -> SelectOutcome {
        if self.selection.as_ref().is_some_and(|s| s.name == name) {
            return SelectOutcome::AlreadySelected;
        }

        let Some((object, child)) = self.linked.as_ref().and_then(|linked| {
            linked
                .graph
                .scene(name)
                .and_then(|id| linked.graph.get(id).map(|o| (id, o.handle)))
        }) else {
            tracing::warn!("Scene '{}' not found, keeping current selection", name);
            return SelectOutcome::NotFound;
        };

        if let Some(mut previous) = self.selection.take() {
            previous.guard.release();
        }
        self.selection = Some(ActiveSelection {
            name: name.to_string(),
            object,
            guard: register_active(self.host.clone(), self.parent, child),
        });
        tracing::info!("Selected scene '{}'", name);
        SelectOutcome::Selected
    }

    /// Apply persisted settings: reload by file, then select by scene
    pub fn update(&mut self, settings: &SourceSettings) -> UpdateReport {
        let reload = (!settings.file.is_empty()).then(|| self.reload(Path::new(&settings.file)));
        let select = (!settings.scene.is_empty()).then(|| self.select(&settings.scene));
        UpdateReport { reload, select }
    }

    /// Settings that reproduce the current state
    pub fn save(&self) -> SourceSettings {
        SourceSettings {
            file: self
                .linked
                .as_ref()
                .map(|l| l.handle.to_string_lossy().into_owned())
                .unwrap_or_default(),
            scene: self
                .selection
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_default(),
        }
    }

    /// Sorted snapshot of selectable scene names
    pub fn scene_names(&self) -> Vec<String> {
        self.linked
            .as_ref()
            .map(|l| l.graph.scene_names())
            .unwrap_or_default()
    }

    /// Name of the active scene
    pub fn active(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.name.as_str())
    }

    /// Output size of the active scene
    pub fn active_dimensions(&self) -> Option<(u32, u32)> {
        let selection = self.selection.as_ref()?;
        let graph = &self.linked.as_ref()?.graph;
        let handle = graph.get(selection.object)?.handle;
        self.host.dimensions(handle)
    }

    pub fn graph(&self) -> Option<&BuiltGraph> {
        self.linked.as_ref().map(|l| &l.graph)
    }

    pub fn linked_handle(&self) -> Option<&Path> {
        self.linked.as_ref().map(|l| l.handle.as_path())
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Number of successful rebuilds
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report of the linked build
    pub fn report(&self) -> Option<&BuildReport> {
        self.linked.as_ref().map(|l| &l.report)
    }
}

impl Drop for ReloadCoordinator {
    fn drop(&mut self) {
        if let Some(mut selection) = self.selection.take() {
            selection.guard.release();
        }
        self.linked = None;
    }
}
