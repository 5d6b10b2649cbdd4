//! Public installation of a scene package.
//!
//! Installation builds the same graph as the preview, but into the host's
//! shared namespace and inside a freshly created collection. The host
//! switches collections asynchronously; nothing is built until it confirms.
//!
//! # Stage Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! LoadingDescription
//!     ↓
//! ReservingNames
//!     ↓
//! SwitchingCollection
//!     ↓  (switch confirmation required)
//! BuildingGraph
//!     ↓
//! Finalizing
//!     ↓
//! Committed
//!
//! (Any non-terminal stage can transition to Failed)
//! ```
//!
//! Concurrent installs are not coordinated: both read the same name listing
//! and may reserve the same name.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;

use thiserror::Error;

use crate::builder::{BuildPolicy, BuildReport, GraphBuilder, ListRole};
use crate::config::EngineConfig;
use crate::document::SceneDocument;
use crate::error::{Result, SceneGraftError};
use crate::graph::{BuiltGraph, ObjectKind};
use crate::host::{CollectionEvent, CollectionHost, HostHandle, ObjectHost};
use crate::namer::{unique_backing_id, unique_container_name};
use crate::source::IdentityProvider;

// ============================================================================
// Stage machine
// ============================================================================

/// Installation stages in sequential order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallStage {
    NotStarted = 0,
    /// Reading the package's description file
    LoadingDescription = 1,
    /// Picking a free collection name and backing file
    ReservingNames = 2,
    /// Waiting for the host to activate the new collection
    SwitchingCollection = 3,
    /// Creating and linking every object in the shared namespace.
    /// Requires the switch confirmation.
    BuildingGraph = 4,
    /// Current scene, placeholder removal, save
    Finalizing = 5,
    /// Terminal: the host owns the objects
    Committed = 6,
    /// Terminal
    Failed = 255,
}

impl InstallStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }

    /// Stages that may only be entered after the host confirmed the switch
    #[inline]
    pub const fn requires_confirmation(self) -> bool {
        matches!(self, Self::BuildingGraph)
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::LoadingDescription),
            Self::LoadingDescription => Some(Self::ReservingNames),
            Self::ReservingNames => Some(Self::SwitchingCollection),
            Self::SwitchingCollection => Some(Self::BuildingGraph),
            Self::BuildingGraph => Some(Self::Finalizing),
            Self::Finalizing => Some(Self::Committed),
            Self::Committed | Self::Failed => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::LoadingDescription => "Loading description",
            Self::ReservingNames => "Reserving names",
            Self::SwitchingCollection => "Switching collection",
            Self::BuildingGraph => "Building scene graph",
            Self::Finalizing => "Finalizing installation",
            Self::Committed => "Installation complete",
            Self::Failed => "Installation failed",
        }
    }

    pub const fn progress_percent(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::LoadingDescription => 10,
            Self::ReservingNames => 20,
            Self::SwitchingCollection => 30,
            Self::BuildingGraph => 50,
            Self::Finalizing => 90,
            Self::Committed => 100,
            Self::Failed => 0,
        }
    }

    /// All stages in order (excluding Failed)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::NotStarted,
            Self::LoadingDescription,
            Self::ReservingNames,
            Self::SwitchingCollection,
            Self::BuildingGraph,
            Self::Finalizing,
            Self::Committed,
        ]
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage {
        from: InstallStage,
        to: InstallStage,
    },

    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition {
        from: InstallStage,
        to: InstallStage,
    },

    #[error("Cannot transition from terminal state {from} (installation is {})", if *from == InstallStage::Committed { "complete" } else { "failed" })]
    FromTerminalState { from: InstallStage },

    #[error("Stage {stage} requires the host to confirm the collection switch")]
    MissingConfirmation { stage: InstallStage },

    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: InstallStage },
}

impl From<InstallTransitionError> for SceneGraftError {
    fn from(err: InstallTransitionError) -> Self {
        SceneGraftError::InstallTransition(err.to_string())
    }
}

/// Forward-only stage tracking for one installation
#[derive(Debug, Clone)]
pub struct InstallContext {
    current: InstallStage,
    failed_at: Option<InstallStage>,
    /// (stage, unix timestamp)
    stage_history: Vec<(InstallStage, u64)>,
    switch_confirmed: bool,
}

impl Default for InstallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallContext {
    pub fn new() -> Self {
        Self {
            current: InstallStage::NotStarted,
            failed_at: None,
            stage_history: Vec::with_capacity(InstallStage::all_stages().len()),
            switch_confirmed: false,
        }
    }

    #[inline]
    pub fn current_stage(&self) -> InstallStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<InstallStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.current == InstallStage::Committed
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.current == InstallStage::Failed
    }

    #[inline]
    pub fn progress_percent(&self) -> u8 {
        self.current.progress_percent()
    }

    pub fn stage_history(&self) -> &[(InstallStage, u64)] {
        &self.stage_history
    }

    /// Record that the host switched to the new collection
    pub fn confirm_switch(&mut self) {
        self.switch_confirmed = true;
    }

    #[inline]
    pub fn is_switch_confirmed(&self) -> bool {
        self.switch_confirmed
    }

    /// Advance to the next stage in sequence
    pub fn advance(&mut self) -> std::result::Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }

        let next_stage = self
            .current
            .next()
            .expect("INTERNAL ERROR: non-terminal stage returned None from next()");
        self.enter(next_stage)
    }

    /// Transition to `target`, which must be the next stage
    pub fn transition_to(
        &mut self,
        target: InstallStage,
    ) -> std::result::Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }
        if target == self.current {
            return Err(InstallTransitionError::AlreadyAtStage { stage: target });
        }
        if target == InstallStage::Failed {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        if target.order() < self.current.order() {
            return Err(InstallTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        self.enter(target)
    }

    /// Mark the installation as failed at the current stage
    pub fn fail(&mut self) -> std::result::Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }

        self.failed_at = Some(self.current);
        self.record(InstallStage::Failed);
        self.current = InstallStage::Failed;
        Ok(())
    }

    fn enter(&mut self, stage: InstallStage) -> std::result::Result<InstallStage, InstallTransitionError> {
        if stage.requires_confirmation() && !self.switch_confirmed {
            return Err(InstallTransitionError::MissingConfirmation { stage });
        }

        self.record(stage);
        self.current = stage;
        tracing::debug!("Install stage: {}", stage);
        Ok(stage)
    }

    fn record(&mut self, stage: InstallStage) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.stage_history.push((stage, timestamp));
    }
}

// ============================================================================
// Installer
// ============================================================================

/// What to install and under which name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// Desired collection name
    pub name: String,
    /// Directory the package was unpacked into
    pub package_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReceipt {
    pub collection_name: String,
    pub backing_file: PathBuf,
    pub report: BuildReport,
    /// Selectable scenes, sorted
    pub scenes: Vec<String>,
    pub current_scene: Option<String>,
    /// Objects handed over to the host, filters included
    pub objects: usize,
}

pub struct Installer {
    objects: Arc<dyn ObjectHost>,
    collections: Arc<dyn CollectionHost>,
    identity: Box<dyn IdentityProvider>,
    config: EngineConfig,
    context: InstallContext,
}

impl Installer {
    pub fn new(
        objects: Arc<dyn ObjectHost>,
        collections: Arc<dyn CollectionHost>,
        identity: Box<dyn IdentityProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            objects,
            collections,
            identity,
            config,
            context: InstallContext::new(),
        }
    }

    /// Stage tracking of the last `install` call
    pub fn context(&self) -> &InstallContext {
        &self.context
    }

    /// Run the whole workflow. On failure the context records the stage
    /// that failed; objects created before the failure are destroyed.
    pub fn install(&mut self, request: &InstallRequest) -> Result<InstallReceipt> {
        self.context = InstallContext::new();
        tracing::info!(
            "Installing '{}' from {}",
            request.name,
            request.package_dir.display()
        );

        match self.run(request) {
            Ok(receipt) => {
                tracing::info!(
                    "Installed '{}' as collection '{}'",
                    request.name,
                    receipt.collection_name
                );
                Ok(receipt)
            }
            Err(e) => {
                let stage = self.context.current_stage();
                if let Err(terminal) = self.context.fail() {
                    tracing::debug!("Install context not marked failed: {}", terminal);
                }
                tracing::error!("Installation of '{}' failed at {}: {}", request.name, stage, e);
                Err(e)
            }
        }
    }

    fn run(&mut self, request: &InstallRequest) -> Result<InstallReceipt> {
        self.context.transition_to(InstallStage::LoadingDescription)?;
        let document = self.load_description(&request.package_dir)?;

        self.context.transition_to(InstallStage::ReservingNames)?;
        let naming = &self.config.naming;
        let collection_name =
            unique_container_name(&request.name, self.collections.collection_names(), naming);
        let backing_file =
            unique_backing_id(&request.name, self.collections.collection_files(), naming);
        tracing::info!(
            "Reserved collection '{}' backed by {}",
            collection_name,
            backing_file.display()
        );

        self.context.transition_to(InstallStage::SwitchingCollection)?;
        self.switch_collection(&collection_name, &backing_file)?;

        self.context.transition_to(InstallStage::BuildingGraph)?;
        let placeholder = self.collections.default_scene();
        if let Some(scene) = placeholder {
            self.collections
                .rename(scene, &self.config.install.placeholder_scene_name);
        }

        let base_dir = std::path::absolute(&request.package_dir)?
            .to_string_lossy()
            .into_owned();
        let tokens = self.config.token_set(base_dir, self.identity.identity());
        let policy = BuildPolicy::public_install()
            .with_duplicate_policy(self.config.registry.duplicate_policy);
        let built = GraphBuilder::new(self.objects.clone(), &tokens, policy)
            .with_list("sources", ListRole::Objects, &document.sources)
            .with_list("groups", ListRole::Objects, &document.groups)
            .with_list("transitions", ListRole::Transitions, &document.transitions)
            .build()?;

        self.context.transition_to(InstallStage::Finalizing)?;
        let current_scene = pick_current_scene(&built.graph, document.current_scene.as_deref());
        if let Some((name, handle)) = &current_scene {
            self.collections.set_current_scene(*handle);
            tracing::info!("Current scene set to '{}'", name);
        }
        if let Some(scene) = placeholder {
            self.objects.destroy(scene);
        }
        self.collections.save()?;

        self.context.transition_to(InstallStage::Committed)?;
        let report = built.report;
        let committed = built.graph.commit();
        Ok(InstallReceipt {
            collection_name,
            backing_file,
            report,
            scenes: committed.scene_names,
            current_scene: current_scene.map(|(name, _)| name),
            objects: committed.objects.len(),
        })
    }

    fn load_description(&self, package_dir: &Path) -> Result<SceneDocument> {
        let data_path = package_dir.join(&self.config.install.data_file);
        if !data_path.exists() {
            return Err(SceneGraftError::install(format!(
                "{} missing",
                self.config.install.data_file
            )));
        }
        SceneDocument::from_file(&data_path)
    }

    /// Create the collection and block until the host confirms the switch
    fn switch_collection(&mut self, name: &str, file: &Path) -> Result<()> {
        let events = self.collections.add_collection(name, file)?;

        match events.recv_timeout(self.config.install.switch_timeout()) {
            Ok(CollectionEvent::Switched { name: switched }) if switched == name => {
                self.context.confirm_switch();
                Ok(())
            }
            Ok(CollectionEvent::Switched { name: switched }) => Err(SceneGraftError::install(
                format!("host switched to '{}' instead of '{}'", switched, name),
            )),
            Ok(CollectionEvent::Refused { reason }) => Err(SceneGraftError::install(format!(
                "host refused to switch to '{}': {}",
                name, reason
            ))),
            Err(RecvTimeoutError::Timeout) => Err(SceneGraftError::install(format!(
                "timed out waiting for the switch to '{}'",
                name
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(SceneGraftError::install(format!(
                "host dropped the switch to '{}' without confirming",
                name
            ))),
        }
    }
}

/// `preferred` if it names a scene of the graph, else the last created scene
fn pick_current_scene(graph: &BuiltGraph, preferred: Option<&str>) -> Option<(String, HostHandle)> {
    if let Some(object) = preferred
        .and_then(|name| graph.scene(name))
        .and_then(|id| graph.get(id))
    {
        return Some((object.name.clone(), object.handle));
    }

    graph
        .containers()
        .iter()
        .rev()
        .filter_map(|&id| graph.get(id))
        .find(|object| object.kind == ObjectKind::Scene)
        .map(|object| (object.name.clone(), object.handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // InstallStage Tests
    // =========================================================================

    #[test]
    fn test_stage_order_is_sequential() {
        for (i, stage) in InstallStage::all_stages().iter().enumerate() {
            assert_eq!(stage.order() as usize, i, "Stage {:?} should have order {}", stage, i);
        }
    }

    #[test]
    fn test_stage_next_forms_chain() {
        let mut current = InstallStage::NotStarted;
        let mut count = 0;
        while let Some(next) = current.next() {
            current = next;
            count += 1;
            assert!(count < 20, "Infinite loop detected in stage chain");
        }
        assert_eq!(current, InstallStage::Committed);
        assert_eq!(count, 6);
    }

    #[test]
    fn test_only_building_requires_confirmation() {
        for stage in InstallStage::all_stages() {
            assert_eq!(
                stage.requires_confirmation(),
                *stage == InstallStage::BuildingGraph
            );
        }
    }

    #[test]
    fn test_progress_percent_increases() {
        let mut last = 0u8;
        for stage in InstallStage::all_stages() {
            assert!(stage.progress_percent() >= last);
            last = stage.progress_percent();
        }
        assert_eq!(InstallStage::Committed.progress_percent(), 100);
    }

    // =========================================================================
    // InstallContext Tests
    // =========================================================================

    #[test]
    fn test_building_requires_switch_confirmation() {
        let mut ctx = InstallContext::new();
        ctx.advance().expect("LoadingDescription");
        ctx.advance().expect("ReservingNames");
        ctx.advance().expect("SwitchingCollection");

        let err = ctx.advance().unwrap_err();
        assert!(matches!(err, InstallTransitionError::MissingConfirmation { .. }));

        ctx.confirm_switch();
        ctx.advance().expect("BuildingGraph");
        assert_eq!(ctx.current_stage(), InstallStage::BuildingGraph);
    }

    #[test]
    fn test_cannot_skip_or_go_backwards() {
        let mut ctx = InstallContext::new();
        let err = ctx.transition_to(InstallStage::Finalizing).unwrap_err();
        assert!(matches!(err, InstallTransitionError::SkippedStage { .. }));

        ctx.advance().expect("LoadingDescription");
        ctx.advance().expect("ReservingNames");
        let err = ctx.transition_to(InstallStage::LoadingDescription).unwrap_err();
        assert!(matches!(err, InstallTransitionError::BackwardTransition { .. }));

        let err = ctx.transition_to(InstallStage::ReservingNames).unwrap_err();
        assert!(matches!(err, InstallTransitionError::AlreadyAtStage { .. }));
    }

    #[test]
    fn test_fail_records_stage_and_is_terminal() {
        let mut ctx = InstallContext::new();
        ctx.advance().expect("LoadingDescription");
        ctx.fail().expect("Should fail");

        assert!(ctx.is_failed());
        assert_eq!(ctx.failed_at(), Some(InstallStage::LoadingDescription));
        assert!(matches!(
            ctx.advance().unwrap_err(),
            InstallTransitionError::FromTerminalState { .. }
        ));
        assert!(ctx.fail().is_err());
    }

    #[test]
    fn test_second_fail_keeps_first_failure() {
        let mut ctx = InstallContext::new();
        ctx.advance().expect("LoadingDescription");
        ctx.advance().expect("ReservingNames");
        ctx.fail().expect("Should fail");

        assert!(matches!(
            ctx.fail().unwrap_err(),
            InstallTransitionError::FromTerminalState {
                from: InstallStage::Failed
            }
        ));
        assert_eq!(ctx.failed_at(), Some(InstallStage::ReservingNames));
        let failures = ctx
            .stage_history()
            .iter()
            .filter(|(s, _)| *s == InstallStage::Failed)
            .count();
        assert_eq!(failures, 1);
    }

    #[test]
    fn test_stage_history_is_recorded() {
        let mut ctx = InstallContext::new();
        ctx.advance().expect("LoadingDescription");
        ctx.advance().expect("ReservingNames");

        let stages: Vec<InstallStage> = ctx.stage_history().iter().map(|(s, _)| *s).collect();
        assert_eq!(
            stages,
            vec![InstallStage::LoadingDescription, InstallStage::ReservingNames]
        );
    }

    #[test]
    fn test_transition_error_converts() {
        let err: SceneGraftError = InstallTransitionError::AlreadyAtStage {
            stage: InstallStage::Finalizing,
        }
        .into();
        assert!(matches!(err, SceneGraftError::InstallTransition(_)));
        assert!(err.to_string().contains("Finalizing installation"));
    }

    #[test]
    fn test_terminal_error_display() {
        let err = InstallTransitionError::FromTerminalState {
            from: InstallStage::Committed,
        };
        assert!(err.to_string().contains("complete"));
    }
}
