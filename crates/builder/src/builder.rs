//! Transactional builder.
//!
//! Owns the model authority. [`Builder::execute`] runs a whole recipe inside
//! one transaction and persists the result only after commit;
//! [`Builder::render`] reopens a persisted model and exports a PNG. Both take
//! `&self` but serialize on the authority lease, so calling them from two
//! threads at once fails one with `AuthorityUnavailable`.

use planforge_core::commands::{CommandRegistry, ParsedStep, ViewType};
use planforge_core::job::ResultLocator;
use planforge_core::recipe::Recipe;
use planforge_core::types::JobId;
use planforge_model::raster::{self, RasterOptions};
use planforge_model::{ArtifactStore, ModelAuthority, ModelError, Transaction};

use crate::budget::{ExecutionBudget, Interrupt};
use crate::config::BuilderConfig;
use crate::error::BuildError;
use crate::execute::apply_step;
use crate::resolver::ReferenceResolver;

pub struct Builder {
    authority: ModelAuthority,
    registry: CommandRegistry,
    store: ArtifactStore,
    raster: RasterOptions,
}

impl Builder {
    pub fn new(authority: ModelAuthority, registry: CommandRegistry, store: ArtifactStore) -> Self {
        Self {
            authority,
            registry,
            store,
            raster: RasterOptions::default(),
        }
    }

    /// Build from configuration: template, default registry, output dir.
    pub fn from_config(config: &BuilderConfig) -> Result<Self, ModelError> {
        let template = config.load_template()?;
        Ok(Self::new(
            ModelAuthority::new(template),
            CommandRegistry::default(),
            ArtifactStore::new(&config.output_dir),
        ))
    }

    pub fn with_raster_options(mut self, raster: RasterOptions) -> Self {
        self.raster = raster;
        self
    }

    pub fn authority(&self) -> &ModelAuthority {
        &self.authority
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Convert every step of the recipe without touching the model.
    pub fn prepare(&self, recipe: &Recipe) -> Result<Vec<ParsedStep>, BuildError> {
        self.registry
            .parse_recipe(recipe)
            .map_err(|(step_index, source)| BuildError::Validation { step_index, source })
    }

    /// Build a recipe and persist the committed model.
    pub fn execute(
        &self,
        job_id: &JobId,
        recipe: &Recipe,
        budget: &ExecutionBudget,
    ) -> Result<ResultLocator, BuildError> {
        let steps = self.prepare(recipe)?;
        self.execute_prepared(job_id, recipe, &steps, budget)
    }

    /// Build already-converted steps. `recipe` supplies project info only.
    pub fn execute_prepared(
        &self,
        job_id: &JobId,
        recipe: &Recipe,
        steps: &[ParsedStep],
        budget: &ExecutionBudget,
    ) -> Result<ResultLocator, BuildError> {
        budget.check().map_err(|reason| BuildError::Interrupted {
            reason,
            step_index: None,
        })?;

        let mut lease = self
            .authority
            .acquire()
            .map_err(BuildError::AuthorityUnavailable)?;
        let mut context = lease.new_context();
        context.project_info = recipe.project_info.clone();

        let mut tx = context.begin_transaction(job_id.as_str());
        let mut resolver = ReferenceResolver::new();
        if let Err(e) = run_steps(&mut tx, &mut resolver, steps, budget) {
            tracing::info!(
                job_id = %job_id,
                changes = tx.change_count(),
                error = %e,
                "Build failed, rolling back",
            );
            tx.rollback();
            return Err(e);
        }
        let changes = tx.commit();
        tracing::info!(
            job_id = %job_id,
            steps = steps.len(),
            changes,
            activations = resolver.activations(),
            "Build committed",
        );

        self.store
            .persist_model(job_id, &context)
            .map_err(BuildError::Io)
    }

    /// Reopen a persisted model and export its 3D view as a PNG.
    pub fn render(
        &self,
        job_id: &JobId,
        artifact: &[u8],
        budget: &ExecutionBudget,
    ) -> Result<ResultLocator, BuildError> {
        let interrupted = |reason: Interrupt| BuildError::Interrupted {
            reason,
            step_index: None,
        };
        budget.check().map_err(interrupted)?;

        let mut lease = self
            .authority
            .acquire()
            .map_err(BuildError::AuthorityUnavailable)?;
        let context = lease
            .open_artifact(artifact)
            .map_err(BuildError::InvalidArtifact)?;

        let view = context
            .first_view(ViewType::ThreeD)
            .ok_or(BuildError::NoViewAvailable)?;
        tracing::debug!(job_id = %job_id, view = %view.name, "Rendering 3D view");

        let png = raster::render_png(&context, self.raster).map_err(|e| match e {
            ModelError::Export(_) | ModelError::Io(_) => BuildError::Io(e),
            other => BuildError::InvalidArtifact(other),
        })?;
        budget.check().map_err(interrupted)?;

        self.store.persist_image(job_id, &png).map_err(BuildError::Io)
    }
}

fn run_steps(
    tx: &mut Transaction<'_>,
    resolver: &mut ReferenceResolver,
    steps: &[ParsedStep],
    budget: &ExecutionBudget,
) -> Result<(), BuildError> {
    for step in steps {
        budget.check().map_err(|reason| BuildError::Interrupted {
            reason,
            step_index: Some(step.index),
        })?;
        apply_step(tx, resolver, step).map_err(|cause| BuildError::StepFailed {
            step_index: step.index,
            cause,
        })?;
    }
    budget.check().map_err(|reason| BuildError::Interrupted {
        reason,
        step_index: None,
    })
}
