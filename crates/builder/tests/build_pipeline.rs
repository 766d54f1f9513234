use assert_matches::assert_matches;
use planforge_builder::{BuildError, Builder, CancelFlag, ExecutionBudget, Interrupt, StepError};
use planforge_core::commands::CommandRegistry;
use planforge_core::job::FailureCode;
use planforge_core::recipe::{ProjectInfo, Recipe, Step};
use planforge_core::types::JobId;
use planforge_model::{artifact, ArtifactStore, ElementKind, ModelAuthority, TemplateSpec};
use serde_json::json;

fn builder(dir: &tempfile::TempDir) -> Builder {
    Builder::new(
        ModelAuthority::new(TemplateSpec::builtin()),
        CommandRegistry::default(),
        ArtifactStore::new(dir.path()),
    )
}

fn job(id: &str) -> JobId {
    JobId::parse(id).unwrap()
}

fn house_steps() -> Vec<Step> {
    vec![
        Step::new(
            "CreateLevel",
            json!({"name": "Level 1", "elevation": 0, "create_plan_view": true}),
        ),
        Step::new(
            "CreateWall",
            json!({
                "curve": {"start": {"x": 0, "y": 0}, "end": {"x": 6000, "y": 0}},
                "wall_type": "Generic - 200mm",
                "level": "Level 1",
                "height": 3000
            }),
        )
        .with_id("wall_0"),
        Step::new(
            "CreateDoor",
            json!({
                "family": "M_Single-Flush",
                "symbol": "900mm x 2100mm",
                "location": {"x": 3000, "y": 0},
                "host_wall_id": "wall_0",
                "level": "Level 1"
            }),
        ),
        Step::new(
            "CreateFloor",
            json!({
                "boundary": [{"x": 0, "y": 0}, {"x": 6000, "y": 0}, {"x": 6000, "y": 4000}, {"x": 0, "y": 4000}],
                "floor_type": "Generic - 200mm",
                "level": "Level 1"
            }),
        ),
        Step::new("CreateView", json!({"view_type": "3D", "name": "{3D}"})),
    ]
}

#[test]
fn successful_build_persists_every_step() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder(&dir);
    let mut recipe = Recipe::new(house_steps());
    recipe.project_info = Some(ProjectInfo {
        name: Some("Cabin".into()),
        ..Default::default()
    });

    let locator = builder
        .execute(&job("house"), &recipe, &ExecutionBudget::unlimited())
        .unwrap();
    assert_eq!(locator.file_name, "house.pfm.json");
    assert!(!builder.authority().is_held());

    let doc = artifact::decode(&std::fs::read(&locator.path).unwrap()).unwrap();
    assert_eq!(doc.count_of_kind(ElementKind::Wall), 1);
    assert_eq!(doc.count_of_kind(ElementKind::Door), 1);
    assert_eq!(doc.count_of_kind(ElementKind::Floor), 1);
    assert_eq!(doc.count_of_kind(ElementKind::View), 2);
    assert_eq!(doc.project_info.unwrap().name.as_deref(), Some("Cabin"));
}

#[test]
fn failure_at_step_k_leaves_no_partial_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder(&dir);

    let first = builder
        .execute(
            &job("first"),
            &Recipe::new(house_steps()),
            &ExecutionBudget::unlimited(),
        )
        .unwrap();
    let first_bytes = std::fs::read(&first.path).unwrap();

    let mut steps = house_steps();
    steps.insert(
        3,
        Step::new(
            "CreateWall",
            json!({
                "curve": {"start": {"x": 0, "y": 0}, "end": {"x": 0, "y": 4000}},
                "wall_type": "Generic - 200mm",
                "level": "Level 9",
                "height": 3000
            }),
        ),
    );
    let err = builder
        .execute(&job("second"), &Recipe::new(steps), &ExecutionBudget::unlimited())
        .unwrap_err();

    assert_matches!(
        &err,
        BuildError::StepFailed {
            step_index: 3,
            cause: StepError::Resolve(_)
        }
    );
    assert_eq!(err.to_failure().code, FailureCode::ReferenceNotFound);
    assert!(!builder.store().artifact_path("second.pfm.json").exists());
    assert_eq!(std::fs::read(&first.path).unwrap(), first_bytes);
    assert!(!builder.authority().is_held());
}

#[test]
fn unknown_command_fails_before_authority_is_taken() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder(&dir);
    let mut steps = house_steps();
    steps.push(Step::new("CreateStair", json!({})));

    // Hold the lease: validation must not need it.
    let _lease = builder.authority().acquire().unwrap();
    let err = builder
        .execute(&job("stairs"), &Recipe::new(steps), &ExecutionBudget::unlimited())
        .unwrap_err();

    let failure = err.to_failure();
    assert_eq!(failure.code, FailureCode::ValidationError);
    assert_eq!(failure.step_index, Some(5));
    assert!(!builder.store().artifact_path("stairs.pfm.json").exists());
}

#[test]
fn held_authority_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder(&dir);
    let _lease = builder.authority().acquire().unwrap();
    let err = builder
        .execute(
            &job("blocked"),
            &Recipe::new(house_steps()),
            &ExecutionBudget::unlimited(),
        )
        .unwrap_err();
    assert_eq!(err.to_failure().code, FailureCode::AuthorityUnavailable);
}

#[test]
fn cancelled_budget_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder(&dir);
    let flag = CancelFlag::new();
    flag.trip(Interrupt::Cancelled);

    let err = builder
        .execute(
            &job("cancelled"),
            &Recipe::new(house_steps()),
            &ExecutionBudget::new(None, flag),
        )
        .unwrap_err();
    assert_eq!(err.to_failure().code, FailureCode::Cancelled);
    assert!(!builder.store().artifact_path("cancelled.pfm.json").exists());
}

#[test]
fn render_without_3d_view_fails() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder(&dir);
    let steps = house_steps()
        .into_iter()
        .filter(|s| s.command_type != "CreateView")
        .collect();
    let locator = builder
        .execute(&job("plain"), &Recipe::new(steps), &ExecutionBudget::unlimited())
        .unwrap();

    let bytes = std::fs::read(&locator.path).unwrap();
    let err = builder
        .render(&job("plain-render"), &bytes, &ExecutionBudget::unlimited())
        .unwrap_err();
    assert_matches!(err, BuildError::NoViewAvailable);
    assert!(!builder.store().artifact_path("plain-render.png").exists());
}

#[test]
fn render_with_3d_view_writes_png() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder(&dir);
    let locator = builder
        .execute(
            &job("model"),
            &Recipe::new(house_steps()),
            &ExecutionBudget::unlimited(),
        )
        .unwrap();

    let bytes = std::fs::read(&locator.path).unwrap();
    let image = builder
        .render(&job("model-render"), &bytes, &ExecutionBudget::unlimited())
        .unwrap();
    assert_eq!(image.content_type, "image/png");
    assert!(std::fs::read(&image.path).unwrap().starts_with(&[0x89, b'P', b'N', b'G']));
}

#[test]
fn render_rejects_corrupt_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder(&dir);
    let err = builder
        .render(&job("junk"), b"\x00\x01", &ExecutionBudget::unlimited())
        .unwrap_err();
    assert_matches!(err, BuildError::InvalidArtifact(_));
}

#[test]
fn render_of_artifact_with_dangling_reference_is_a_validation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder(&dir);
    let locator = builder
        .execute(
            &job("source"),
            &Recipe::new(house_steps()),
            &ExecutionBudget::unlimited(),
        )
        .unwrap();

    let mut file: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&locator.path).unwrap()).unwrap();
    for element in file["elements"].as_array_mut().unwrap() {
        if element["data"]["kind"] == "wall" {
            element["data"]["level"] = json!(u32::MAX);
        }
    }
    let bytes = serde_json::to_vec(&file).unwrap();

    let err = builder
        .render(&job("dangling"), &bytes, &ExecutionBudget::unlimited())
        .unwrap_err();
    assert_matches!(err, BuildError::InvalidArtifact(_));
    assert_eq!(err.to_failure().code, FailureCode::ValidationError);
    assert!(!builder.store().artifact_path("dangling.png").exists());
}
