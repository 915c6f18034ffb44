//! CLI subcommand handlers.

use crate::{Commands, ConfigAction, SchemaAction};
use jigsaw_core::{ConfigOverrides, PipelineConfig, RunContext};
use jigsaw_data::{SchemaRegistry, StatusReport, TransformationPipeline, ValidationStage};
use std::path::Path;

/// Sub-directory of the run root holding validation outputs.
const VALIDATION_DIR: &str = "validation";
/// Sub-directory of the run root holding transformation outputs.
const TRANSFORMATION_DIR: &str = "transformation";
const SNAPSHOT_FILE: &str = "run.json";

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> anyhow::Result<()> {
    let config = jigsaw_core::load_config(Some(workspace), config_path, Some(overrides))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    match command {
        Commands::Validate => handle_validate(&config),
        Commands::Transform { from } => handle_transform(&config, &workspace.join(from)),
        Commands::Run => handle_run(&config),
        Commands::Schema { action } => handle_schema(action, &config),
        Commands::Config { action } => handle_config(action, &config),
    }
}

fn load_registry(config: &PipelineConfig) -> anyhow::Result<SchemaRegistry> {
    SchemaRegistry::load(&config.schema_path)
        .map_err(|e| anyhow::anyhow!("Failed to load schema: {}", e))
}

fn start_run(config: &PipelineConfig) -> anyhow::Result<RunContext> {
    let run = RunContext::create(&config.artifacts_dir, config.seed)?;
    jigsaw_core::persistence::atomic_write_json(&run.root().join(SNAPSHOT_FILE), &run.snapshot())?;
    println!("Run directory: {}", run.root().display());
    Ok(run)
}

fn handle_validate(config: &PipelineConfig) -> anyhow::Result<()> {
    let registry = load_registry(config)?;
    let run = start_run(config)?;

    let artifact = ValidationStage::new(&registry, &config.input_dir)
        .run(&run.root().join(VALIDATION_DIR))?;
    println!("Valid data:   {}", artifact.valid_dir.display());
    println!("Invalid data: {}", artifact.invalid_dir.display());
    println!("Report:       {}", artifact.report_path.display());
    finish("Validation", &artifact.report)
}

fn handle_transform(config: &PipelineConfig, from: &Path) -> anyhow::Result<()> {
    if !from.is_dir() {
        anyhow::bail!("Validated directory not found: {}", from.display());
    }
    let registry = load_registry(config)?;
    let run = start_run(config)?;
    let mut rng = run.rng();

    let artifact = TransformationPipeline::new(config, &registry).run(
        from,
        &run.root().join(TRANSFORMATION_DIR),
        &mut rng,
    )?;
    print_transformation(&artifact);
    finish("Transformation", &artifact.report)
}

fn handle_run(config: &PipelineConfig) -> anyhow::Result<()> {
    let registry = load_registry(config)?;
    let run = start_run(config)?;
    let mut rng = run.rng();

    let validation = ValidationStage::new(&registry, &config.input_dir)
        .run(&run.root().join(VALIDATION_DIR))?;
    println!("Validation report: {}", validation.report_path.display());

    let artifact = TransformationPipeline::new(config, &registry).run(
        &validation.valid_dir,
        &run.root().join(TRANSFORMATION_DIR),
        &mut rng,
    )?;
    print_transformation(&artifact);

    let validation_failed = report_failures("Validation", &validation.report);
    let transformation_failed = report_failures("Transformation", &artifact.report);
    if validation_failed + transformation_failed > 0 {
        anyhow::bail!(
            "Run finished with {} validation and {} transformation failure(s)",
            validation_failed,
            transformation_failed
        );
    }
    println!("Run finished without failures");
    Ok(())
}

fn print_transformation(artifact: &jigsaw_data::TransformationArtifact) {
    println!("Stages:   {}", artifact.final_dir);
    for (label, path) in [
        ("Train:   ", &artifact.train_file),
        ("Valid:   ", &artifact.valid_file),
        ("Test:    ", &artifact.test_file),
    ] {
        if let Some(path) = path {
            println!("{} {}", label, path.display());
        }
    }
    println!("Manifest: {}", artifact.manifest_path.display());
}

/// Print the failures of a report and return how many there were.
fn report_failures(stage: &str, report: &StatusReport) -> usize {
    for failure in &report.failures {
        match &failure.file {
            Some(file) => eprintln!(
                "  {} failure in {}.{} [{}]: {}",
                stage, failure.dataset, file, failure.stage, failure.message
            ),
            None => eprintln!(
                "  {} failure in {} [{}]: {}",
                stage, failure.dataset, failure.stage, failure.message
            ),
        }
    }
    report.failures.len()
}

fn finish(stage: &str, report: &StatusReport) -> anyhow::Result<()> {
    let failures = report_failures(stage, report);
    if failures > 0 {
        anyhow::bail!("{} finished with {} failure(s)", stage, failures);
    }
    println!("{} finished without failures", stage);
    Ok(())
}

fn handle_schema(action: SchemaAction, config: &PipelineConfig) -> anyhow::Result<()> {
    let registry = load_registry(config)?;
    match action {
        SchemaAction::List => {
            if registry.is_empty() {
                println!("No datasets declared in {}", config.schema_path.display());
                return Ok(());
            }
            println!("Datasets ({}):", registry.len());
            for (name, schema) in registry.iter() {
                println!(
                    "  {:<24} {} columns, {} train, {} test, {} submission",
                    name,
                    schema.columns.len(),
                    schema.train.len(),
                    schema.test.len(),
                    schema.submission.len()
                );
            }
            Ok(())
        }
        SchemaAction::Show { name } => {
            let schema = registry.get(&name)?;
            print!("{}", serde_yaml::to_string(schema)?);
            Ok(())
        }
    }
}

fn handle_config(action: ConfigAction, config: &PipelineConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
