//! wrapflow CLI entrypoint
//! Parses command-line arguments and drives the render pipeline.
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wrapflow::config::PipelineConfig;
use wrapflow::infrastructure::{
    CompositingEngine, HttpBrandAnalyzer, HttpGenerationClient, HttpResultStore,
    SqliteHealthLogger, SqliteJobRepository,
};
use wrapflow::pipeline::{
    Background, BrandBrief, JobRef, Lighting, MockupPipeline, RenderOrchestrator, RenderSettings,
    SubmitMockupRequest, SubmitRenderRequest,
};

#[derive(Parser)]
#[command(name = "wrapflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the pipeline configuration file
    #[arg(long, global = true, default_value = "wrapflow.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Submit a render request for a parent job
    Submit {
        /// Parent entity (job/project) the renders belong to
        #[arg(long)]
        parent: String,
        #[arg(long, default_value = "default")]
        org: String,
        #[arg(long, default_value = "cli")]
        user: String,
        /// Source vehicle photo URL; omit for a text-to-image render
        #[arg(long)]
        photo: Option<String>,
        /// Wrap design description
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "showroom")]
        lighting: Lighting,
        #[arg(long, default_value = "studio")]
        background: Background,
        /// Render the fixed five-angle set (requires --photo)
        #[arg(long)]
        multi_angle: bool,
        /// Free-text background override (with --background custom)
        #[arg(long)]
        custom_background: Option<String>,
    },
    /// Poll a render job once and print its reconciled state
    Status {
        /// Job id or external prediction id
        job: String,
    },
    /// Run the synchronous brand-mockup flow
    Mockup {
        #[arg(long)]
        template: String,
        #[arg(long, default_value = "default")]
        org: String,
        #[arg(long)]
        company: String,
        #[arg(long)]
        industry: Option<String>,
        /// Brand colors; repeat for multiple
        #[arg(long = "color")]
        colors: Vec<String>,
        #[arg(long)]
        style_notes: Option<String>,
        #[arg(long)]
        logo: Option<String>,
    },
    /// Store a mockup template's base image URL
    Template {
        #[arg(long)]
        id: String,
        #[arg(long)]
        image: Option<String>,
    },
    /// Set an organization's per-parent render ceiling
    Limit {
        #[arg(long, default_value = "default")]
        org: String,
        #[arg(long)]
        max_renders: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let repository = Arc::new(SqliteJobRepository::open(&config.database_path)?);
    let health = Arc::new(SqliteHealthLogger::new(repository.pool()));
    let backend = Arc::new(HttpGenerationClient::new(
        config.generation.base_url.clone(),
        config.generation.api_token.clone(),
    ));
    let store = Arc::new(HttpResultStore::new(
        config.storage.base_url.clone(),
        config.storage.api_token.clone(),
        config.storage.bucket.clone(),
    ));

    match cli.command {
        Commands::Submit {
            parent,
            org,
            user,
            photo,
            description,
            lighting,
            background,
            multi_angle,
            custom_background,
        } => {
            let orchestrator = RenderOrchestrator::new(backend, repository, store, health);
            let jobs = orchestrator
                .submit_render(SubmitRenderRequest {
                    parent_entity_id: parent,
                    organization_id: org,
                    created_by: user,
                    source_photo_url: photo,
                    description,
                    lighting,
                    background,
                    multi_angle,
                    custom_background,
                    preset_variants: None,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
        Commands::Status { job } => {
            let orchestrator = RenderOrchestrator::new(backend, repository, store, health);
            let outcome = orchestrator.reconcile(JobRef::from(job.as_str())).await?;
            println!("{}", serde_json::to_string_pretty(&outcome.job)?);
            if let Some(progress) = outcome.progress {
                println!("progress: {progress}%");
            }
        }
        Commands::Mockup {
            template,
            org,
            company,
            industry,
            colors,
            style_notes,
            logo,
        } => {
            let analyzer = Arc::new(HttpBrandAnalyzer::new(
                config.analysis.base_url.clone(),
                config.analysis.api_key.clone(),
                config.analysis.model.clone(),
            ));
            let pipeline = MockupPipeline::new(
                backend,
                analyzer,
                repository,
                store,
                Arc::new(CompositingEngine::new()),
                health,
            );
            let job = pipeline
                .run(SubmitMockupRequest {
                    template_id: template,
                    organization_id: org,
                    parent_entity_id: None,
                    brief: BrandBrief {
                        company_name: company,
                        industry,
                        brand_colors: colors,
                        style_notes,
                        logo_url: logo,
                    },
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Template { id, image } => {
            repository.upsert_template(&id, image.as_deref())?;
            println!("template {id} stored");
        }
        Commands::Limit { org, max_renders } => {
            repository.set_render_settings(
                &org,
                RenderSettings {
                    max_renders_per_parent: max_renders,
                },
            )?;
            println!("render limit for {org} set to {max_renders}");
        }
    }

    Ok(())
}
