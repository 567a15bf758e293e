//! Rigsmith CLI entry point.
//!
//! Binary name: `rigsmith`
//!
//! Parses CLI arguments, sets up tracing, then dispatches to the command
//! handlers. `build` exits non-zero when the session aborts.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use clap_complete::generate;

use cli::{ArtifactCommand, Cli, Commands};
use rigsmith_observe::tracing_setup::{init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,rigsmith=debug",
        _ => "trace",
    };
    init_tracing(filter, cli.otel).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let json = cli.json;

    match cli.command {
        Commands::Build {
            rig,
            until,
            optimize,
            only,
            no_hooks,
            scene,
            publish,
            report,
        } => {
            let args = cli::build::BuildArgs {
                rig,
                until,
                optimize,
                only,
                no_hooks,
                scene,
                publish,
                report,
            };
            return cli::build::handle_build(args, json, cli.quiet, cli.verbose > 0).await;
        }

        Commands::Order { rig, dot } => {
            cli::order::handle_order(&rig, dot, json).await?;
        }

        Commands::Archetypes { rig } => {
            cli::archetypes::handle_list(rig.as_deref(), json).await?;
        }

        Commands::New {
            archetype,
            name,
            dir,
            yes,
        } => {
            cli::archetypes::handle_new(&archetype, &name, &dir, yes, json).await?;
        }

        Commands::Components => {
            cli::components::handle_components(json)?;
        }

        Commands::Artifact { action } => match action {
            ArtifactCommand::Save {
                kind,
                targets,
                scene,
                path,
            } => {
                cli::artifact::handle_save(kind, &targets, &scene, &path, json).await?;
            }
            ArtifactCommand::Load { kind, scene, path } => {
                cli::artifact::handle_load(kind, &scene, &path, json).await?;
            }
        },

        Commands::Publish {
            rig,
            scene,
            no_versioning,
        } => {
            cli::publish::handle_publish(&rig, &scene, no_versioning, json).await?;
        }

        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "rigsmith", &mut std::io::stdout());
        }
    }

    Ok(ExitCode::SUCCESS)
}
