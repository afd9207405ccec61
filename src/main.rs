use clap::Parser;
use tracing_subscriber::EnvFilter;

use threadmux::cli::{Cli, Commands};
use threadmux::core::Config;
use threadmux::{app::AppHandle, git, persist, scan, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("threadmux=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Run { root } => {
            let mut state = persist::load(&config.state_file());
            // Rescan replaces the channel tree wholesale; threads keep their
            // channel ids even if a folder has since disappeared.
            state.channels = vec![scan::scan_root(&root)];
            state.root_path = Some(root.to_string_lossy().to_string());

            let handle = AppHandle::new(config, state);
            tracing::info!("threadmux running over {:?}; ctrl-c to exit", root);
            tokio::signal::ctrl_c().await?;
            handle.shutdown().await;
            Ok(())
        }
        Commands::Scan { root } => {
            let channel = scan::scan_root(&root);
            println!("{}", serde_json::to_string_pretty(&channel)?);
            Ok(())
        }
        Commands::Branches { path } => {
            let probe = git::probe(&path).await;
            println!("{}", serde_json::to_string_pretty(&probe)?);
            if probe.is_repo {
                for branch in git::list_branches(&path).await? {
                    println!("{branch}");
                }
            }
            Ok(())
        }
    }
}
