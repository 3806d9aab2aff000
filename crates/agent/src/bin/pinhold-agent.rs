//! The binary pinhold-agent.

use pinhold_agent::*;
use std::path::PathBuf;

#[derive(clap::Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to a json configuration file overriding module defaults.
    /// Missing modules or properties keep their defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to this agent's 32 byte signing key seed. Generated and
    /// written on first run when the file does not exist.
    #[arg(long, default_value = "pinhold.seed")]
    pub key_file: PathBuf,

    /// Seconds between status reports to the controller.
    #[arg(long, default_value_t = 1800)]
    pub report_interval_secs: u64,

    /// Path for persisting queued blob ids across restarts. Persistence
    /// is disabled when not given.
    #[arg(long)]
    pub queue_file: Option<PathBuf>,
}

fn load_or_create_seed(path: &PathBuf) -> std::io::Result<[u8; 32]> {
    match std::fs::read(path) {
        Ok(bytes) => bytes.as_slice().try_into().map_err(|_| {
            std::io::Error::other(format!(
                "key file {} is not a 32 byte seed",
                path.display(),
            ))
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let seed: [u8; 32] = rand::random();
            std::fs::write(path, seed)?;
            tracing::info!(path = %path.display(), "generated new signing key");
            Ok(seed)
        }
        Err(err) => Err(err),
    }
}

fn main() {
    let args = <Args as clap::Parser>::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    tracing::info!(?args, "pinhold agent starting");

    let seed = load_or_create_seed(&args.key_file).unwrap();
    let signer =
        std::sync::Arc::new(pinhold_core::Ed25519Signer::from_seed(&seed));

    let mut builder = pinhold_core::default_builder(signer);
    builder.set_default_config().unwrap();
    if let Some(path) = &args.config {
        let content = std::fs::read_to_string(path).unwrap();
        builder.config = serde_json::from_str(&content).unwrap();
    }

    let config = AgentConfig {
        report_interval: std::time::Duration::from_secs(
            args.report_interval_secs,
        ),
        queue_file: args.queue_file,
        ..AgentConfig::production()
    };

    let (send, recv) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
        send.send(()).unwrap();
    })
    .unwrap();

    let agent = Agent::new(builder.build(), config).unwrap();

    let _ = recv.recv();

    tracing::info!("terminating...");
    drop(agent);
    tracing::info!("done.");
    std::process::exit(0);
}
