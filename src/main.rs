// src/main.rs
use civic_notify::cli::{self, Cli};
use env_logger::Env;
use structopt::StructOpt;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opt = Cli::from_args();
    if let Err(e) = cli::run(opt).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
