// src/main.rs

use tracing::error;

#[tokio::main]
async fn main() {
    let args = ruledag::cli::parse();
    ruledag::logging::init_logging(args.verbose);

    if let Err(err) = ruledag::run(args).await {
        error!("{err}");
        std::process::exit(err.exit_code());
    }
}
