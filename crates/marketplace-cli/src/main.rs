use clap::Parser;

mod cli;
pub mod exit_codes;
mod logging;

use cli::args::Cli;
use cli::commands::dispatch;
use marketplace_registry::RegistryError;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => match e.downcast_ref::<RegistryError>() {
            Some(err) => {
                tracing::debug!(event = "command_failed", error = %err);
                eprintln!("error: {}", err.public_message());
                err.exit_code()
            }
            None => {
                eprintln!("fatal: {e:?}");
                exit_codes::INTERNAL_ERROR
            }
        },
    };
    std::process::exit(code);
}
