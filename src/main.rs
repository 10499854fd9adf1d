use clap::CommandFactory;
use dotenvy::dotenv;
use tracing_subscriber::{fmt, EnvFilter};

use soroban_invoker::commands::Root;

#[tokio::main]
async fn main() {
    let _ = dotenv().unwrap_or_default();

    let root = Root::new().unwrap_or_else(|e| {
        let mut cmd = Root::command();
        e.format(&mut cmd).exit();
    });

    if let Some(level) = root.global_args.log_level() {
        let mut e_filter = EnvFilter::from_default_env()
            .add_directive("hyper=off".parse().unwrap())
            .add_directive("jsonrpsee=off".parse().unwrap())
            .add_directive(format!("soroban_invoker={level}").parse().unwrap());

        for filter in &root.global_args.filter_logs {
            e_filter = e_filter.add_directive(filter.parse().unwrap_or_else(|e| {
                eprintln!("{e}: {filter}");
                std::process::exit(1);
            }));
        }

        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(e_filter)
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .finish();
        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("error: {e}");
        }
    }

    if let Err(e) = root.run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
