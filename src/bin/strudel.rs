/// Strudel CLI
///
/// Runs and inspects programs in their parsed (JSON AST) form. The source
/// language parser lives upstream; this binary consumes its output.
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = strudel_core::cli::run_cli() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
