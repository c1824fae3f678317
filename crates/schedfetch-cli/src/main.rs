use clap::Parser;
use schedfetch_cli::cli_args::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(err) = schedfetch_cli::dispatch(cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
