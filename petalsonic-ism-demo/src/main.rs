mod cli;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    // Pick a scenario via the first command line argument
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--wall") => cli::run_moving_wall(),
        Some("--air") => cli::run_air_absorption(),
        Some(other) if other != "--orbit" => {
            log::warn!("Unknown scenario {}, running --orbit", other);
            cli::run_orbit()
        }
        _ => cli::run_orbit(),
    }
}
