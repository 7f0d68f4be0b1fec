use dumbarb::cancel::Cancel;
use dumbarb::cli::Config;
use dumbarb::display::MatchProgress;
use dumbarb::error::DumbarbError;
use dumbarb::match_runner::MatchRunner;

fn main() {
    let config = Config::parse_args();

    simplelog::TermLogger::init(
        log::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )
    .expect("logger already initialized");

    let plan = match config.into_match_plan() {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("dumbarb: {e}");
            std::process::exit(2);
        }
    };

    let cancel = Cancel::new();
    if let Err(e) = cancel.install_signal_handler() {
        log::warn!("failed to install Ctrl-C handler: {e}");
    }

    let num_games = plan.num_games;
    let engine_a_name = plan.engine_a.name.clone();
    let engine_b_name = plan.engine_b.name.clone();
    let progress = MatchProgress::new(num_games, &engine_a_name, &engine_b_name);

    let mut match_runner = match MatchRunner::new(plan, cancel) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("dumbarb: {e}");
            std::process::exit(1);
        }
    };

    match match_runner.run(&progress) {
        Ok(()) => {
            progress.finish("match complete");
            std::process::exit(0);
        }
        Err(DumbarbError::Io(io_err)) => {
            eprintln!("dumbarb: I/O error: {io_err}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("dumbarb: {e}");
            std::process::exit(1);
        }
    }
}
