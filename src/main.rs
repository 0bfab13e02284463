//! EchoFoam entry point
//!
//! Usage: `echofoam [preset | config.json]`. Runs every configured frame and
//! prints the run summary and verdict.

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    use std::process::ExitCode;

    env_logger::init();

    let config = match load_config(std::env::args().nth(1).as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("echofoam: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("echofoam: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The engine is a library on the web; rendering drives it from JS
}

#[cfg(not(target_arch = "wasm32"))]
fn load_config(arg: Option<&str>) -> echofoam::EngineResult<echofoam::Config> {
    use echofoam::{Config, Preset};

    match arg {
        None => {
            log::info!("No preset given, using {}", Preset::default().as_str());
            Ok(Config::default())
        }
        Some(name) => match Preset::from_str(name) {
            Some(preset) => {
                log::info!("Using preset {}", preset.as_str());
                Ok(Config::from_preset(preset))
            }
            None => Config::load(name),
        },
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn run(config: echofoam::Config) -> echofoam::EngineResult<()> {
    use echofoam::SimulationRunner;
    use echofoam::consts::LOG_EVERY_FRAMES;

    let mut runner = SimulationRunner::new(config)?;
    for result in runner.frames() {
        if result.frame % LOG_EVERY_FRAMES == 0 {
            log::info!(
                "frame {:>4}: max tau {:+.3}, mean psi {:.3}, coherent {:.1}%{}",
                result.frame,
                result.tau.max(),
                result.psi.mean(),
                result.coherent_fraction * 100.0,
                if result.collapsed_this_frame { " (collapse)" } else { "" }
            );
        }
    }

    let summary = runner.summary();
    println!("{summary}");
    log::debug!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
