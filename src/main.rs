mod dump;

use clap::{CommandFactory, Parser};

use uhid_replay::capture;
use uhid_replay::config::{Cli, Command, Config};
use uhid_replay::event_loop::EventLoop;
use uhid_replay::replay::ReplayScheduler;
use uhid_replay::uhid::{DeviceHandle, DeviceIdentity};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Some(Command::Dump { capture }) = &cli.command {
        return dump::run_dump(capture);
    }

    let Some(capture_path) = cli.capture.as_deref() else {
        Cli::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "a capture file is required",
            )
            .exit();
    };

    let config = Config::load(&cli);
    config.validate()?;

    let capture = capture::load(capture_path)?;
    let model = config.model.resolve(&capture);
    let identity = DeviceIdentity::from_capture(&capture, config.uniq_for(model));

    log::info!(
        "uhid-replay starting (capture={}, model={}, uniq={}, pacing={}, gateway={})",
        capture_path.display(),
        model,
        identity.uniq,
        config.pacing,
        config.gateway.display()
    );

    let mut handle = DeviceHandle::open(&config.gateway)?;
    let cancel = handle.signals().cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("Interrupted, shutting down…");
        cancel.set();
    })?;

    handle.create(&capture, identity)?;

    let scheduler = ReplayScheduler::new(&capture.reports, config.pacing);
    let outcome = EventLoop::new(handle, model.handlers(), scheduler, config.loop_options()).run()?;
    log::info!("Done: {:?}", outcome);

    Ok(())
}
