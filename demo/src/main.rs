use demo::DemoArgs;
use structopt::StructOpt;

pub fn logging_init() {
    #[cfg(not(debug_assertions))]
    let log_level = log::LevelFilter::Info;
    #[cfg(debug_assertions)]
    let log_level = log::LevelFilter::Debug;

    // Setup logging
    env_logger::Builder::from_default_env()
        .default_format_timestamp_nanos(true)
        .filter_module("sgfx_api", log::LevelFilter::Debug)
        .filter_module("sgfx_api::backends::null", log::LevelFilter::Info)
        .filter_module("demo::shaders", log::LevelFilter::Info)
        // .filter_module("sgfx_api::backends::dx12", log::LevelFilter::Trace)
        .filter_level(log_level)
        .init();
}

fn main() {
    logging_init();

    let args = DemoArgs::from_args();
    match demo::run(&args) {
        Ok(stats) => log::info!("{}", stats),
        Err(e) => {
            log::error!("Demo failed: {}", e);
            std::process::exit(1);
        }
    }
}
