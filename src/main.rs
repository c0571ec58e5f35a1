fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = dsport::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
