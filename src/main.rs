fn main() {
    if let Err(error) = evcharge_home_api::app::run() {
        eprintln!("application startup failed: {error}");
        std::process::exit(1);
    }
}
