fn main() {
    if let Err(err) = evcharge_home_api::app::run_report() {
        eprintln!("report startup failed: {err}");
        std::process::exit(1);
    }
}
