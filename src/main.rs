fn main() {
    if let Err(e) = handoff::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
