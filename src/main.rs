fn main() {
    if let Err(err) = hearth::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
