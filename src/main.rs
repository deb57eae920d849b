fn main() {
    if let Err(err) = shop_ledger::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
