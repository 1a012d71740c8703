fn main() {
    if let Err(e) = autograb_lib::run() {
        eprintln!("autograb: {e}");
        std::process::exit(1);
    }
}
