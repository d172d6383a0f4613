fn main() {
    if farcheck_lib::run().is_err() {
        std::process::exit(1);
    }
}
