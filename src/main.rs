fn main() {
    daytally::cli::run_cli();
}
