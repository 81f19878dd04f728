#![forbid(unsafe_code)]

fn main() {
    if let Err(error) = dualmount_doctor::run_from_env() {
        dualmount_doctor::util::report_error(&error);
        std::process::exit(error.exit_code());
    }
}
