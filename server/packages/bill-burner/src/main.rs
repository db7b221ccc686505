use bill_burner::cli::run_bill_burner;

fn main() {
    if let Err(err) = run_bill_burner() {
        tracing::error!(error = %err, "bill-burner failed");
        std::process::exit(1);
    }
}
