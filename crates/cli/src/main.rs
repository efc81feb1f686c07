use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    convoy::run().await
}
