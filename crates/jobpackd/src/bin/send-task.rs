use std::process::ExitCode;

use jobpackd::client;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let task = match client::task_from_invocation(std::env::args()) {
        Ok(task) => task,
        Err(e) => {
            eprintln!("send-task: cannot read working directory: {e}");
            return ExitCode::from(1);
        }
    };
    let url = client::endpoint(client::port_from_env());

    match client::submit(&reqwest::Client::new(), &url, &task).await {
        Ok(rc) => ExitCode::from(u8::try_from(rc.code()).unwrap_or(1)),
        Err(e) => {
            eprintln!("send-task: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
