#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let task = (!args.is_empty()).then(|| args.join(" "));

    if let Err(e) = deskpilot::run(task).await {
        eprintln!("deskpilot: {e}");
        std::process::exit(1);
    }
}
