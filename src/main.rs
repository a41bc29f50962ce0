use cryo_bridge::prelude::*;

#[tokio::main]
async fn main() {
    let options = Options::new();

    if let Err(e) = cryo_bridge::app(options).await {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
