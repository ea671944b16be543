//! Process entry point: load secrets, init the database and logger, then
//! serve. Replaces the inherited desktop-shell bootstrap with a plain
//! standalone server process.

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        relay_gateway::logger::error("panic", &format!("PANIC: message='{message}', location='{location}'"));
        eprintln!("FATAL PANIC: {message} at {location}");
    }));
}

#[tokio::main]
async fn main() {
    if let Err(e) = relay_gateway::secrets::init() {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }

    relay_gateway::db::init();
    relay_gateway::logger::init();
    install_panic_hook();
    relay_gateway::logger::info("app", "relay-gatewayd starting");

    relay_gateway::server::serve().await;
}
