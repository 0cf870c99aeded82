#[cfg(not(target_os = "linux"))]
compile_error!("the warden daemon currently supports Linux hosts only");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warden::Warden::load()?.run().await
}
