use clap::Parser;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use volt_driver::{Client, ConnectionConfig};

#[derive(Parser, Debug)]
#[command(name = "hello-world")]
#[command(about = "Insert greetings through the driver and read one back", long_about = None)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, env = "VOLT_ADDRESS", default_value = "localhost:21212")]
    address: String,

    /// Username for authentication
    #[arg(short, long, env = "VOLT_USERNAME", default_value = "")]
    user: String,

    /// Password for authentication
    #[arg(short, long, env = "VOLT_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Dialect to look up after inserting
    #[arg(long, default_value = "French")]
    dialect: String,
}

const GREETINGS: [(&str, &str, &str); 5] = [
    ("Hello", "World", "English"),
    ("Bonjour", "Monde", "French"),
    ("Hola", "Mundo", "Spanish"),
    ("Hej", "Verden", "Danish"),
    ("Ciao", "Mondo", "Italian"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "volt_driver=info,hello_world=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ConnectionConfig::from_env();
    config.address = args.address;
    config.username = args.user;
    config.password = args.password;

    let client = Client::new(config);
    let conn = client.connect().await?;

    for (hello, world, dialect) in GREETINGS {
        conn.query_async("HELLOWORLD.insert", &[json!(hello), json!(world), json!(dialect)])
            .await?;
    }
    let select = conn
        .query_async("HELLOWORLD.select", &[json!(args.dialect)])
        .await?;

    let drained = conn.drain_all().await;
    tracing::info!("Drained {} calls", drained.len());

    // Inserts may fail on a rerun against the same database; only the select matters.
    for pending in &drained {
        if let Some(Err(e)) = pending.try_get() {
            tracing::warn!("Call {} failed: {}", pending.handle(), e);
        }
    }

    let response = select.get().await?;
    let row = response
        .table(0)
        .and_then(|t| t.fetch_row(0))
        .ok_or_else(|| anyhow::anyhow!("No greeting found for {}", args.dialect))?;
    let hello = row.get_string("HELLO")?.unwrap_or_default();
    let world = row.get_string("WORLD")?.unwrap_or_default();
    println!("{}, {}!", hello, world);

    conn.close().await?;
    Ok(())
}
